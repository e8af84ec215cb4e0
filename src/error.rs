use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("asset error for '{source_ref}': {reason}")]
    Asset { source_ref: String, reason: String },

    #[error("font error: {0}")]
    Font(String),

    #[error("page {page} content overflows the page by {overflow_pt:.1}pt")]
    PageOverflow { page: usize, overflow_pt: f32 },

    #[error("raster error: {0}")]
    Raster(String),

    #[error("pdf assembly error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse document json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("export failed{}: {source}", page_suffix(.page))]
    Export {
        page: Option<usize>,
        #[source]
        source: Box<FolioError>,
    },
}

impl FolioError {
    pub(crate) fn asset(source_ref: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        FolioError::Asset {
            source_ref: source_ref.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a failure raised while exporting. Already-wrapped errors are kept as-is.
    pub(crate) fn into_export(self, page: Option<usize>) -> Self {
        match self {
            FolioError::Export { .. } => self,
            other => FolioError::Export {
                page,
                source: Box::new(other),
            },
        }
    }

    pub fn is_export_failure(&self) -> bool {
        matches!(self, FolioError::Export { .. })
    }
}

fn page_suffix(page: &Option<usize>) -> String {
    (*page).map(|p| format!(" on page {p}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_error_names_the_failing_page() {
        let err = FolioError::asset("logo.png", "not found").into_export(Some(2));
        assert!(err.is_export_failure());
        assert_eq!(
            err.to_string(),
            "export failed on page 2: asset error for 'logo.png': not found"
        );
    }

    #[test]
    fn export_wrapping_is_idempotent() {
        let err = FolioError::Raster("boom".into())
            .into_export(None)
            .into_export(Some(3));
        match err {
            FolioError::Export { page, source } => {
                assert_eq!(page, None);
                assert!(matches!(*source, FolioError::Raster(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
