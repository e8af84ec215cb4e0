use crate::assets::{AssetLoader, LogoFailurePolicy};
use crate::error::{FolioError, Result};
use crate::export::{DEFAULT_DPI, DEFAULT_SUPERSAMPLE, PagePipeline};
use crate::font::FontSet;
use crate::paint::PageGeometry;
use crate::pagination::{CONTINUATION_PAGE_CAPACITY, FIRST_PAGE_CAPACITY, PageCapacity};
use crate::perf::PerfLogger;
use crate::surface::SurfaceTracker;
use crate::types::{Margins, Size};
use crate::Folio;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MAX_SUPERSAMPLE: u32 = 4;
const MAX_DPI: u32 = 600;

/// Engine settings. Every field has a default, so an empty TOML file is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub first_page_capacity: usize,
    pub continuation_page_capacity: usize,
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub margin_pt: f32,
    pub dpi: u32,
    pub supersample: u32,
    pub logo_failure: LogoFailurePolicy,
    pub font_path: Option<PathBuf>,
    pub font_dirs: Vec<PathBuf>,
    pub logo_timeout_secs: u64,
    pub perf_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            first_page_capacity: FIRST_PAGE_CAPACITY,
            continuation_page_capacity: CONTINUATION_PAGE_CAPACITY,
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_pt: 40.0,
            dpi: DEFAULT_DPI,
            supersample: DEFAULT_SUPERSAMPLE,
            logo_failure: LogoFailurePolicy::Abort,
            font_path: None,
            font_dirs: Vec::new(),
            logo_timeout_secs: 10,
            perf_log: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn capacity(&self) -> Result<PageCapacity> {
        PageCapacity::new(self.first_page_capacity, self.continuation_page_capacity)
    }

    pub fn geometry(&self) -> PageGeometry {
        PageGeometry {
            size: Size::from_mm(self.page_width_mm, self.page_height_mm),
            margins: Margins::all(self.margin_pt),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.capacity()?;
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.page_width_mm) || !positive(self.page_height_mm) {
            return Err(FolioError::InvalidConfiguration(format!(
                "page size must be positive, got {}x{} mm",
                self.page_width_mm, self.page_height_mm
            )));
        }
        if !self.margin_pt.is_finite() || self.margin_pt < 0.0 {
            return Err(FolioError::InvalidConfiguration(format!(
                "margin_pt must be >= 0, got {}",
                self.margin_pt
            )));
        }
        let geometry = self.geometry();
        let content = geometry.margins.content_box(geometry.size);
        if content.width <= crate::types::Pt::ZERO || content.height <= crate::types::Pt::ZERO {
            return Err(FolioError::InvalidConfiguration(
                "margins leave no room for content".to_string(),
            ));
        }
        if !(1..=MAX_DPI).contains(&self.dpi) {
            return Err(FolioError::InvalidConfiguration(format!(
                "dpi must be within 1..={MAX_DPI}, got {}",
                self.dpi
            )));
        }
        if !(1..=MAX_SUPERSAMPLE).contains(&self.supersample) {
            return Err(FolioError::InvalidConfiguration(format!(
                "supersample must be within 1..={MAX_SUPERSAMPLE}, got {}",
                self.supersample
            )));
        }
        if self.logo_timeout_secs == 0 {
            return Err(FolioError::InvalidConfiguration(
                "logo_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fluent construction of a [`Folio`] engine.
#[derive(Clone, Default)]
pub struct FolioBuilder {
    config: EngineConfig,
    fonts: Option<FontSet>,
}

impl FolioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            fonts: None,
        }
    }

    pub fn page_capacity(mut self, first: usize, continuation: usize) -> Self {
        self.config.first_page_capacity = first;
        self.config.continuation_page_capacity = continuation;
        self
    }

    pub fn page_size_mm(mut self, width: f32, height: f32) -> Self {
        self.config.page_width_mm = width;
        self.config.page_height_mm = height;
        self
    }

    pub fn margin_pt(mut self, margin: f32) -> Self {
        self.config.margin_pt = margin;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn supersample(mut self, factor: u32) -> Self {
        self.config.supersample = factor;
        self
    }

    pub fn logo_failure(mut self, policy: LogoFailurePolicy) -> Self {
        self.config.logo_failure = policy;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_dirs.push(path.into());
        self
    }

    /// Uses `fonts` as-is and skips font discovery.
    pub fn fonts(mut self, fonts: FontSet) -> Self {
        self.fonts = Some(fonts);
        self
    }

    pub fn logo_timeout(mut self, timeout: Duration) -> Self {
        self.config.logo_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.perf_log = Some(path.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Result<Folio> {
        self.config.validate()?;
        let capacity = self.config.capacity()?;
        let fonts = match self.fonts {
            Some(fonts) => fonts,
            None => FontSet::resolve(self.config.font_path.as_deref(), &self.config.font_dirs)?,
        };
        let perf = match &self.config.perf_log {
            Some(path) => Some(Arc::new(PerfLogger::new(path)?)),
            None => None,
        };
        let pipeline = PagePipeline::new(
            self.config.geometry(),
            self.config.dpi,
            self.config.supersample,
            Arc::new(fonts),
            SurfaceTracker::default(),
        );
        let loader = AssetLoader::new(Duration::from_secs(self.config.logo_timeout_secs));
        Ok(Folio::from_parts(
            capacity,
            pipeline,
            loader,
            self.config.logo_failure,
            perf,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.capacity().unwrap(), PageCapacity::default());
        assert_eq!(config.geometry().size.to_px(config.dpi), (794, 1123));
    }

    #[test]
    fn toml_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
first_page_capacity = 5
continuation_page_capacity = 20
logo_failure = "omit"
supersample = 1
font_dirs = ["/opt/fonts"]
"#,
        )
        .unwrap();
        assert_eq!(config.first_page_capacity, 5);
        assert_eq!(config.continuation_page_capacity, 20);
        assert_eq!(config.logo_failure, LogoFailurePolicy::Omit);
        assert_eq!(config.supersample, 1);
        assert_eq!(config.font_dirs, vec![PathBuf::from("/opt/fonts")]);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for raw in [
            "first_page_capacity = 0",
            "continuation_page_capacity = 0",
            "supersample = 5",
            "dpi = 0",
            "margin_pt = 400.0",
            "page_width_mm = -1.0",
            "logo_timeout_secs = 0",
        ] {
            let err = EngineConfig::from_toml_str(raw).unwrap_err();
            assert!(
                matches!(err, FolioError::InvalidConfiguration(_)),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn unknown_keys_and_bad_types_are_parse_errors() {
        assert!(matches!(
            EngineConfig::from_toml_str("pages = 3").unwrap_err(),
            FolioError::Toml(_)
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("logo_failure = \"retry\"").unwrap_err(),
            FolioError::Toml(_)
        ));
    }

    #[test]
    fn builder_validates_before_building() {
        let err = FolioBuilder::new()
            .fonts(FontSet::metrics_only())
            .page_capacity(0, 14)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
        assert!(FolioBuilder::new().fonts(FontSet::metrics_only()).build().is_ok());
    }
}
