use crate::assets::{AssetLoader, AssetStore, LogoFailurePolicy};
use crate::document::DocumentData;
use crate::error::{FolioError, Result};
use crate::font::FontSet;
use crate::layout::{PageLayout, render_page};
use crate::paint::{PageGeometry, Painter};
use crate::pagination::{PageCapacity, plan_pages};
use crate::pdf::{PdfMetadata, assemble_pdf};
use crate::perf::{PerfLogger, Span};
use crate::raster::rasterize;
use crate::surface::{OffscreenSurface, PageBitmap, SurfaceTracker};
use std::sync::Arc;

pub const DEFAULT_DPI: u32 = 96;
pub const DEFAULT_SUPERSAMPLE: u32 = 2;

/// The shared layout-to-bitmap path. Export and the live preview both go
/// through this, so a page looks the same wherever it is rendered.
#[derive(Debug, Clone)]
pub struct PagePipeline {
    pub geometry: PageGeometry,
    pub dpi: u32,
    pub supersample: u32,
    fonts: Arc<FontSet>,
    surfaces: SurfaceTracker,
}

impl Default for PagePipeline {
    fn default() -> Self {
        Self::new(
            PageGeometry::default(),
            DEFAULT_DPI,
            DEFAULT_SUPERSAMPLE,
            Arc::new(FontSet::metrics_only()),
            SurfaceTracker::default(),
        )
    }
}

impl PagePipeline {
    pub fn new(
        geometry: PageGeometry,
        dpi: u32,
        supersample: u32,
        fonts: Arc<FontSet>,
        surfaces: SurfaceTracker,
    ) -> Self {
        Self {
            geometry,
            dpi,
            supersample,
            fonts,
            surfaces,
        }
    }

    pub fn surfaces(&self) -> &SurfaceTracker {
        &self.surfaces
    }

    pub fn acquire_surface(&self) -> Result<OffscreenSurface> {
        OffscreenSurface::acquire(self.geometry.size, self.dpi, self.supersample, &self.surfaces)
    }

    /// Paints `layout` onto `surface` and captures the result. Fails with
    /// [`FolioError::PageOverflow`] when the page content cannot be fitted.
    pub fn rasterize(
        &self,
        layout: &PageLayout,
        surface: &mut OffscreenSurface,
        assets: &AssetStore,
    ) -> Result<PageBitmap> {
        let commands = Painter::new(&self.fonts, self.geometry).paint(layout)?;
        rasterize(&commands, surface, &self.fonts, assets)?;
        Ok(surface.capture())
    }
}

/// A finished export: the PDF bytes plus what the caller needs to hand them
/// to a download or an email attachment.
#[derive(Debug, Clone)]
pub struct ExportedPdf {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// The layout each page image was rasterized from, in page order.
    pub pages: Vec<PageLayout>,
}

impl ExportedPdf {
    pub const MIME_TYPE: &'static str = "application/pdf";

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// `{kind}_{number}.pdf`, or `{kind}_preview.pdf` for unnumbered documents.
pub fn suggested_filename(data: &DocumentData) -> String {
    let number = data
        .document_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| {
            n.chars()
                .map(|ch| {
                    if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                        ch
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .unwrap_or_else(|| "preview".to_string());
    format!("{}_{}.pdf", data.kind.as_str(), number)
}

pub struct Exporter {
    pipeline: PagePipeline,
    capacity: PageCapacity,
    loader: AssetLoader,
    logo_policy: LogoFailurePolicy,
    perf: Option<Arc<PerfLogger>>,
}

impl Exporter {
    pub fn new(pipeline: PagePipeline, capacity: PageCapacity) -> Self {
        Self {
            pipeline,
            capacity,
            loader: AssetLoader::default(),
            logo_policy: LogoFailurePolicy::default(),
            perf: None,
        }
    }

    pub fn with_loader(mut self, loader: AssetLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_logo_policy(mut self, policy: LogoFailurePolicy) -> Self {
        self.logo_policy = policy;
        self
    }

    pub fn with_perf(mut self, perf: Option<Arc<PerfLogger>>) -> Self {
        self.perf = perf;
        self
    }

    /// Rasterizes every page of `data`, in order, and assembles them into one
    /// PDF. Any failure yields [`FolioError::Export`] and no bytes at all.
    pub fn export_pdf(&self, data: &DocumentData) -> Result<ExportedPdf> {
        let result = self.run(data).map_err(|err| err.into_export(None));
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
        match &result {
            Ok(pdf) => log::info!(
                "exported {} ({} page(s), {} bytes)",
                pdf.filename,
                pdf.page_count(),
                pdf.bytes.len()
            ),
            Err(err) => log::warn!("{err}"),
        }
        result
    }

    fn run(&self, data: &DocumentData) -> Result<ExportedPdf> {
        data.validate()?;
        let doc_label = data.display_number();
        let perf = self.perf.as_deref();

        let (assets, omit_logo) = self.resolve_logo(data)?;

        let span = Span::start(perf, "export.paginate", Some(doc_label), None);
        let spans = plan_pages(data.items.len(), self.capacity);
        let total_pages = spans.len();
        let pages: Vec<PageLayout> = spans
            .iter()
            .map(|span| {
                let mut layout = render_page(&span.bind(&data.items), data, total_pages);
                if omit_logo {
                    layout.header.logo = None;
                }
                layout
            })
            .collect();
        span.finish();

        // One surface per export, reused for each page in order and released
        // before assembly starts.
        let bitmaps = {
            let mut surface = self.pipeline.acquire_surface()?;
            let mut bitmaps = Vec::with_capacity(pages.len());
            for layout in &pages {
                let span = Span::start(
                    perf,
                    "export.raster_page",
                    Some(doc_label),
                    Some(layout.page_number),
                );
                let bitmap = self
                    .pipeline
                    .rasterize(layout, &mut surface, &assets)
                    .map_err(|err| err.into_export(Some(layout.page_number)))?;
                span.finish();
                bitmaps.push(bitmap);
            }
            bitmaps
        };

        let span = Span::start(perf, "export.assemble", Some(doc_label), None);
        let metadata = PdfMetadata {
            title: format!("{} {}", data.kind.label(), doc_label),
        };
        let bytes = assemble_pdf(&bitmaps, self.pipeline.geometry.size, &metadata)?;
        span.finish();

        if let Some(perf) = perf {
            perf.log_counts(
                "export",
                Some(doc_label),
                &[
                    ("pages", pages.len() as u64),
                    ("bytes", bytes.len() as u64),
                ],
            );
        }

        Ok(ExportedPdf {
            bytes,
            filename: suggested_filename(data),
            pages,
        })
    }

    /// Loads the company logo up front. Returns the asset store and whether
    /// the logo must be dropped from every page.
    fn resolve_logo(&self, data: &DocumentData) -> Result<(AssetStore, bool)> {
        let mut assets = AssetStore::default();
        let Some(source) = data
            .company_branding
            .as_ref()
            .and_then(|company| company.logo.as_deref())
            .filter(|logo| !logo.trim().is_empty())
        else {
            return Ok((assets, false));
        };
        match self.loader.load_image(source) {
            Ok(image) => {
                assets.insert(source, image);
                Ok((assets, false))
            }
            Err(err) => match self.logo_policy {
                // The logo is part of every page header, so page 1 is where
                // the failure first bites.
                LogoFailurePolicy::Abort => Err(err.into_export(Some(1))),
                LogoFailurePolicy::Omit => {
                    log::warn!("omitting company logo: {err}");
                    Ok((assets, true))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::png_data_uri;
    use crate::document::{CompanyInfo, DocumentKind, LineItem};

    fn invoice(items: usize) -> DocumentData {
        let mut data = DocumentData::new(DocumentKind::Invoice, "Consulting", "EUR");
        data.document_number = Some("INV 2024/07".to_string());
        data.payment_terms_days = 30;
        data.items = (0..items)
            .map(|i| LineItem::new(format!("Item {i}"), 1.0, 10.0))
            .collect();
        data
    }

    fn exporter(tracker: &SurfaceTracker) -> Exporter {
        let pipeline = PagePipeline::new(
            PageGeometry::default(),
            24,
            1,
            Arc::new(FontSet::metrics_only()),
            tracker.clone(),
        );
        Exporter::new(pipeline, PageCapacity::default())
    }

    fn with_logo(mut data: DocumentData, logo: &str) -> DocumentData {
        data.company_branding = Some(CompanyInfo {
            name: "Acme".into(),
            logo: Some(logo.to_string()),
            address_lines: vec!["1 Main St".into()],
            phone: None,
            website: None,
        });
        data
    }

    #[test]
    fn filename_is_sanitized() {
        assert_eq!(suggested_filename(&invoice(0)), "invoice_INV_2024_07.pdf");
        let mut offer = DocumentData::new(DocumentKind::Offer, "Draft", "EUR");
        assert_eq!(suggested_filename(&offer), "offer_preview.pdf");
        offer.document_number = Some("  ".into());
        assert_eq!(suggested_filename(&offer), "offer_preview.pdf");
    }

    #[test]
    fn exports_every_page_and_releases_the_surface() {
        let tracker = SurfaceTracker::default();
        let pdf = exporter(&tracker).export_pdf(&invoice(23)).unwrap();
        assert_eq!(pdf.page_count(), 3);
        assert_eq!(pdf.filename, "invoice_INV_2024_07.pdf");
        let doc = lopdf::Document::load_mem(&pdf.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn broken_logo_aborts_by_default() {
        let tracker = SurfaceTracker::default();
        let data = with_logo(invoice(2), "/no/such/folio-logo.png");
        let err = exporter(&tracker).export_pdf(&data).unwrap_err();
        assert!(err.is_export_failure());
        assert!(err.to_string().starts_with("export failed on page 1"));
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn broken_logo_is_dropped_under_omit() {
        let tracker = SurfaceTracker::default();
        let data = with_logo(invoice(2), "/no/such/folio-logo.png");
        let pdf = exporter(&tracker)
            .with_logo_policy(LogoFailurePolicy::Omit)
            .export_pdf(&data)
            .unwrap();
        assert_eq!(pdf.page_count(), 1);
        assert!(pdf.pages[0].header.logo.is_none());
    }

    #[test]
    fn loaded_logo_is_kept() {
        let tracker = SurfaceTracker::default();
        let logo = png_data_uri(8, 4, [0, 0, 255, 255]);
        let data = with_logo(invoice(1), &logo);
        let pdf = exporter(&tracker).export_pdf(&data).unwrap();
        assert_eq!(pdf.pages[0].header.logo.as_deref(), Some(logo.as_str()));
    }

    #[test]
    fn overflowing_continuation_page_fails_with_its_number() {
        let tracker = SurfaceTracker::default();
        let mut data = invoice(10);
        data.items[9].description = "sealant ".repeat(1500);
        let err = exporter(&tracker).export_pdf(&data).unwrap_err();
        assert!(matches!(
            err,
            FolioError::Export { page: Some(2), ref source }
                if matches!(**source, FolioError::PageOverflow { page: 2, .. })
        ));
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn invalid_document_is_an_export_failure() {
        let tracker = SurfaceTracker::default();
        let mut data = invoice(1);
        data.items[0].quantity = -1.0;
        let err = exporter(&tracker).export_pdf(&data).unwrap_err();
        assert!(matches!(
            err,
            FolioError::Export { page: None, ref source } if matches!(**source, FolioError::InvalidDocument(_))
        ));
    }
}
