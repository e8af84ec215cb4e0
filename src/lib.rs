mod assets;
mod canvas;
mod config;
mod document;
mod error;
mod export;
mod font;
mod layout;
mod paint;
mod pagination;
mod pdf;
mod perf;
mod preview;
mod raster;
mod surface;
mod types;

pub use assets::{AssetLoader, AssetStore, ImageAsset, LogoFailurePolicy};
pub use canvas::{Canvas, Command, PageCommands};
pub use config::{EngineConfig, FolioBuilder};
pub use document::{CompanyInfo, CustomerRef, DocumentData, DocumentKind, LineItem, Totals};
pub use error::{FolioError, Result};
pub use export::{ExportedPdf, Exporter, PagePipeline, suggested_filename};
pub use font::FontSet;
pub use layout::{
    CONTINUATION_NOTICE, CustomerBlock, HeaderBlock, ItemRow, ItemsTable, MetadataBlock,
    MetadataTerm, PageLayout, TABLE_COLUMNS, TitleBlock, TotalsBlock, format_amount,
    format_date, format_quantity, render_page,
};
pub use paint::{META_BLOCK_KEY, PageGeometry, Painter};
pub use pagination::{
    CONTINUATION_PAGE_CAPACITY, FIRST_PAGE_CAPACITY, Page, PageCapacity, PageSpan, paginate,
    plan_pages,
};
pub use pdf::{PdfMetadata, assemble_pdf};
pub use perf::PerfLogger;
pub use preview::PreviewController;
pub use raster::rasterize;
pub use surface::{OffscreenSurface, PageBitmap, SurfaceTracker};
pub use types::{Color, Margins, Pt, Rect, Size};

use std::sync::Arc;

/// A configured document engine. Cheap to share across threads; every export
/// acquires its own off-screen surface.
#[derive(Clone)]
pub struct Folio {
    capacity: PageCapacity,
    pipeline: PagePipeline,
    loader: AssetLoader,
    logo_failure: LogoFailurePolicy,
    perf: Option<Arc<PerfLogger>>,
}

impl Folio {
    pub fn builder() -> FolioBuilder {
        FolioBuilder::new()
    }

    pub(crate) fn from_parts(
        capacity: PageCapacity,
        pipeline: PagePipeline,
        loader: AssetLoader,
        logo_failure: LogoFailurePolicy,
        perf: Option<Arc<PerfLogger>>,
    ) -> Self {
        Self {
            capacity,
            pipeline,
            loader,
            logo_failure,
            perf,
        }
    }

    pub fn capacity(&self) -> PageCapacity {
        self.capacity
    }

    pub fn paginate<'a>(&self, items: &'a [LineItem]) -> Vec<Page<'a>> {
        paginate(items, self.capacity)
    }

    /// The layout of page `page_number` (1-based) of `data`.
    pub fn render_page(&self, data: &DocumentData, page_number: usize) -> Result<PageLayout> {
        data.validate()?;
        let spans = plan_pages(data.items.len(), self.capacity);
        let span = page_number
            .checked_sub(1)
            .and_then(|idx| spans.get(idx))
            .ok_or_else(|| {
                FolioError::InvalidDocument(format!(
                    "page {page_number} is out of range 1..={}",
                    spans.len()
                ))
            })?;
        Ok(render_page(&span.bind(&data.items), data, spans.len()))
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::new(self.pipeline.clone(), self.capacity)
            .with_loader(self.loader.clone())
            .with_logo_policy(self.logo_failure)
            .with_perf(self.perf.clone())
    }

    pub fn export_pdf(&self, data: &DocumentData) -> Result<ExportedPdf> {
        self.exporter().export_pdf(data)
    }

    pub fn preview(&self) -> PreviewController {
        PreviewController::with_pipeline(self.capacity, self.pipeline.clone(), self.loader.clone())
    }

    /// Off-screen surfaces currently held by exports or previews of this engine.
    pub fn live_surfaces(&self) -> usize {
        self.pipeline.surfaces().live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Folio {
        Folio::builder()
            .fonts(FontSet::metrics_only())
            .dpi(24)
            .supersample(1)
            .build()
            .unwrap()
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Folio>();
    }

    #[test]
    fn render_page_rejects_out_of_range_pages() {
        let data = DocumentData::new(DocumentKind::Offer, "Kitchen", "EUR");
        let folio = engine();
        assert!(folio.render_page(&data, 1).is_ok());
        assert!(folio.render_page(&data, 0).is_err());
        assert!(folio.render_page(&data, 2).is_err());
    }

    #[test]
    fn concurrent_exports_each_get_a_surface() {
        let folio = engine();
        let mut data = DocumentData::new(DocumentKind::Invoice, "Parallel", "EUR");
        data.items = (0..20).map(|i| LineItem::new(format!("Row {i}"), 1.0, 2.0)).collect();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..3)
                .map(|_| scope.spawn(|| folio.export_pdf(&data)))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap().page_count(), 2);
            }
        });
        assert_eq!(folio.live_surfaces(), 0);
    }
}
