use crate::assets::{AssetLoader, AssetStore};
use crate::document::DocumentData;
use crate::error::{FolioError, Result};
use crate::export::PagePipeline;
use crate::layout::{PageLayout, render_page};
use crate::pagination::{PageCapacity, PageSpan, plan_pages};
use sha2::{Digest, Sha256};

/// Owns the page the interactive preview is showing.
///
/// Every document change re-derives the page plan. The current page resets to
/// 1 when the item count, title or customer changes, so a shrunk document can
/// never leave the preview on a page that no longer exists.
pub struct PreviewController {
    capacity: PageCapacity,
    pipeline: PagePipeline,
    loader: AssetLoader,
    document: Option<DocumentData>,
    spans: Vec<PageSpan>,
    items_fingerprint: Option<[u8; 32]>,
    current_page: usize,
}

impl PreviewController {
    pub fn new(capacity: PageCapacity) -> Self {
        Self::with_pipeline(capacity, PagePipeline::default(), AssetLoader::default())
    }

    pub fn with_pipeline(capacity: PageCapacity, pipeline: PagePipeline, loader: AssetLoader) -> Self {
        Self {
            capacity,
            pipeline,
            loader,
            document: None,
            spans: plan_pages(0, capacity),
            items_fingerprint: None,
            current_page: 1,
        }
    }

    /// Replaces the previewed document. Invalid data is rejected and leaves the
    /// previous state untouched.
    pub fn set_document(&mut self, data: DocumentData) -> Result<()> {
        data.validate()?;

        let fingerprint = items_fingerprint(&data);
        if self.items_fingerprint != Some(fingerprint) {
            self.spans = plan_pages(data.items.len(), self.capacity);
            self.items_fingerprint = Some(fingerprint);
        } else {
            log::trace!("item list unchanged; reusing page plan");
        }

        let identity_changed = match &self.document {
            Some(prev) => {
                prev.items.len() != data.items.len()
                    || prev.title != data.title
                    || prev.customer != data.customer
            }
            None => true,
        };
        self.current_page = if identity_changed {
            1
        } else {
            self.current_page.clamp(1, self.page_count())
        };
        self.document = Some(data);
        Ok(())
    }

    pub fn document(&self) -> Option<&DocumentData> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> usize {
        self.spans.len()
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn next(&mut self) {
        if self.current_page < self.page_count() {
            self.current_page += 1;
        }
    }

    pub fn previous(&mut self) {
        if self.current_page > 1 {
            self.current_page -= 1;
        }
    }

    /// Jumps to `page`. Out-of-range targets are ignored.
    pub fn go_to(&mut self, page: usize) {
        if (1..=self.page_count()).contains(&page) {
            self.current_page = page;
        }
    }

    pub fn current_layout(&self) -> Option<PageLayout> {
        self.layout_for(self.current_page)
    }

    pub fn layout_for(&self, page_number: usize) -> Option<PageLayout> {
        let data = self.document.as_ref()?;
        let span = self.spans.get(page_number.checked_sub(1)?)?;
        Some(render_page(&span.bind(&data.items), data, self.spans.len()))
    }

    /// Rasterizes the current page to PNG. A logo that fails to load is left
    /// out instead of failing the page.
    pub fn render_current_png(&self) -> Result<Vec<u8>> {
        let mut layout = self.current_layout().ok_or_else(|| {
            FolioError::InvalidDocument("no document loaded in preview".to_string())
        })?;
        let mut assets = AssetStore::default();
        if let Some(source) = layout.header.logo.clone() {
            match self.loader.load_image(&source) {
                Ok(image) => assets.insert(source, image),
                Err(err) => {
                    log::debug!("preview hides logo: {err}");
                    layout.header.logo = None;
                }
            }
        }
        let mut surface = self.pipeline.acquire_surface()?;
        self.pipeline
            .rasterize(&layout, &mut surface, &assets)?
            .to_png()
    }
}

fn items_fingerprint(data: &DocumentData) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for item in &data.items {
        hasher.update(item.description.as_bytes());
        hasher.update([0]);
        hasher.update(item.quantity.to_bits().to_le_bytes());
        hasher.update(item.unit_price.to_bits().to_le_bytes());
        hasher.update(item.discount_percentage.to_bits().to_le_bytes());
        hasher.update(item.unit.as_bytes());
        hasher.update([0xff]);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CustomerRef, DocumentKind, LineItem};

    fn invoice(items: usize) -> DocumentData {
        let mut data = DocumentData::new(DocumentKind::Invoice, "Hosting", "EUR");
        data.payment_terms_days = 14;
        data.items = (0..items)
            .map(|i| LineItem::new(format!("Line {i}"), 1.0, 5.0))
            .collect();
        data
    }

    fn controller(data: DocumentData) -> PreviewController {
        let mut preview = PreviewController::new(PageCapacity::default());
        preview.set_document(data).unwrap();
        preview
    }

    #[test]
    fn navigation_stays_in_range() {
        let mut preview = controller(invoice(30));
        assert_eq!(preview.page_count(), 3);
        preview.previous();
        assert_eq!(preview.current_page(), 1);
        preview.next();
        preview.next();
        preview.next();
        assert_eq!(preview.current_page(), 3);
        preview.go_to(0);
        preview.go_to(9);
        assert_eq!(preview.current_page(), 3);
        preview.go_to(2);
        assert_eq!(preview.current_page(), 2);
    }

    #[test]
    fn shrinking_the_item_list_resets_to_first_page() {
        let mut preview = controller(invoice(30));
        preview.go_to(3);
        preview.set_document(invoice(2)).unwrap();
        assert_eq!(preview.page_count(), 1);
        assert_eq!(preview.current_page(), 1);
    }

    #[test]
    fn editing_a_description_keeps_the_current_page() {
        let mut preview = controller(invoice(30));
        preview.go_to(2);
        let mut edited = invoice(30);
        edited.items[20].description = "Renamed".to_string();
        preview.set_document(edited).unwrap();
        assert_eq!(preview.current_page(), 2);
        let layout = preview.current_layout().unwrap();
        assert!(layout.table.rows.iter().any(|row| row.description == "Renamed"));
    }

    #[test]
    fn title_change_resets_to_first_page() {
        let mut preview = controller(invoice(30));
        preview.go_to(2);
        let mut renamed = invoice(30);
        renamed.title = "Support".to_string();
        preview.set_document(renamed).unwrap();
        assert_eq!(preview.current_page(), 1);
    }

    #[test]
    fn customer_change_resets_to_first_page() {
        let customer = |name: &str| CustomerRef {
            name: name.to_string(),
            company: None,
            address_lines: vec!["12 Harbor Road".to_string()],
            email: None,
            phone: None,
        };
        let mut first = invoice(30);
        first.customer = Some(customer("Dana Reyes"));
        let mut preview = controller(first.clone());

        preview.go_to(2);
        let mut moved = first.clone();
        moved.customer.as_mut().unwrap().address_lines = vec!["4 Quay Street".to_string()];
        preview.set_document(moved).unwrap();
        assert_eq!(preview.current_page(), 1);

        preview.go_to(3);
        let mut swapped = first.clone();
        swapped.customer = Some(customer("Lee Okafor"));
        preview.set_document(swapped).unwrap();
        assert_eq!(preview.current_page(), 1);

        preview.go_to(2);
        let mut removed = first;
        removed.customer = None;
        preview.set_document(removed).unwrap();
        assert_eq!(preview.current_page(), 1);
        assert!(preview.current_layout().unwrap().customer.is_none());
    }

    #[test]
    fn invalid_document_is_rejected_and_state_kept() {
        let mut preview = controller(invoice(30));
        preview.go_to(2);
        let mut bad = invoice(3);
        bad.vat_rate = f64::NAN;
        assert!(preview.set_document(bad).is_err());
        assert_eq!(preview.page_count(), 3);
        assert_eq!(preview.current_page(), 2);
    }

    #[test]
    fn fingerprint_ignores_non_item_fields() {
        let a = invoice(3);
        let mut b = invoice(3);
        b.title = "Other".into();
        assert_eq!(items_fingerprint(&a), items_fingerprint(&b));
        b.items[0].quantity = 2.0;
        assert_ne!(items_fingerprint(&a), items_fingerprint(&b));
    }

    #[test]
    fn renders_current_page_and_hides_broken_logo() {
        let mut data = invoice(1);
        data.company_branding = Some(crate::document::CompanyInfo {
            name: "Acme".into(),
            logo: Some("/no/such/preview-logo.png".into()),
            address_lines: vec![],
            phone: None,
            website: None,
        });
        let preview = controller(data);
        let png = preview.render_current_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn empty_controller_has_one_page_and_no_layout() {
        let preview = PreviewController::new(PageCapacity::default());
        assert_eq!(preview.page_count(), 1);
        assert!(preview.current_layout().is_none());
        assert!(preview.render_current_png().is_err());
    }
}
