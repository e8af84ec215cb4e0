//! The canonical page layout tree. Both the live preview and the rasterized
//! export consume the value returned by [`render_page`], so the two can never
//! disagree on what a page contains.

use crate::document::{DocumentData, DocumentKind, LineItem};
use crate::pagination::Page;
use chrono::NaiveDate;
use std::fmt;

pub const TABLE_COLUMNS: [&str; 5] = ["Description", "Quantity", "Unit", "Unit Price", "Line Total"];
pub const CONTINUATION_NOTICE: &str = "Continued on next page…";

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub page_number: usize,
    pub total_pages: usize,
    pub header: HeaderBlock,
    pub title: Option<TitleBlock>,
    pub customer: Option<CustomerBlock>,
    pub metadata: Option<MetadataBlock>,
    pub table: ItemsTable,
    pub continuation: Option<&'static str>,
    pub totals: Option<TotalsBlock>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBlock {
    /// Logo source reference; `None` means no image is drawn at all.
    pub logo: Option<String>,
    pub company_name: Option<String>,
    pub company_lines: Vec<String>,
    pub page_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleBlock {
    pub label: &'static str,
    pub number: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerBlock {
    pub name_line: String,
    pub address_lines: Vec<String>,
    pub contact_lines: Vec<String>,
}

/// The kind-dependent second metadata field. Offers carry a validity date and
/// invoices carry payment terms; the enum keeps the two from ever coexisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTerm {
    ValidUntil(NaiveDate),
    PaymentTermsDays(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataBlock {
    pub created_on: NaiveDate,
    pub term: Option<MetadataTerm>,
}

impl MetadataBlock {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("Date", format_date(self.created_on))];
        match self.term {
            Some(MetadataTerm::ValidUntil(date)) => out.push(("Valid until", format_date(date))),
            Some(MetadataTerm::PaymentTermsDays(days)) => {
                out.push(("Payment terms", format!("{days} days")))
            }
            None => {}
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemsTable {
    pub show_header: bool,
    pub rows: Vec<ItemRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    /// 1-based position within the whole document.
    pub position: usize,
    pub description: String,
    pub note: Option<String>,
    pub quantity: String,
    pub unit: String,
    pub unit_price: String,
    pub line_total: String,
}

impl ItemRow {
    pub fn cells(&self) -> [&str; 5] {
        [
            self.description.as_str(),
            self.quantity.as_str(),
            self.unit.as_str(),
            self.unit_price.as_str(),
            self.line_total.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TotalsBlock {
    pub subtotal: String,
    pub vat_label: String,
    pub vat_amount: String,
    pub total: String,
}

/// Lays out one paginated page. Pure: the result depends only on the inputs.
pub fn render_page(page: &Page<'_>, data: &DocumentData, total_pages: usize) -> PageLayout {
    let first = page.is_first_page();
    let last = page.is_last_page();
    let total_pages = total_pages.max(page.page_number());

    let header = header_block(data, page.page_number(), total_pages);
    let title = first.then(|| TitleBlock {
        label: data.kind.label(),
        number: data.display_number().to_string(),
        title: data.title.clone(),
        description: data
            .description
            .as_ref()
            .filter(|d| !d.trim().is_empty())
            .cloned(),
    });
    let customer = if first { customer_block(data) } else { None };
    let metadata = first.then(|| metadata_block(data));

    let rows = page
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| item_row(page.first_row_index() + idx + 1, item, &data.currency))
        .collect();
    let table = ItemsTable {
        show_header: first,
        rows,
    };

    let (totals, footer) = if last {
        let totals = data.totals();
        (
            Some(TotalsBlock {
                subtotal: format_amount(totals.subtotal, &data.currency),
                vat_label: format!("VAT ({}%)", format_percent(totals.vat_rate)),
                vat_amount: format_amount(totals.vat_amount, &data.currency),
                total: format_amount(totals.total, &data.currency),
            }),
            Some(footer_text(data)),
        )
    } else {
        (None, None)
    };

    PageLayout {
        page_number: page.page_number(),
        total_pages,
        header,
        title,
        customer,
        metadata,
        table,
        continuation: (!last).then_some(CONTINUATION_NOTICE),
        totals,
        footer,
    }
}

fn header_block(data: &DocumentData, page_number: usize, total_pages: usize) -> HeaderBlock {
    let page_label = format!("Page {page_number} of {total_pages}");
    let Some(company) = data.company_branding.as_ref() else {
        return HeaderBlock {
            logo: None,
            company_name: None,
            company_lines: Vec::new(),
            page_label,
        };
    };
    let mut company_lines: Vec<String> = company
        .address_lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .cloned()
        .collect();
    company_lines.extend(non_empty(&company.phone));
    company_lines.extend(non_empty(&company.website));
    HeaderBlock {
        logo: non_empty(&company.logo),
        company_name: Some(company.name.clone()).filter(|n| !n.trim().is_empty()),
        company_lines,
        page_label,
    }
}

fn customer_block(data: &DocumentData) -> Option<CustomerBlock> {
    let customer = data.customer.as_ref()?;
    let name_line = match non_empty(&customer.company) {
        Some(company) => format!("{}, {}", customer.name, company),
        None => customer.name.clone(),
    };
    let address_lines = customer
        .address_lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .cloned()
        .collect();
    let mut contact_lines = Vec::new();
    contact_lines.extend(non_empty(&customer.email));
    contact_lines.extend(non_empty(&customer.phone));
    Some(CustomerBlock {
        name_line,
        address_lines,
        contact_lines,
    })
}

fn metadata_block(data: &DocumentData) -> MetadataBlock {
    let term = match data.kind {
        DocumentKind::Offer => data.valid_until.map(MetadataTerm::ValidUntil),
        DocumentKind::Invoice => Some(MetadataTerm::PaymentTermsDays(data.payment_terms_days)),
    };
    MetadataBlock {
        created_on: data.created_at,
        term,
    }
}

fn item_row(position: usize, item: &LineItem, currency: &str) -> ItemRow {
    let note = (item.discount_percentage > 0.0)
        .then(|| format!("-{}% discount", format_percent(item.discount_percentage)));
    ItemRow {
        position,
        description: item.description.clone(),
        note,
        quantity: format_quantity(item.quantity),
        unit: item.unit.clone(),
        unit_price: format_amount(item.unit_price, currency),
        line_total: format_amount(item.line_total(), currency),
    }
}

fn footer_text(data: &DocumentData) -> String {
    match data.kind {
        DocumentKind::Offer => match data.valid_until {
            Some(date) => format!(
                "Thank you for your interest. This offer is valid until {}.",
                format_date(date)
            ),
            None => "Thank you for your interest. Prices in this offer are subject to confirmation."
                .to_string(),
        },
        DocumentKind::Invoice => format!(
            "Thank you for your business. Payment is due within {} days.",
            data.payment_terms_days
        ),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `1234.5, "EUR"` -> `"1,234.50 EUR"`.
pub fn format_amount(value: f64, currency: &str) -> String {
    let cents = to_cents(value);
    let negative = cents < 0;
    let cents = cents.unsigned_abs();
    let whole = group_thousands(cents / 100);
    let sign = if negative { "-" } else { "" };
    format!("{sign}{whole}.{:02} {currency}", cents % 100)
}

/// Rounds half away from zero on the shortest decimal form of `value`, so
/// `1.005` is 101 cents even though the nearest f64 sits just below it.
fn to_cents(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let repr = value.abs().to_string();
    let (whole, frac) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let mut digits = frac.bytes().map(|b| i64::from(b - b'0'));
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    let round_up = digits.next().is_some_and(|d| d >= 5);
    let cents = whole
        .parse::<i64>()
        .unwrap_or(i64::MAX)
        .saturating_mul(100)
        .saturating_add(tenths * 10 + hundredths + i64::from(round_up));
    if value < 0.0 { -cents } else { cents }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Whole quantities print without decimals, others with at most two.
pub fn format_quantity(value: f64) -> String {
    trim_decimals(value)
}

pub fn format_percent(value: f64) -> String {
    trim_decimals(value)
}

fn trim_decimals(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rendered = format!("{value:.2}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

impl fmt::Display for PageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = &self.header;
        if let Some(logo) = &header.logo {
            writeln!(f, "[logo: {logo}]")?;
        }
        if let Some(name) = &header.company_name {
            writeln!(f, "{name}")?;
        }
        for line in &header.company_lines {
            writeln!(f, "{line}")?;
        }
        writeln!(f, "{}", header.page_label)?;

        if let Some(title) = &self.title {
            writeln!(f)?;
            writeln!(f, "{} {}", title.label, title.number)?;
            writeln!(f, "{}", title.title)?;
            if let Some(description) = &title.description {
                writeln!(f, "{description}")?;
            }
        }
        if let Some(customer) = &self.customer {
            writeln!(f)?;
            writeln!(f, "Bill to: {}", customer.name_line)?;
            for line in customer.address_lines.iter().chain(&customer.contact_lines) {
                writeln!(f, "  {line}")?;
            }
        }
        if let Some(metadata) = &self.metadata {
            writeln!(f)?;
            for (label, value) in metadata.fields() {
                writeln!(f, "{label}: {value}")?;
            }
        }

        writeln!(f)?;
        if self.table.show_header {
            writeln!(f, "{}", TABLE_COLUMNS.join(" | "))?;
        }
        for row in &self.table.rows {
            writeln!(f, "{}", row.cells().join(" | "))?;
            if let Some(note) = &row.note {
                writeln!(f, "  {note}")?;
            }
        }
        if let Some(notice) = self.continuation {
            writeln!(f, "{notice}")?;
        }
        if let Some(totals) = &self.totals {
            writeln!(f)?;
            writeln!(f, "Subtotal: {}", totals.subtotal)?;
            writeln!(f, "{}: {}", totals.vat_label, totals.vat_amount)?;
            writeln!(f, "Total: {}", totals.total)?;
        }
        if let Some(footer) = &self.footer {
            writeln!(f)?;
            writeln!(f, "{footer}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CompanyInfo, CustomerRef};
    use crate::pagination::{PageCapacity, paginate};

    fn data(kind: DocumentKind, n: usize) -> DocumentData {
        let mut data = DocumentData::new(kind, "Garden redesign", "EUR");
        data.document_number = Some("2026-041".into());
        data.created_at = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        data.vat_rate = 25.0;
        data.payment_terms_days = 30;
        data.items = (0..n)
            .map(|i| LineItem::new(format!("Task {i}"), 2.0, 50.0).with_unit("hours"))
            .collect();
        data
    }

    fn layouts(data: &DocumentData, capacity: PageCapacity) -> Vec<PageLayout> {
        let pages = paginate(&data.items, capacity);
        pages
            .iter()
            .map(|p| render_page(p, data, pages.len()))
            .collect()
    }

    #[test]
    fn empty_invoice_has_header_row_and_due_footer() {
        let data = data(DocumentKind::Invoice, 0);
        let pages = layouts(&data, PageCapacity::default());
        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert!(page.table.show_header);
        assert!(page.table.rows.is_empty());
        assert!(page.continuation.is_none());
        assert!(page.footer.as_deref().unwrap().contains("due within 30 days."));
        assert_eq!(page.header.page_label, "Page 1 of 1");
    }

    #[test]
    fn totals_and_footer_only_on_last_page() {
        let capacity = PageCapacity::new(2, 3).unwrap();
        let data = data(DocumentKind::Invoice, 5);
        let pages = layouts(&data, capacity);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].continuation, Some(CONTINUATION_NOTICE));
        assert!(pages[0].totals.is_none());
        assert!(pages[0].footer.is_none());
        assert!(pages[1].continuation.is_none());
        let totals = pages[1].totals.as_ref().unwrap();
        assert_eq!(totals.subtotal, "500.00 EUR");
        assert_eq!(totals.vat_label, "VAT (25%)");
        assert_eq!(totals.vat_amount, "125.00 EUR");
        assert_eq!(totals.total, "625.00 EUR");
    }

    #[test]
    fn continuation_pages_drop_first_page_blocks() {
        let capacity = PageCapacity::new(1, 1).unwrap();
        let mut data = data(DocumentKind::Invoice, 2);
        data.customer = Some(CustomerRef {
            name: "Ada".into(),
            company: None,
            address_lines: vec![],
            email: None,
            phone: None,
        });
        let pages = layouts(&data, capacity);
        let second = &pages[1];
        assert!(second.title.is_none());
        assert!(second.customer.is_none());
        assert!(second.metadata.is_none());
        assert!(!second.table.show_header);
        assert_eq!(second.table.rows[0].position, 2);
        assert_eq!(second.header.page_label, "Page 2 of 2");
    }

    #[test]
    fn totals_do_not_depend_on_page_capacity() {
        let data = data(DocumentKind::Invoice, 23);
        let dense = layouts(&data, PageCapacity::new(20, 40).unwrap());
        let sparse = layouts(&data, PageCapacity::new(1, 2).unwrap());
        assert_eq!(dense.last().unwrap().totals, sparse.last().unwrap().totals);
    }

    #[test]
    fn offer_metadata_never_shows_payment_terms() {
        let mut data = data(DocumentKind::Offer, 1);
        data.valid_until = NaiveDate::from_ymd_opt(2026, 11, 30);
        let page = &layouts(&data, PageCapacity::default())[0];
        let metadata = page.metadata.as_ref().unwrap();
        assert_eq!(
            metadata.term,
            Some(MetadataTerm::ValidUntil(NaiveDate::from_ymd_opt(2026, 11, 30).unwrap()))
        );
        assert!(!page.to_string().contains("Payment terms"));
        assert!(page.to_string().contains("Valid until: 2026-11-30"));
    }

    #[test]
    fn invoice_metadata_never_shows_validity() {
        let mut data = data(DocumentKind::Invoice, 1);
        data.valid_until = NaiveDate::from_ymd_opt(2026, 11, 30);
        let page = &layouts(&data, PageCapacity::default())[0];
        let metadata = page.metadata.as_ref().unwrap();
        assert_eq!(metadata.term, Some(MetadataTerm::PaymentTermsDays(30)));
        assert!(!page.to_string().contains("Valid until"));
    }

    #[test]
    fn offer_without_customer_omits_customer_block() {
        let mut data = data(DocumentKind::Offer, 1);
        data.valid_until = NaiveDate::from_ymd_opt(2026, 11, 30);
        let page = &layouts(&data, PageCapacity::default())[0];
        let title = page.title.as_ref().unwrap();
        assert_eq!(title.label, "OFFER");
        assert_eq!(title.number, "2026-041");
        assert!(page.customer.is_none());
        assert!(!page.to_string().contains("Bill to"));
    }

    #[test]
    fn header_omits_blank_logo_and_lists_contact_lines() {
        let mut data = data(DocumentKind::Invoice, 0);
        data.company_branding = Some(CompanyInfo {
            name: "Acme AS".into(),
            logo: Some("   ".into()),
            address_lines: vec!["Storgata 1".into(), "".into(), "0155 Oslo".into()],
            phone: Some("+47 22 00 00 00".into()),
            website: None,
        });
        let page = &layouts(&data, PageCapacity::default())[0];
        assert!(page.header.logo.is_none());
        assert_eq!(
            page.header.company_lines,
            vec!["Storgata 1", "0155 Oslo", "+47 22 00 00 00"]
        );
    }

    #[test]
    fn customer_company_is_appended_to_name() {
        let mut data = data(DocumentKind::Invoice, 0);
        data.customer = Some(CustomerRef {
            name: "Kari Nordmann".into(),
            company: Some("Nordmann Bygg".into()),
            address_lines: vec!["Kirkeveien 2".into()],
            email: Some("kari@example.com".into()),
            phone: None,
        });
        let page = &layouts(&data, PageCapacity::default())[0];
        let customer = page.customer.as_ref().unwrap();
        assert_eq!(customer.name_line, "Kari Nordmann, Nordmann Bygg");
        assert_eq!(customer.contact_lines, vec!["kari@example.com"]);
    }

    #[test]
    fn long_descriptions_are_not_truncated() {
        let mut data = data(DocumentKind::Invoice, 0);
        let long = "x".repeat(180);
        data.items.push(LineItem::new(long.clone(), 1.0, 1.0));
        let page = &layouts(&data, PageCapacity::default())[0];
        assert_eq!(page.table.rows[0].description, long);
    }

    #[test]
    fn discounted_rows_carry_a_note() {
        let mut data = data(DocumentKind::Invoice, 0);
        data.items.push(LineItem::new("Seats", 3.0, 100.0).with_discount(12.5));
        let row = &layouts(&data, PageCapacity::default())[0].table.rows[0];
        assert_eq!(row.note.as_deref(), Some("-12.5% discount"));
        assert_eq!(row.line_total, "262.50 EUR");
    }

    #[test]
    fn amount_formatting_groups_and_rounds() {
        assert_eq!(format_amount(1234567.891, "USD"), "1,234,567.89 USD");
        assert_eq!(format_amount(0.005, "EUR"), "0.01 EUR");
        assert_eq!(format_amount(-0.001, "EUR"), "0.00 EUR");
        assert_eq!(format_amount(999.999, "EUR"), "1,000.00 EUR");
        assert_eq!(format_amount(-42.0, "EUR"), "-42.00 EUR");
        assert_eq!(format_amount(1.005, "EUR"), "1.01 EUR");
        assert_eq!(format_amount(2.675, "EUR"), "2.68 EUR");
        assert_eq!(format_amount(-1.005, "EUR"), "-1.01 EUR");
        assert_eq!(format_amount(1.0049, "EUR"), "1.00 EUR");
    }

    #[test]
    fn quantity_formatting_trims_trailing_zeros() {
        assert_eq!(format_quantity(3.0), "3");
        assert_eq!(format_quantity(2.5), "2.5");
        assert_eq!(format_quantity(0.126), "0.13");
    }
}
