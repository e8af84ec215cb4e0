//! The immutable value handed to the engine by whatever resolved the
//! customer, company and line-item records.

use crate::error::{FolioError, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[serde(alias = "Offer", alias = "OFFER")]
    Offer,
    #[serde(alias = "Invoice", alias = "INVOICE")]
    Invoice,
}

impl DocumentKind {
    /// Title-block label.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Offer => "OFFER",
            DocumentKind::Invoice => "INVOICE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Offer => "offer",
            DocumentKind::Invoice => "invoice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    pub name: String,
    /// File path, `data:` URI or `http(s)` URL of the logo image.
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub discount_percentage: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            unit: String::new(),
            discount_percentage: 0.0,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_discount(mut self, percentage: f64) -> Self {
        self.discount_percentage = percentage;
        self
    }

    pub fn line_total(&self) -> f64 {
        self.quantity * self.unit_price * (1.0 - self.discount_percentage / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    pub title: String,
    #[serde(default)]
    pub document_number: Option<String>,
    pub kind: DocumentKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    pub currency: String,
    #[serde(default)]
    pub vat_rate: f64,
    #[serde(default)]
    pub payment_terms_days: u32,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default = "today")]
    pub created_at: NaiveDate,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub company_branding: Option<CompanyInfo>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl DocumentData {
    pub fn new(kind: DocumentKind, title: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            document_number: None,
            kind,
            description: None,
            customer: None,
            currency: currency.into(),
            vat_rate: 0.0,
            payment_terms_days: 0,
            valid_until: None,
            created_at: today(),
            items: Vec::new(),
            company_branding: None,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let data: DocumentData = serde_json::from_str(raw)?;
        data.validate()?;
        Ok(data)
    }

    /// Number shown in the title block; unnumbered documents are drafts.
    pub fn display_number(&self) -> &str {
        self.document_number
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("DRAFT")
    }

    pub fn totals(&self) -> Totals {
        Totals::compute(&self.items, self.vat_rate)
    }

    /// Rejects shapes the renderer cannot lay out meaningfully. Absent optional
    /// blocks are fine; nonsense numbers are a contract violation.
    pub fn validate(&self) -> Result<()> {
        if self.currency.trim().is_empty() {
            return Err(FolioError::InvalidDocument(
                "currency must not be empty".to_string(),
            ));
        }
        if !self.vat_rate.is_finite() || self.vat_rate < 0.0 {
            return Err(FolioError::InvalidDocument(format!(
                "vatRate must be a non-negative number, got {}",
                self.vat_rate
            )));
        }
        for (idx, item) in self.items.iter().enumerate() {
            let row = idx + 1;
            if !item.quantity.is_finite() || item.quantity < 0.0 {
                return Err(FolioError::InvalidDocument(format!(
                    "item {row}: quantity must be >= 0, got {}",
                    item.quantity
                )));
            }
            if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                return Err(FolioError::InvalidDocument(format!(
                    "item {row}: unitPrice must be >= 0, got {}",
                    item.unit_price
                )));
            }
            if !item.discount_percentage.is_finite()
                || !(0.0..=100.0).contains(&item.discount_percentage)
            {
                return Err(FolioError::InvalidDocument(format!(
                    "item {row}: discountPercentage must be within 0..=100, got {}",
                    item.discount_percentage
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub total: f64,
}

impl Totals {
    pub fn compute(items: &[LineItem], vat_rate: f64) -> Self {
        let subtotal: f64 = items.iter().map(LineItem::line_total).sum();
        let vat_amount = subtotal * vat_rate / 100.0;
        Self {
            subtotal,
            vat_rate,
            vat_amount,
            total: subtotal + vat_amount,
        }
    }
}
