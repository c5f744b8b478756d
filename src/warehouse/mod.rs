//! Analytical warehouse port and row models.
//!
//! The warehouse writer talks to [`WarehouseRepository`]; adapters are the
//! sqlx-backed store and an in-memory double for tests. Header, line items,
//! and the metrics row land in one transaction so partial success cannot
//! leak out.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::{Invoice, Result};

pub use memory::InMemoryWarehouse;
pub use sqlite::SqliteWarehouse;

/// Header row of the `invoices` table.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRow {
    pub invoice_id: String,
    pub vendor_name: String,
    pub vendor_type: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub commission_rate: Option<Decimal>,
    pub commission_amount: Option<Decimal>,
    pub total_amount: Decimal,
    pub line_items_count: i64,
    pub source_file: String,
    pub extraction_model: String,
    pub extraction_latency_ms: i64,
    pub confidence_score: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the `line_items` table; primary key `(invoice_id, line_number)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemRow {
    pub invoice_id: String,
    pub line_number: i64,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Row of the `metrics` table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub invoice_id: String,
    pub vendor_type: String,
    pub source_file: String,
    pub extraction_model: String,
    pub extraction_latency_ms: i64,
    pub confidence_score: Option<Decimal>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything Stage D needs about the extraction run that is not part of
/// the extraction itself.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub source_file: String,
    pub extraction_model: String,
    pub extraction_latency_ms: i64,
    pub confidence_score: Option<Decimal>,
}

/// Build the three row groups from a validated extraction.
pub fn rows_for(
    invoice: &Invoice,
    ctx: &ExtractionContext,
    now: DateTime<Utc>,
) -> (InvoiceRow, Vec<LineItemRow>, MetricsRow) {
    let header = InvoiceRow {
        invoice_id: invoice.invoice_id.clone(),
        vendor_name: invoice.vendor_name.clone(),
        vendor_type: invoice.vendor_type.as_str().to_string(),
        invoice_date: invoice.invoice_date,
        due_date: invoice.due_date,
        currency: invoice.currency.clone(),
        subtotal: invoice.subtotal,
        tax_amount: invoice.tax_amount,
        commission_rate: invoice.commission_rate,
        commission_amount: invoice.commission_amount,
        total_amount: invoice.total_amount,
        line_items_count: invoice.line_items.len() as i64,
        source_file: ctx.source_file.clone(),
        extraction_model: ctx.extraction_model.clone(),
        extraction_latency_ms: ctx.extraction_latency_ms,
        confidence_score: ctx.confidence_score,
        created_at: now,
        updated_at: now,
    };

    let items = invoice
        .line_items
        .iter()
        .map(|item| LineItemRow {
            invoice_id: invoice.invoice_id.clone(),
            line_number: item.line_number as i64,
            description: item.description.clone(),
            quantity: item.quantity as i64,
            unit_price: item.unit_price,
            amount: item.amount,
            created_at: now,
        })
        .collect();

    let metrics = MetricsRow {
        invoice_id: invoice.invoice_id.clone(),
        vendor_type: invoice.vendor_type.as_str().to_string(),
        source_file: ctx.source_file.clone(),
        extraction_model: ctx.extraction_model.clone(),
        extraction_latency_ms: ctx.extraction_latency_ms,
        confidence_score: ctx.confidence_score,
        success: true,
        error_message: None,
        created_at: now,
    };

    (header, items, metrics)
}

#[async_trait]
pub trait WarehouseRepository: Send + Sync {
    /// Dedup gate: has this invoice already landed?
    async fn invoice_exists(&self, invoice_id: &str) -> Result<bool>;

    /// Insert header + line items + metrics atomically.
    async fn insert_extraction(
        &self,
        invoice: &InvoiceRow,
        items: &[LineItemRow],
        metrics: &MetricsRow,
    ) -> Result<()>;
}

/// Whether an error is a primary-key collision, i.e. another delivery won
/// the insert race. Callers treat that as a duplicate, not a failure.
pub fn is_unique_violation(err: &crate::domain::PipelineError) -> bool {
    match err {
        crate::domain::PipelineError::Warehouse(sqlx::Error::Database(db)) => {
            db.is_unique_violation()
        }
        _ => false,
    }
}
