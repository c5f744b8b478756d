// Canonical object naming for every storage area.
//
// Names are pure functions of the invoice id, page index, or message id so
// that redelivered work overwrites its own output instead of duplicating it.

use chrono::NaiveDate;

use crate::domain::{InvoiceId, VendorType};

/// `processed/<invoice_id>/page-NNN.png`
pub fn processed_page(invoice_id: &InvoiceId, page_index: u32) -> String {
    format!("processed/{}/page-{:03}.png", invoice_id, page_index)
}

/// `classified/<vendor>/<invoice_id>/page-NNN.png`
pub fn classified_page(vendor: VendorType, invoice_id: &InvoiceId, page_index: u32) -> String {
    format!(
        "classified/{}/{}/page-{:03}.png",
        vendor.as_str(),
        invoice_id,
        page_index
    )
}

/// `extracted/<vendor>/<invoice_id>.json`
pub fn extraction(vendor: VendorType, invoice_id: &InvoiceId) -> String {
    format!("extracted/{}/{}.json", vendor.as_str(), invoice_id)
}

/// `archive/YYYY/MM/DD/<source-name>`
pub fn archive(date: NaiveDate, source_name: &str) -> String {
    let base = source_name.rsplit('/').next().unwrap_or(source_name);
    format!("archive/{}/{}", date.format("%Y/%m/%d"), base)
}

/// `failed/<reason>/<yyyy-mm-dd>/<name>`
pub fn failed(reason: &str, date: NaiveDate, name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    format!("failed/{}/{}/{}", reason, date.format("%Y-%m-%d"), base)
}

/// `failed/extract/<yyyy-mm-dd>/<invoice_id>.error.json`
pub fn extraction_diagnostics(date: NaiveDate, invoice_id: &InvoiceId) -> String {
    format!(
        "failed/extract/{}/{}.error.json",
        date.format("%Y-%m-%d"),
        invoice_id
    )
}

/// `failed/dlq/<origin_stage>/<yyyy-mm-dd>/<message_id>.json`
pub fn dlq_record(origin_stage: &str, date: NaiveDate, message_id: &str) -> String {
    format!(
        "failed/dlq/{}/{}/{}.json",
        origin_stage,
        date.format("%Y-%m-%d"),
        message_id
    )
}
