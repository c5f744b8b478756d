//! Builders for invoice payloads used across the suite.

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use invoice_pipeline::{Invoice, LineItem, VendorType};

/// Builder producing model-output JSON or domain invoices.
pub struct InvoiceBuilder {
    invoice_id: String,
    vendor_type: VendorType,
    subtotal: String,
    tax_amount: String,
    total_amount: String,
}

impl InvoiceBuilder {
    pub fn new(invoice_id: &str) -> Self {
        Self {
            invoice_id: invoice_id.to_string(),
            vendor_type: VendorType::UberEats,
            subtotal: "100.00".to_string(),
            tax_amount: "10.00".to_string(),
            total_amount: "110.00".to_string(),
        }
    }

    pub fn vendor(mut self, vendor: VendorType) -> Self {
        self.vendor_type = vendor;
        self
    }

    pub fn totals(mut self, subtotal: &str, tax: &str, total: &str) -> Self {
        self.subtotal = subtotal.to_string();
        self.tax_amount = tax.to_string();
        self.total_amount = total.to_string();
        self
    }

    /// The JSON text a well-behaved model would return. The single line
    /// item always matches the subtotal so arithmetic failures come only
    /// from the totals the test injects.
    pub fn model_json(&self) -> String {
        format!(
            r#"{{
                "invoice_id": "{id}",
                "vendor_name": "Test Vendor",
                "vendor_type": "{vendor}",
                "invoice_date": "2026-01-15",
                "due_date": "2026-02-14",
                "currency": "USD",
                "subtotal": {subtotal},
                "tax_amount": {tax},
                "total_amount": {total},
                "line_items": [
                    {{
                        "line_number": 1,
                        "description": "Platform fees",
                        "quantity": 1,
                        "unit_price": {subtotal},
                        "amount": {subtotal}
                    }}
                ]
            }}"#,
            id = self.invoice_id,
            vendor = self.vendor_type,
            subtotal = self.subtotal,
            tax = self.tax_amount,
            total = self.total_amount,
        )
    }
}

/// A valid extraction as a domain value.
pub fn sample_invoice(invoice_id: &str, vendor: VendorType) -> Invoice {
    Invoice {
        invoice_id: invoice_id.to_string(),
        vendor_name: "Test Vendor".to_string(),
        vendor_type: vendor,
        invoice_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
        currency: "USD".to_string(),
        subtotal: dec!(100.00),
        tax_amount: dec!(10.00),
        commission_rate: None,
        commission_amount: None,
        total_amount: dec!(110.00),
        line_items: vec![LineItem {
            line_number: 1,
            description: "Platform fees".to_string(),
            quantity: 1,
            unit_price: dec!(100.00),
            amount: dec!(100.00),
        }],
    }
}
