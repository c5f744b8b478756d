use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};
use super::vendor::VendorType;

/// Tolerance for a single line item: |amount - quantity * unit_price|.
const LINE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Tolerance for invoice-level arithmetic.
const TOTAL_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2); // 0.02

/// One billed position on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// 1-based position on the invoice
    pub line_number: u32,

    /// Human-readable description of the charge
    pub description: String,

    /// Billed quantity
    pub quantity: u32,

    /// Price per unit, two fractional digits
    pub unit_price: Decimal,

    /// Extended amount for the line, two fractional digits
    pub amount: Decimal,
}

/// Structured extraction of a delivery-platform invoice.
///
/// Produced by the extractor from the vision model output and persisted by
/// the warehouse writer. All monetary amounts are fixed-point decimals with
/// two fractional digits; dates are ISO-8601 calendar dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Invoice {
    /// Vendor-pattern invoice identifier
    pub invoice_id: String,

    /// Vendor display name as printed on the document
    pub vendor_name: String,

    /// Vendor category; overridden with the classifier's verdict
    pub vendor_type: VendorType,

    /// Billing date
    pub invoice_date: NaiveDate,

    /// Payment due date, never before `invoice_date`
    pub due_date: NaiveDate,

    /// ISO-4217 currency code
    pub currency: String,

    pub subtotal: Decimal,
    pub tax_amount: Decimal,

    /// Platform commission rate in 0..=1, when the document shows one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_rate: Option<Decimal>,

    /// Platform commission amount, when the document shows one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_amount: Option<Decimal>,

    pub total_amount: Decimal,

    /// At least one line item
    pub line_items: Vec<LineItem>,
}

impl LineItem {
    pub fn validate(&self) -> Result<()> {
        if self.line_number < 1 {
            return Err(PipelineError::validation("line_number must be >= 1"));
        }
        if self.description.trim().is_empty() {
            return Err(PipelineError::validation(format!(
                "line {} has an empty description",
                self.line_number
            )));
        }
        if self.quantity < 1 {
            return Err(PipelineError::validation(format!(
                "line {} quantity must be >= 1",
                self.line_number
            )));
        }
        if self.unit_price < Decimal::ZERO || self.amount < Decimal::ZERO {
            return Err(PipelineError::validation(format!(
                "line {} amounts must be non-negative",
                self.line_number
            )));
        }

        let expected = Decimal::from(self.quantity) * self.unit_price;
        if (self.amount - expected).abs() > LINE_TOLERANCE {
            return Err(PipelineError::validation(format!(
                "line {} amount {} does not match quantity {} x unit_price {}",
                self.line_number, self.amount, self.quantity, self.unit_price
            )));
        }

        Ok(())
    }
}

impl Invoice {
    /// Round every monetary amount to two fractional digits, half to even.
    ///
    /// Applied before cross-field validation so that model output with extra
    /// fractional digits is judged after normalization.
    pub fn normalize(&mut self) {
        self.subtotal = round2(self.subtotal);
        self.tax_amount = round2(self.tax_amount);
        self.total_amount = round2(self.total_amount);
        self.commission_amount = self.commission_amount.map(round2);
        for item in &mut self.line_items {
            item.unit_price = round2(item.unit_price);
            item.amount = round2(item.amount);
        }
    }

    /// Field and cross-field checks for a persisted extraction.
    pub fn validate(&self) -> Result<()> {
        if self.invoice_id.trim().is_empty() {
            return Err(PipelineError::validation("invoice_id must not be empty"));
        }
        if self.vendor_name.trim().is_empty() {
            return Err(PipelineError::validation("vendor_name must not be empty"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(PipelineError::validation(format!(
                "currency '{}' is not an ISO-4217 code",
                self.currency
            )));
        }
        if self.due_date < self.invoice_date {
            return Err(PipelineError::validation(format!(
                "due_date {} precedes invoice_date {}",
                self.due_date, self.invoice_date
            )));
        }
        if self.subtotal < Decimal::ZERO
            || self.tax_amount < Decimal::ZERO
            || self.total_amount < Decimal::ZERO
        {
            return Err(PipelineError::validation("amounts must be non-negative"));
        }
        if let Some(rate) = self.commission_rate {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(PipelineError::validation(format!(
                    "commission_rate {} outside 0..=1",
                    rate
                )));
            }
        }
        if let Some(amount) = self.commission_amount {
            if amount < Decimal::ZERO {
                return Err(PipelineError::validation(
                    "commission_amount must be non-negative",
                ));
            }
        }
        if self.line_items.is_empty() {
            return Err(PipelineError::validation("at least one line item required"));
        }

        for item in &self.line_items {
            item.validate()?;
        }

        let computed_total = self.subtotal + self.tax_amount;
        if (self.total_amount - computed_total).abs() > TOTAL_TOLERANCE {
            return Err(PipelineError::validation(format!(
                "total_amount {} does not match subtotal {} + tax_amount {}",
                self.total_amount, self.subtotal, self.tax_amount
            )));
        }

        let line_sum: Decimal = self.line_items.iter().map(|l| l.amount).sum();
        if (line_sum - self.subtotal).abs() > TOTAL_TOLERANCE {
            return Err(PipelineError::validation(format!(
                "line item sum {} does not match subtotal {}",
                line_sum, self.subtotal
            )));
        }

        Ok(())
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// JSON schema handed to the vision model as the response schema.
pub fn response_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Invoice)).expect("invoice schema serializes")
}
