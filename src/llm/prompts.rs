// Vendor-specific extraction prompts

use crate::domain::VendorType;

const COMMON_RULES: &str = "\
Return a single JSON object conforming to the provided schema. \
Dates must be formatted YYYY-MM-DD. \
Numeric amounts must be plain numbers without currency symbols or thousands separators. \
Use null for fields that are not present on the document. \
Line items must be listed in document order with line_number starting at 1.";

/// Prompt for one vendor's invoice layout. The vendor-specific paragraph
/// anchors the model on the id pattern and the document structure; the
/// shared rules pin the output format.
pub fn prompt_for(vendor: VendorType) -> String {
    let vendor_notes = match vendor {
        VendorType::UberEats => {
            "This is an Uber Eats restaurant invoice. The invoice_id follows the pattern \
             UE-<year>-<sequence>, e.g. UE-2026-000123. Commission deductions are listed \
             as separate line items; capture the commission rate when printed."
        }
        VendorType::DoorDash => {
            "This is a DoorDash merchant invoice. The invoice_id follows the pattern \
             DD-<sequence>. Delivery and service fees appear as distinct line items."
        }
        VendorType::GrubHub => {
            "This is a Grubhub statement. The invoice_id follows the pattern \
             GH-<sequence>. Marketing and processing fees appear as line items."
        }
        VendorType::IFood => {
            "This is an iFood repasse invoice, typically in Portuguese. The invoice_id \
             follows the pattern IF-<sequence>. Amounts may use Brazilian formatting on \
             the document; normalize them to plain decimal numbers."
        }
        VendorType::Rappi => {
            "This is a Rappi settlement invoice, typically in Spanish. The invoice_id \
             follows the pattern RP-<sequence>. Normalize amounts to plain decimal numbers."
        }
        VendorType::Other => {
            "This is a delivery-platform invoice from an unrecognized vendor. Read the \
             invoice_id exactly as printed on the document."
        }
    };

    format!(
        "Extract the structured invoice data from this document image.\n\n{}\n\n{}",
        vendor_notes, COMMON_RULES
    )
}
