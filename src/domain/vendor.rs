use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Delivery-platform category an invoice belongs to.
///
/// `Other` is used whenever no vendor pattern matched; downstream stages
/// still process such invoices with the generic prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VendorType {
    UberEats,
    DoorDash,
    GrubHub,
    IFood,
    Rappi,
    Other,
}

static VENDOR_PATTERNS: Lazy<Vec<(VendorType, Regex)>> = Lazy::new(|| {
    vec![
        (VendorType::UberEats, Regex::new(r"^UE-[0-9A-Za-z-]+$").unwrap()),
        (VendorType::DoorDash, Regex::new(r"^DD-[0-9A-Za-z-]+$").unwrap()),
        (VendorType::GrubHub, Regex::new(r"^GH-[0-9A-Za-z-]+$").unwrap()),
        (VendorType::IFood, Regex::new(r"^IF-[0-9A-Za-z-]+$").unwrap()),
        (VendorType::Rappi, Regex::new(r"^RP-[0-9A-Za-z-]+$").unwrap()),
    ]
});

impl VendorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorType::UberEats => "ubereats",
            VendorType::DoorDash => "doordash",
            VendorType::GrubHub => "grubhub",
            VendorType::IFood => "ifood",
            VendorType::Rappi => "rappi",
            VendorType::Other => "other",
        }
    }

    /// Classify an invoice identifier by its vendor prefix.
    ///
    /// This never fails; identifiers that match no pattern are `Other`.
    pub fn from_invoice_id(invoice_id: &str) -> VendorType {
        for (vendor, pattern) in VENDOR_PATTERNS.iter() {
            if pattern.is_match(invoice_id) {
                return *vendor;
            }
        }
        VendorType::Other
    }
}

impl std::fmt::Display for VendorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable invoice identifier derived once from the landing object name.
///
/// The value flows unchanged through every downstream stage and keys all
/// idempotent writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Derive the identifier from an object name.
    ///
    /// The file stem is used verbatim when it matches a vendor pattern;
    /// otherwise the id is `unknown-{first 16 hex chars of sha256(name)}`,
    /// which is stable across redeliveries of the same object.
    pub fn derive(object_name: &str) -> Self {
        let stem = file_stem(object_name);
        if VendorType::from_invoice_id(stem) != VendorType::Other {
            return Self(stem.to_string());
        }

        let digest = Sha256::digest(object_name.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("unknown-{}", &hex[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn vendor(&self) -> VendorType {
        VendorType::from_invoice_id(&self.0)
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final path segment of an object name, with the extension stripped.
fn file_stem(object_name: &str) -> &str {
    let base = object_name.rsplit('/').next().unwrap_or(object_name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}
