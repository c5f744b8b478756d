use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::{PipelineError, Result};
use super::invoice::Invoice;
use super::vendor::{InvoiceId, VendorType};

/// Landing object described by the storage notification that starts a run.
///
/// This is the exact camelCase shape the object store emits; `size` arrives
/// as a stringified integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceObject {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
}

/// Reference to an object without its notification metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub bucket: String,
    pub name: String,
}

/// One rendered page of an invoice document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    pub bucket: String,
    pub name: String,
    pub page_index: u32,
}

/// Wire behavior shared by every stage event payload.
///
/// A payload that fails to decode or validate is a permanent `Schema` error;
/// the bus will never be asked to redeliver it.
pub trait EventPayload: Serialize + DeserializeOwned + Sized {
    fn validate(&self) -> Result<()>;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::schema(format!("payload does not decode: {}", e)))?;
        payload.validate()?;
        Ok(payload)
    }

    fn encode(&self) -> Result<Bytes> {
        self.validate()?;
        let bytes = serde_json::to_vec(self)?;
        Ok(Bytes::from(bytes))
    }
}

/// Emitted by the format normalizer once every page is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedEvent {
    pub invoice_id: InvoiceId,
    pub source: SourceRef,
    pub pages: Vec<PageRef>,
}

/// Emitted by the classifier with the authoritative vendor verdict.
///
/// Carries the landing reference through so the warehouse writer can
/// archive the original upload at the end of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub invoice_id: InvoiceId,
    pub vendor: VendorType,
    pub source: SourceRef,
    pub pages: Vec<PageRef>,
}

/// Emitted by the extractor with the validated extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEvent {
    pub invoice_id: InvoiceId,
    pub vendor: VendorType,
    pub source: SourceRef,
    pub extraction: Invoice,
}

/// Emitted by the warehouse writer after rows land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedEvent {
    pub invoice_id: InvoiceId,
    pub row_id: String,
    pub table: String,
}

impl SourceObject {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::schema("source object name must not be empty"));
        }
        if self.bucket.trim().is_empty() {
            return Err(PipelineError::schema("source object bucket must not be empty"));
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let payload: Self = serde_json::from_slice(bytes).map_err(|e| {
            PipelineError::schema(format!("storage notification does not decode: {}", e))
        })?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            bucket: self.bucket.clone(),
            name: self.name.clone(),
        }
    }
}

fn validate_pages(pages: &[PageRef]) -> Result<()> {
    if pages.is_empty() {
        return Err(PipelineError::schema("event carries no pages"));
    }
    for page in pages {
        if page.name.trim().is_empty() {
            return Err(PipelineError::schema(format!(
                "page {} has an empty object name",
                page.page_index
            )));
        }
    }
    Ok(())
}

impl EventPayload for ConvertedEvent {
    fn validate(&self) -> Result<()> {
        if self.invoice_id.as_str().is_empty() {
            return Err(PipelineError::schema("invoice_id must not be empty"));
        }
        if self.source.name.trim().is_empty() {
            return Err(PipelineError::schema("source name must not be empty"));
        }
        validate_pages(&self.pages)
    }
}

impl EventPayload for ClassifiedEvent {
    fn validate(&self) -> Result<()> {
        if self.invoice_id.as_str().is_empty() {
            return Err(PipelineError::schema("invoice_id must not be empty"));
        }
        validate_pages(&self.pages)
    }
}

impl EventPayload for ExtractedEvent {
    fn validate(&self) -> Result<()> {
        if self.invoice_id.as_str().is_empty() {
            return Err(PipelineError::schema("invoice_id must not be empty"));
        }
        self.extraction
            .validate()
            .map_err(|e| PipelineError::schema(format!("extraction invalid: {}", e)))
    }
}

impl EventPayload for LoadedEvent {
    fn validate(&self) -> Result<()> {
        if self.invoice_id.as_str().is_empty() {
            return Err(PipelineError::schema("invoice_id must not be empty"));
        }
        if self.row_id.trim().is_empty() {
            return Err(PipelineError::schema("row_id must not be empty"));
        }
        if self.table.trim().is_empty() {
            return Err(PipelineError::schema("table must not be empty"));
        }
        Ok(())
    }
}
