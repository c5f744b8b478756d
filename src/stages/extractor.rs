// Stage C: vision model extractor

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::bus::{
    Attributes, Bus, ATTR_EXTRACTION_LATENCY_MS, ATTR_EXTRACTION_MODEL, ATTR_INVOICE_ID,
    ATTR_VENDOR,
};
use crate::config::{BucketConfig, TopicConfig};
use crate::domain::invoice::response_schema;
use crate::domain::{
    ClassifiedEvent, EventPayload, ExtractedEvent, Invoice, PipelineError, Result,
};
use crate::llm::{prompt_for, ExtractionRequest, VisionModel};
use crate::retry::RetryPolicy;
use crate::runtime::{Delivery, Stage, StageHandler};
use crate::storage::{layout, ObjectStore};

/// Diagnostics sidecar written next to permanently failed extractions.
#[derive(Debug, Serialize)]
struct ExtractionDiagnostics<'a> {
    invoice_id: &'a str,
    vendor: &'a str,
    model: &'a str,
    error: String,
    raw_response: Option<&'a str>,
    occurred_at: chrono::DateTime<Utc>,
}

/// Runs the vendor prompt against the primary page, validates the response
/// against the invoice schema, and persists the extraction.
pub struct Extractor {
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn Bus>,
    model: Arc<dyn VisionModel>,
    model_id: String,
    buckets: BucketConfig,
    topics: TopicConfig,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn Bus>,
        model: Arc<dyn VisionModel>,
        model_id: String,
        buckets: BucketConfig,
        topics: TopicConfig,
    ) -> Self {
        Self {
            store,
            bus,
            model,
            model_id,
            buckets,
            topics,
            retry: RetryPolicy::model(),
        }
    }

    /// Override the in-stage model retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record why an extraction can never succeed, then hand the permanent
    /// error back for the host to ack.
    async fn quarantine(
        &self,
        event: &ClassifiedEvent,
        model: &str,
        raw_response: Option<&str>,
        cause: PipelineError,
    ) -> Result<()> {
        let diagnostics = ExtractionDiagnostics {
            invoice_id: event.invoice_id.as_str(),
            vendor: event.vendor.as_str(),
            model,
            error: cause.to_string(),
            raw_response,
            occurred_at: Utc::now(),
        };
        let name = layout::extraction_diagnostics(Utc::now().date_naive(), &event.invoice_id);
        self.store
            .put(
                &self.buckets.failed,
                &name,
                Bytes::from(serde_json::to_vec_pretty(&diagnostics)?),
                "application/json",
            )
            .await?;

        error!(
            invoice_id = %event.invoice_id,
            vendor = %event.vendor,
            reason = %cause,
            sidecar = %name,
            "Extraction permanently failed"
        );

        Err(cause)
    }
}

#[async_trait]
impl StageHandler for Extractor {
    fn stage(&self) -> Stage {
        Stage::Extractor
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let event = ClassifiedEvent::decode(&delivery.data)?;

        let primary = event
            .pages
            .iter()
            .min_by_key(|p| p.page_index)
            .ok_or_else(|| PipelineError::schema("classified event carries no pages"))?;

        info!(
            invoice_id = %event.invoice_id,
            message_id = %delivery.message_id,
            vendor = %event.vendor,
            page = %primary.name,
            "Extracting invoice"
        );

        let image = self.store.get(&primary.bucket, &primary.name).await?;

        let request = ExtractionRequest {
            prompt: prompt_for(event.vendor),
            image_png: image,
            response_schema: response_schema(),
        };

        let started = Instant::now();
        let response = match self
            .retry
            .run("model extraction", |_| self.model.extract(&request))
            .await
        {
            Ok(response) => response,
            Err(e) if !e.is_transient() => {
                return self.quarantine(&event, &self.model_id, None, e).await;
            }
            Err(e) => return Err(e),
        };
        let latency_ms = started.elapsed().as_millis() as i64;

        let mut invoice: Invoice = match serde_json::from_str(&response.text) {
            Ok(invoice) => invoice,
            Err(e) => {
                let cause =
                    PipelineError::ModelResponse(format!("response is not a valid invoice: {}", e));
                return self
                    .quarantine(&event, &response.model, Some(&response.text), cause)
                    .await;
            }
        };

        invoice.normalize();

        // The pipeline identity and the classifier verdict are
        // authoritative over whatever the model read off the page.
        if invoice.invoice_id != event.invoice_id.as_str() {
            warn!(
                invoice_id = %event.invoice_id,
                model_invoice_id = %invoice.invoice_id,
                "Model returned a different invoice_id, overriding"
            );
            invoice.invoice_id = event.invoice_id.to_string();
        }
        invoice.vendor_type = event.vendor;

        if let Err(e) = invoice.validate() {
            return self
                .quarantine(&event, &response.model, Some(&response.text), e)
                .await;
        }

        let extraction_name = layout::extraction(event.vendor, &event.invoice_id);
        self.store
            .put(
                &self.buckets.extracted,
                &extraction_name,
                Bytes::from(serde_json::to_vec_pretty(&invoice)?),
                "application/json",
            )
            .await?;

        let extracted = ExtractedEvent {
            invoice_id: event.invoice_id.clone(),
            vendor: event.vendor,
            source: event.source.clone(),
            extraction: invoice,
        };

        let mut attrs = Attributes::new();
        attrs.insert(ATTR_INVOICE_ID.to_string(), event.invoice_id.to_string());
        attrs.insert(ATTR_VENDOR.to_string(), event.vendor.as_str().to_string());
        attrs.insert(
            ATTR_EXTRACTION_MODEL.to_string(),
            response.model.clone(),
        );
        attrs.insert(
            ATTR_EXTRACTION_LATENCY_MS.to_string(),
            latency_ms.to_string(),
        );
        self.bus
            .publish(&self.topics.extracted, extracted.encode()?, attrs)
            .await?;

        metrics::histogram!(
            "pipeline_extraction_latency_ms",
            latency_ms as f64,
            "vendor" => event.vendor.as_str(),
        );

        info!(
            invoice_id = %event.invoice_id,
            vendor = %event.vendor,
            latency_ms = latency_ms,
            extraction = %extraction_name,
            "Invoice extracted"
        );

        Ok(())
    }
}
