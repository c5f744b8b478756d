// Stage A: format normalizer

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::bus::{Attributes, Bus, ATTR_INVOICE_ID};
use crate::config::{BucketConfig, TopicConfig};
use crate::domain::{
    ConvertedEvent, EventPayload, FailureKind, InvoiceId, PageRef, PipelineError, Result,
    SourceObject,
};
use crate::pages::{is_accepted_content_type, PageDecoder};
use crate::runtime::{Delivery, Stage, StageHandler};
use crate::storage::{layout, ObjectStore};

/// Converts one landing container image into PNG pages in the processed
/// area and announces them downstream.
pub struct Normalizer {
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn Bus>,
    decoder: Arc<dyn PageDecoder>,
    buckets: BucketConfig,
    topics: TopicConfig,
}

impl Normalizer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn Bus>,
        decoder: Arc<dyn PageDecoder>,
        buckets: BucketConfig,
        topics: TopicConfig,
    ) -> Self {
        Self {
            store,
            bus,
            decoder,
            buckets,
            topics,
        }
    }

    /// Copy the offending landing object into the failed area. The landing
    /// object itself stays put; the store port has no delete.
    async fn quarantine(&self, source: &SourceObject, reason: &str) -> Result<()> {
        let target = layout::failed(reason, Utc::now().date_naive(), &source.name);
        self.store
            .copy(&source.bucket, &source.name, &self.buckets.failed, &target)
            .await?;
        error!(
            source = %source.name,
            reason = reason,
            quarantined_as = %target,
            "Document quarantined"
        );
        Ok(())
    }
}

#[async_trait]
impl StageHandler for Normalizer {
    fn stage(&self) -> Stage {
        Stage::Normalizer
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let source = SourceObject::decode(&delivery.data)?;
        let invoice_id = InvoiceId::derive(&source.name);

        info!(
            invoice_id = %invoice_id,
            message_id = %delivery.message_id,
            source = %source.name,
            content_type = %source.content_type,
            "Normalizing document"
        );

        if !is_accepted_content_type(&source.content_type) {
            self.quarantine(&source, "unsupported-format").await?;
            return Err(PipelineError::UnsupportedContentType(
                source.content_type.clone(),
            ));
        }

        let data = self.store.get(&source.bucket, &source.name).await?;

        let pages = match self.decoder.decode_pages(&data, &source.content_type) {
            Ok(pages) => pages,
            Err(e) if e.kind() == FailureKind::Permanent => {
                self.quarantine(&source, "decode-error").await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut page_refs = Vec::with_capacity(pages.len());
        for (index, page) in pages.into_iter().enumerate() {
            let name = layout::processed_page(&invoice_id, index as u32);
            // Overwrite-safe: a redelivery re-renders identical bytes under
            // the same name, replacing any partial output from a prior run.
            self.store
                .put(&self.buckets.processed, &name, page, "image/png")
                .await?;
            page_refs.push(PageRef {
                bucket: self.buckets.processed.clone(),
                name,
                page_index: index as u32,
            });
        }

        let event = ConvertedEvent {
            invoice_id: invoice_id.clone(),
            source: source.source_ref(),
            pages: page_refs,
        };

        let mut attrs = Attributes::new();
        attrs.insert(ATTR_INVOICE_ID.to_string(), invoice_id.to_string());
        let message_id = self
            .bus
            .publish(&self.topics.converted, event.encode()?, attrs)
            .await?;

        info!(
            invoice_id = %invoice_id,
            pages = event.pages.len(),
            published_message_id = %message_id,
            "Document converted"
        );

        Ok(())
    }
}
