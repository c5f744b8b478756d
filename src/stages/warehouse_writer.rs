// Stage D: warehouse writer

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::bus::{
    Attributes, Bus, ATTR_EXTRACTION_LATENCY_MS, ATTR_EXTRACTION_MODEL, ATTR_INVOICE_ID,
};
use crate::config::{BucketConfig, TopicConfig};
use crate::domain::{EventPayload, ExtractedEvent, LoadedEvent, PipelineError, Result};
use crate::retry::RetryPolicy;
use crate::runtime::{Delivery, Stage, StageHandler};
use crate::storage::{layout, ObjectStore};
use crate::warehouse::{is_unique_violation, rows_for, ExtractionContext, WarehouseRepository};

/// Persists validated extractions, deduplicating on the invoice id, then
/// archives the landing object and announces the load.
pub struct WarehouseWriter {
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn Bus>,
    repository: Arc<dyn WarehouseRepository>,
    buckets: BucketConfig,
    topics: TopicConfig,
    retry: RetryPolicy,
}

impl WarehouseWriter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn Bus>,
        repository: Arc<dyn WarehouseRepository>,
        buckets: BucketConfig,
        topics: TopicConfig,
    ) -> Self {
        Self {
            store,
            bus,
            repository,
            buckets,
            topics,
            retry: RetryPolicy::warehouse(),
        }
    }

    /// Override the in-stage insert retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Quarantine an event whose payload can never load, keyed by message
    /// id because the invoice id may be unreadable.
    async fn quarantine(&self, delivery: &Delivery, cause: &PipelineError) -> Result<()> {
        let name = layout::failed("warehouse", Utc::now().date_naive(), &format!(
            "{}.json",
            delivery.message_id
        ));
        self.store
            .put(
                &self.buckets.failed,
                &name,
                delivery.data.clone(),
                "application/json",
            )
            .await?;
        error!(
            message_id = %delivery.message_id,
            reason = %cause,
            quarantined_as = %name,
            "Unloadable extraction quarantined"
        );
        Ok(())
    }
}

#[async_trait]
impl StageHandler for WarehouseWriter {
    fn stage(&self) -> Stage {
        Stage::WarehouseWriter
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        // Decode re-validates the extraction, including the cross-field
        // arithmetic, before anything touches the warehouse.
        let event = match ExtractedEvent::decode(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                self.quarantine(delivery, &e).await?;
                return Err(e);
            }
        };

        let invoice_id = event.invoice_id.as_str();

        let duplicate = self.repository.invoice_exists(invoice_id).await?;
        let row_id = uuid::Uuid::now_v7().to_string();

        if duplicate {
            warn!(
                invoice_id = %invoice_id,
                message_id = %delivery.message_id,
                duplicate = true,
                "Invoice already loaded, skipping inserts"
            );
        } else {
            let ctx = ExtractionContext {
                source_file: event.source.name.clone(),
                extraction_model: delivery
                    .attributes
                    .get(ATTR_EXTRACTION_MODEL)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                extraction_latency_ms: delivery
                    .attributes
                    .get(ATTR_EXTRACTION_LATENCY_MS)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                confidence_score: None,
            };
            let (header, items, metrics) = rows_for(&event.extraction, &ctx, Utc::now());

            let insert = self
                .retry
                .run("warehouse insert", |_| {
                    self.repository.insert_extraction(&header, &items, &metrics)
                })
                .await;

            match insert {
                Ok(()) => {
                    info!(
                        invoice_id = %invoice_id,
                        row_id = %row_id,
                        line_items = items.len(),
                        "Invoice loaded"
                    );
                }
                Err(e) if is_unique_violation(&e) => {
                    // Another delivery of the same invoice won the race
                    // between the dedup read and the insert.
                    warn!(
                        invoice_id = %invoice_id,
                        duplicate = true,
                        "Concurrent load detected, treating as duplicate"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // Archival keeps the landing object in place; deleting it is out of
        // scope. A landing object that has vanished cannot be archived by
        // any retry, so that case is logged and skipped.
        let archive_name = layout::archive(Utc::now().date_naive(), &event.source.name);
        match self
            .store
            .copy(
                &event.source.bucket,
                &event.source.name,
                &self.buckets.archive,
                &archive_name,
            )
            .await
        {
            Ok(_) => {}
            Err(PipelineError::ObjectNotFound { bucket, name }) => {
                warn!(
                    invoice_id = %invoice_id,
                    bucket = %bucket,
                    name = %name,
                    "Landing object gone, skipping archival"
                );
            }
            Err(e) => return Err(e),
        }

        let loaded = LoadedEvent {
            invoice_id: event.invoice_id.clone(),
            row_id,
            table: "invoices".to_string(),
        };
        let mut attrs = Attributes::new();
        attrs.insert(ATTR_INVOICE_ID.to_string(), invoice_id.to_string());
        self.bus
            .publish(&self.topics.loaded, loaded.encode()?, attrs)
            .await?;

        Ok(())
    }
}
