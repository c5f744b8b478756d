// DLQ drain stage

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};

use crate::config::TopicConfig;
use crate::domain::Result;
use crate::runtime::{Delivery, Stage, StageHandler};
use crate::storage::{layout, ObjectStore};

use super::record::{DeadLetterRecord, ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION};

/// Drains every DLQ topic into the quarantine area.
///
/// Always acks: a message that reached the DLQ has already exhausted its
/// retries, so nothing downstream will ever want it back on a topic. The
/// only error surfaced is a failed quarantine write, which redelivers so
/// the record is not silently dropped.
pub struct DlqProcessor {
    store: Arc<dyn ObjectStore>,
    failed_bucket: String,
    topics: TopicConfig,
}

impl DlqProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, failed_bucket: String, topics: TopicConfig) -> Self {
        Self {
            store,
            failed_bucket,
            topics,
        }
    }

    /// Identify the stage whose topic dead-lettered this message, from the
    /// dead-letter attributes when present, else the push subscription.
    fn origin_stage(&self, delivery: &Delivery) -> String {
        let source = delivery
            .attributes
            .get(ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION)
            .map(String::as_str)
            .unwrap_or(&delivery.subscription);

        match self.topics.stage_for_dlq(source) {
            Some(stage) => stage.as_str().to_string(),
            None => {
                warn!(
                    message_id = %delivery.message_id,
                    source = %source,
                    "Cannot attribute dead letter to a stage"
                );
                "unknown".to_string()
            }
        }
    }
}

#[async_trait]
impl StageHandler for DlqProcessor {
    fn stage(&self) -> Stage {
        Stage::DlqProcessor
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let origin_stage = self.origin_stage(delivery);
        let record = DeadLetterRecord::from_delivery(delivery, &origin_stage);

        // Keyed by message id: redeliveries of the same dead letter
        // overwrite the same record.
        let name = layout::dlq_record(
            &origin_stage,
            record.first_failure_at.date_naive(),
            &delivery.message_id,
        );

        self.store
            .put(
                &self.failed_bucket,
                &name,
                Bytes::from(serde_json::to_vec_pretty(&record)?),
                "application/json",
            )
            .await?;

        info!(
            message_id = %delivery.message_id,
            origin_stage = %origin_stage,
            delivery_count = record.delivery_count,
            quarantined_as = %name,
            "Dead letter recorded"
        );

        metrics::counter!(
            "pipeline_dead_letters_total",
            1,
            "origin_stage" => origin_stage,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Attributes;
    use crate::dlq::record::ATTR_DEAD_LETTER_DELIVERY_COUNT;
    use crate::storage::InMemoryObjectStore;
    use chrono::Utc;

    fn dlq_delivery(message_id: &str, subscription: &str, attrs: Attributes) -> Delivery {
        Delivery {
            message_id: message_id.to_string(),
            publish_time: "2026-01-15T08:00:00Z".parse().unwrap(),
            delivery_attempt: 1,
            attributes: attrs,
            subscription: subscription.to_string(),
            data: Bytes::from_static(b"{\"invoice_id\":\"UE-1\"}"),
        }
    }

    fn processor(store: &InMemoryObjectStore) -> DlqProcessor {
        DlqProcessor::new(
            Arc::new(store.clone()),
            "invoices-failed".to_string(),
            TopicConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_record_lands_under_origin_stage() {
        let store = InMemoryObjectStore::new();
        let mut attrs = Attributes::new();
        attrs.insert(ATTR_DEAD_LETTER_DELIVERY_COUNT.to_string(), "5".to_string());

        processor(&store)
            .handle(&dlq_delivery(
                "m-9",
                "projects/p/subscriptions/invoice-classified-dlq-sub",
                attrs,
            ))
            .await
            .unwrap();

        let body = store
            .get("invoices-failed", "failed/dlq/extractor/2026-01-15/m-9.json")
            .await
            .unwrap();
        let record: DeadLetterRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.delivery_count, 5);
        assert_eq!(record.origin_stage, "extractor");
    }

    #[tokio::test]
    async fn test_replay_overwrites_same_record() {
        let store = InMemoryObjectStore::new();
        let delivery = dlq_delivery(
            "m-9",
            "projects/p/subscriptions/invoice-uploaded-dlq-sub",
            Attributes::new(),
        );

        let stage = processor(&store);
        stage.handle(&delivery).await.unwrap();
        stage.handle(&delivery).await.unwrap();

        let records = store.list("invoices-failed", "failed/dlq/").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "failed/dlq/normalizer/2026-01-15/m-9.json");
    }

    #[tokio::test]
    async fn test_unattributable_source_still_records() {
        let store = InMemoryObjectStore::new();
        let delivery = dlq_delivery("m-10", "projects/p/subscriptions/mystery", Attributes::new());

        processor(&store).handle(&delivery).await.unwrap();

        let records = store.list("invoices-failed", "failed/dlq/unknown/").await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_publish_time_uses_delivery_time() {
        let store = InMemoryObjectStore::new();
        let mut delivery = dlq_delivery(
            "m-11",
            "projects/p/subscriptions/invoice-extracted-dlq-sub",
            Attributes::new(),
        );
        delivery.publish_time = Utc::now();

        processor(&store).handle(&delivery).await.unwrap();

        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let records = store
            .list("invoices-failed", "failed/dlq/warehouse-writer/")
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].name.contains(&today));
    }
}
