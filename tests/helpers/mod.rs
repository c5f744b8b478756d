//! Test utilities for the pipeline suite: in-memory wiring, a scripted
//! vision model, and a small bus pump that mimics push delivery including
//! redelivery and dead-letter routing.

pub mod builders;
pub mod fixtures;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Mutex;

use invoice_pipeline::bus::PublishedMessage;
use invoice_pipeline::config::{BucketConfig, TopicConfig};
use invoice_pipeline::dlq::record::{
    ATTR_DEAD_LETTER_DELIVERY_COUNT, ATTR_DEAD_LETTER_ERROR_MESSAGE,
    ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION,
};
use invoice_pipeline::llm::{ExtractionRequest, ExtractionResponse};
use invoice_pipeline::pages::ImagePageDecoder;
use invoice_pipeline::{
    Classifier, Delivery, DlqProcessor, Extractor, InMemoryBus, InMemoryObjectStore,
    InMemoryWarehouse, Normalizer, PipelineError, Result, RetryPolicy, StageHandler,
    VisionModel, WarehouseWriter,
};

/// One scripted model behavior per call; the last entry repeats forever.
#[derive(Debug, Clone)]
pub enum ModelScript {
    Json(String),
    NonJson,
    Transient,
}

/// Vision model double driven by a script.
pub struct ScriptedVision {
    script: Mutex<Vec<ModelScript>>,
}

impl ScriptedVision {
    pub fn new(script: Vec<ModelScript>) -> Self {
        assert!(!script.is_empty(), "script must have at least one step");
        Self {
            script: Mutex::new(script),
        }
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<ExtractionResponse> {
        let mut script = self.script.lock().await;
        let step = if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        };

        match step {
            ModelScript::Json(text) => Ok(ExtractionResponse {
                text,
                model: "test-model".to_string(),
            }),
            ModelScript::NonJson => Ok(ExtractionResponse {
                text: "The document is illegible.".to_string(),
                model: "test-model".to_string(),
            }),
            ModelScript::Transient => Err(PipelineError::Throttled("scripted 429".to_string())),
        }
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        jitter: Duration::ZERO,
        attempt_timeout: Duration::from_secs(2),
    }
}

/// The whole pipeline over in-memory doubles.
pub struct TestPipeline {
    pub store: InMemoryObjectStore,
    pub bus: InMemoryBus,
    pub warehouse: InMemoryWarehouse,
    pub buckets: BucketConfig,
    pub topics: TopicConfig,
    pub max_delivery_attempts: u32,
    normalizer: Normalizer,
    classifier: Classifier,
    extractor: Extractor,
    warehouse_writer: WarehouseWriter,
    dlq_processor: DlqProcessor,
}

impl TestPipeline {
    pub fn new(script: Vec<ModelScript>) -> Self {
        let store = InMemoryObjectStore::new();
        let bus = InMemoryBus::new();
        let warehouse = InMemoryWarehouse::new();
        let buckets = BucketConfig::default();
        let topics = TopicConfig::default();

        let normalizer = Normalizer::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(ImagePageDecoder::new()),
            buckets.clone(),
            topics.clone(),
        );
        let classifier = Classifier::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            buckets.clone(),
            topics.clone(),
        );
        let extractor = Extractor::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(ScriptedVision::new(script)),
            "test-model".to_string(),
            buckets.clone(),
            topics.clone(),
        )
        .with_retry(fast_retry());
        let warehouse_writer = WarehouseWriter::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(warehouse.clone()),
            buckets.clone(),
            topics.clone(),
        )
        .with_retry(fast_retry());
        let dlq_processor = DlqProcessor::new(
            Arc::new(store.clone()),
            buckets.failed.clone(),
            topics.clone(),
        );

        Self {
            store,
            bus,
            warehouse,
            buckets,
            topics,
            max_delivery_attempts: 5,
            normalizer,
            classifier,
            extractor,
            warehouse_writer,
            dlq_processor,
        }
    }

    pub fn with_max_delivery_attempts(mut self, max: u32) -> Self {
        self.max_delivery_attempts = max;
        self
    }

    /// Seed a landing object and publish the storage notification.
    pub async fn upload(&self, name: &str, content_type: &str, data: Bytes) {
        self.store
            .seed("landing", name, data, content_type)
            .await;

        let notification = serde_json::json!({
            "bucket": "landing",
            "name": name,
            "contentType": content_type,
            "size": "1024",
            "timeCreated": Utc::now().to_rfc3339(),
        });
        use invoice_pipeline::Bus;
        self.bus
            .publish(
                &self.topics.uploaded,
                Bytes::from(serde_json::to_vec(&notification).unwrap()),
                HashMap::new(),
            )
            .await
            .unwrap();
    }

    fn handler_for(&self, topic: &str) -> Option<&dyn StageHandler> {
        if topic.ends_with(&self.topics.dlq_suffix) {
            return Some(&self.dlq_processor);
        }
        if topic == self.topics.uploaded {
            Some(&self.normalizer)
        } else if topic == self.topics.converted {
            Some(&self.classifier)
        } else if topic == self.topics.classified {
            Some(&self.extractor)
        } else if topic == self.topics.extracted {
            Some(&self.warehouse_writer)
        } else {
            None
        }
    }

    fn delivery_for(message: &PublishedMessage, attempt: u32) -> Delivery {
        Delivery {
            message_id: message.message_id.clone(),
            publish_time: Utc::now(),
            delivery_attempt: attempt,
            attributes: message.attributes.clone(),
            subscription: format!("projects/test/subscriptions/{}-sub", message.topic),
            data: message.body.clone(),
        }
    }

    /// Pump the bus until it is empty, mimicking push delivery: transient
    /// failures are redelivered up to the configured maximum and then routed
    /// to the DLQ twin; permanent failures are acked after the stage has
    /// quarantined them. Returns every `Loaded` event observed.
    pub async fn drain(&self) -> Vec<PublishedMessage> {
        let mut loaded = Vec::new();
        let mut iterations = 0;

        while let Some(message) = self.bus.pop().await {
            iterations += 1;
            assert!(iterations < 500, "pipeline did not converge");

            if message.topic == self.topics.loaded {
                loaded.push(message);
                continue;
            }

            let Some(handler) = self.handler_for(&message.topic) else {
                panic!("no handler consumes topic {}", message.topic);
            };

            let mut attempt = 1;
            loop {
                let delivery = Self::delivery_for(&message, attempt);
                match handler.handle(&delivery).await {
                    Ok(()) => break,
                    Err(e) if !e.is_transient() => break, // quarantine happened in-stage
                    Err(e) => {
                        if attempt >= self.max_delivery_attempts {
                            self.dead_letter(&message, attempt, &e).await;
                            break;
                        }
                        attempt += 1;
                    }
                }
            }
        }

        loaded
    }

    /// Route an exhausted message to its DLQ twin the way the bus would.
    async fn dead_letter(&self, message: &PublishedMessage, attempts: u32, error: &PipelineError) {
        use invoice_pipeline::Bus;

        let mut attrs = message.attributes.clone();
        attrs.insert(
            ATTR_DEAD_LETTER_DELIVERY_COUNT.to_string(),
            attempts.to_string(),
        );
        attrs.insert(
            ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION.to_string(),
            format!("projects/test/subscriptions/{}-sub", message.topic),
        );
        attrs.insert(
            ATTR_DEAD_LETTER_ERROR_MESSAGE.to_string(),
            error.to_string(),
        );

        let dlq_topic = self.topics.dlq_for(&message.topic);
        self.bus
            .publish(&dlq_topic, message.body.clone(), attrs)
            .await
            .unwrap();
    }
}
