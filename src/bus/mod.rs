//! Message bus publish port.
//!
//! Push delivery is not abstracted here; the stage runtime terminates the
//! push-subscription protocol over HTTP. Stages only need to publish.

pub mod nats;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Result;

pub use nats::NatsBus;

/// Attributes attached to a published message.
pub type Attributes = HashMap<String, String>;

/// Attribute keys the stages attach to published events.
pub const ATTR_INVOICE_ID: &str = "invoice_id";
pub const ATTR_VENDOR: &str = "vendor";
pub const ATTR_EXTRACTION_MODEL: &str = "extraction_model";
pub const ATTR_EXTRACTION_LATENCY_MS: &str = "extraction_latency_ms";

#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a message, returning the bus-assigned message id.
    async fn publish(&self, topic: &str, body: Bytes, attrs: Attributes) -> Result<String>;
}

/// A message captured by the in-memory bus.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub message_id: String,
    pub body: Bytes,
    pub attributes: Attributes,
}

/// Bus double that records publishes for inspection and replay in tests.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages published so far, oldest first.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().await.clone()
    }

    /// Messages published to one topic.
    pub async fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Remove and return the oldest undelivered message, any topic.
    pub async fn pop(&self) -> Option<PublishedMessage> {
        let mut messages = self.messages.lock().await;
        if messages.is_empty() {
            None
        } else {
            Some(messages.remove(0))
        }
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, topic: &str, body: Bytes, attrs: Attributes) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();
        let mut messages = self.messages.lock().await;
        messages.push(PublishedMessage {
            topic: topic.to_string(),
            message_id: message_id.clone(),
            body,
            attributes: attrs,
        });
        Ok(message_id)
    }
}
