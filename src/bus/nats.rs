// NATS-backed bus publisher

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::domain::{PipelineError, Result};

use super::{Attributes, Bus};

/// Bus adapter publishing to NATS subjects. Attributes travel as headers;
/// the generated message id doubles as the `Nats-Msg-Id` dedup header.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %url, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| PipelineError::bus(format!("NATS connection failed: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, topic: &str, body: Bytes, attrs: Attributes) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", message_id.as_str());
        for (key, value) in &attrs {
            headers.insert(key.as_str(), value.as_str());
        }

        self.client
            .publish_with_headers(topic.to_string(), headers, body)
            .await
            .map_err(|e| PipelineError::bus(format!("NATS publish failed: {}", e)))?;

        Ok(message_id)
    }
}
