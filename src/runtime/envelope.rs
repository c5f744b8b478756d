// Push-subscription envelope decoding

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::Attributes;
use crate::domain::{PipelineError, Result};

/// Body of a push-subscription POST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

/// The bus message inside a push body. `data` is base64; `deliveryAttempt`
/// is deployment-dependent and defaults to 1 when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub data: String,
    pub message_id: String,
    pub publish_time: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub delivery_attempt: Option<u32>,
}

/// A decoded delivery handed to the stage handler. The payload is decoded
/// from base64 exactly once, here.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub publish_time: DateTime<Utc>,
    pub delivery_attempt: u32,
    pub attributes: Attributes,
    pub subscription: String,
    pub data: Bytes,
}

impl PushRequest {
    /// Parse a raw push body. Any failure here is poison: the envelope
    /// itself is unusable and the host acks it after logging.
    pub fn decode(body: &[u8]) -> Result<Delivery> {
        let request: PushRequest = serde_json::from_slice(body)
            .map_err(|e| PipelineError::schema(format!("push body does not decode: {}", e)))?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(request.message.data.as_bytes())
            .map_err(|e| PipelineError::schema(format!("message data is not base64: {}", e)))?;

        if request.message.message_id.trim().is_empty() {
            return Err(PipelineError::schema("messageId must not be empty"));
        }

        Ok(Delivery {
            message_id: request.message.message_id,
            publish_time: request.message.publish_time,
            delivery_attempt: request.message.delivery_attempt.unwrap_or(1),
            attributes: request.message.attributes,
            subscription: request.subscription,
            data: Bytes::from(data),
        })
    }
}

impl Delivery {
    /// Build a push body for this delivery, used by tests and by the local
    /// pump to re-wrap bus messages.
    pub fn to_push_body(&self) -> Vec<u8> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        let request = PushRequest {
            message: PushMessage {
                data: encoded,
                message_id: self.message_id.clone(),
                publish_time: self.publish_time,
                attributes: self.attributes.clone(),
                delivery_attempt: Some(self.delivery_attempt),
            },
            subscription: self.subscription.clone(),
        };
        serde_json::to_vec(&request).expect("push request serializes")
    }
}
