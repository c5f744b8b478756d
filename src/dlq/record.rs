// Dead letter record model

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::Attributes;
use crate::runtime::Delivery;

/// Dead-letter attributes stamped by the bus. The delivery-count key
/// follows the Pub/Sub convention; deployments with a different bus map
/// their equivalents onto the same names.
pub const ATTR_DEAD_LETTER_DELIVERY_COUNT: &str = "CloudPubSubDeadLetterSourceDeliveryCount";
pub const ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION: &str = "CloudPubSubDeadLetterSourceSubscription";
pub const ATTR_DEAD_LETTER_PUBLISH_TIME: &str = "CloudPubSubDeadLetterSourceTopicPublishTime";
pub const ATTR_DEAD_LETTER_ERROR_MESSAGE: &str = "CloudPubSubDeadLetterSourceDeliveryErrorMessage";

/// One quarantined message, written as
/// `failed/dlq/<origin_stage>/<yyyy-mm-dd>/<message_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub message_id: String,
    pub origin_topic: String,
    pub origin_stage: String,
    pub delivery_count: u32,
    pub first_failure_at: DateTime<Utc>,
    pub last_error: String,
    pub attributes: Attributes,
    /// Original payload, base64 so arbitrary bytes survive the JSON record
    pub original_body: String,
}

impl DeadLetterRecord {
    /// Compose a record from a DLQ delivery. Missing dead-letter metadata
    /// degrades to the delivery's own fields rather than failing; a record
    /// with partial provenance beats a lost message.
    pub fn from_delivery(delivery: &Delivery, origin_stage: &str) -> Self {
        let delivery_count = delivery
            .attributes
            .get(ATTR_DEAD_LETTER_DELIVERY_COUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(delivery.delivery_attempt);

        let origin_topic = delivery
            .attributes
            .get(ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION)
            .cloned()
            .unwrap_or_else(|| delivery.subscription.clone());

        let first_failure_at = delivery
            .attributes
            .get(ATTR_DEAD_LETTER_PUBLISH_TIME)
            .and_then(|v| v.parse().ok())
            .unwrap_or(delivery.publish_time);

        let last_error = delivery
            .attributes
            .get(ATTR_DEAD_LETTER_ERROR_MESSAGE)
            .cloned()
            .unwrap_or_default();

        Self {
            message_id: delivery.message_id.clone(),
            origin_topic,
            origin_stage: origin_stage.to_string(),
            delivery_count,
            first_failure_at,
            last_error,
            attributes: delivery.attributes.clone(),
            original_body: base64::engine::general_purpose::STANDARD.encode(&delivery.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn dlq_delivery(attrs: Attributes) -> Delivery {
        Delivery {
            message_id: "m-77".to_string(),
            publish_time: "2026-01-15T08:00:00Z".parse().unwrap(),
            delivery_attempt: 1,
            attributes: attrs,
            subscription: "projects/p/subscriptions/invoice-classified-dlq-sub".to_string(),
            data: Bytes::from_static(b"{\"payload\":true}"),
        }
    }

    #[test]
    fn test_record_reads_dead_letter_attributes() {
        let mut attrs = Attributes::new();
        attrs.insert(ATTR_DEAD_LETTER_DELIVERY_COUNT.to_string(), "6".to_string());
        attrs.insert(
            ATTR_DEAD_LETTER_SOURCE_SUBSCRIPTION.to_string(),
            "projects/p/subscriptions/invoice-classified-sub".to_string(),
        );
        attrs.insert(
            ATTR_DEAD_LETTER_ERROR_MESSAGE.to_string(),
            "deadline exceeded".to_string(),
        );

        let record = DeadLetterRecord::from_delivery(&dlq_delivery(attrs), "extractor");

        assert_eq!(record.delivery_count, 6);
        assert_eq!(record.origin_stage, "extractor");
        assert_eq!(record.last_error, "deadline exceeded");
        assert_eq!(
            record.origin_topic,
            "projects/p/subscriptions/invoice-classified-sub"
        );
    }

    #[test]
    fn test_record_degrades_without_attributes() {
        let record = DeadLetterRecord::from_delivery(&dlq_delivery(Attributes::new()), "unknown");

        assert_eq!(record.delivery_count, 1);
        assert_eq!(record.origin_stage, "unknown");
        assert_eq!(
            record.origin_topic,
            "projects/p/subscriptions/invoice-classified-dlq-sub"
        );
        assert_eq!(
            record.first_failure_at,
            "2026-01-15T08:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_original_body_roundtrips() {
        let record = DeadLetterRecord::from_delivery(&dlq_delivery(Attributes::new()), "extractor");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&record.original_body)
            .unwrap();
        assert_eq!(decoded, b"{\"payload\":true}");
    }
}
