// Stage B: vendor classifier

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::bus::{Attributes, Bus, ATTR_INVOICE_ID, ATTR_VENDOR};
use crate::config::{BucketConfig, TopicConfig};
use crate::domain::{
    ClassifiedEvent, ConvertedEvent, EventPayload, PageRef, Result, VendorType,
};
use crate::runtime::{Delivery, Stage, StageHandler};
use crate::storage::{layout, ObjectStore};

/// Determines the vendor from the invoice identifier and partitions the
/// pages into the vendor-keyed area. Classification itself cannot fail;
/// unrecognized identifiers become `other`.
///
/// Content-based classification stays a possible extension: the page list
/// is in hand here, but a pattern match is always authoritative.
pub struct Classifier {
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn Bus>,
    buckets: BucketConfig,
    topics: TopicConfig,
}

impl Classifier {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn Bus>,
        buckets: BucketConfig,
        topics: TopicConfig,
    ) -> Self {
        Self {
            store,
            bus,
            buckets,
            topics,
        }
    }
}

#[async_trait]
impl StageHandler for Classifier {
    fn stage(&self) -> Stage {
        Stage::Classifier
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let event = ConvertedEvent::decode(&delivery.data)?;
        let vendor = VendorType::from_invoice_id(event.invoice_id.as_str());

        info!(
            invoice_id = %event.invoice_id,
            message_id = %delivery.message_id,
            vendor = %vendor,
            pages = event.pages.len(),
            "Classifying invoice"
        );

        let mut classified_pages = Vec::with_capacity(event.pages.len());
        for page in &event.pages {
            let name = layout::classified_page(vendor, &event.invoice_id, page.page_index);
            // Same source, same destination name: the copy converges on
            // identical content no matter how often it is replayed.
            self.store
                .copy(&page.bucket, &page.name, &self.buckets.classified, &name)
                .await?;
            classified_pages.push(PageRef {
                bucket: self.buckets.classified.clone(),
                name,
                page_index: page.page_index,
            });
        }

        let classified = ClassifiedEvent {
            invoice_id: event.invoice_id.clone(),
            vendor,
            source: event.source,
            pages: classified_pages,
        };

        let mut attrs = Attributes::new();
        attrs.insert(ATTR_INVOICE_ID.to_string(), event.invoice_id.to_string());
        attrs.insert(ATTR_VENDOR.to_string(), vendor.as_str().to_string());
        self.bus
            .publish(&self.topics.classified, classified.encode()?, attrs)
            .await?;

        info!(
            invoice_id = %event.invoice_id,
            vendor = %vendor,
            "Invoice classified"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::domain::{InvoiceId, SourceRef};
    use crate::storage::InMemoryObjectStore;
    use bytes::Bytes;
    use chrono::Utc;

    async fn seeded_delivery(store: &InMemoryObjectStore, invoice_id: &str) -> Delivery {
        let mut pages = Vec::new();
        for index in 0..2u32 {
            let name = format!("processed/{}/page-{:03}.png", invoice_id, index);
            store
                .seed(
                    "invoices-processed",
                    &name,
                    Bytes::from(format!("png-{}", index)),
                    "image/png",
                )
                .await;
            pages.push(PageRef {
                bucket: "invoices-processed".to_string(),
                name,
                page_index: index,
            });
        }

        let event = ConvertedEvent {
            invoice_id: InvoiceId::new(invoice_id),
            source: SourceRef {
                bucket: "landing".to_string(),
                name: format!("{}.tiff", invoice_id),
            },
            pages,
        };

        Delivery {
            message_id: "m-1".to_string(),
            publish_time: Utc::now(),
            delivery_attempt: 1,
            attributes: Attributes::new(),
            subscription: "s".to_string(),
            data: event.encode().unwrap(),
        }
    }

    fn classifier(store: &InMemoryObjectStore, bus: &InMemoryBus) -> Classifier {
        Classifier::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            BucketConfig::default(),
            TopicConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_vendor_partitioned_copies_and_event() {
        let store = InMemoryObjectStore::new();
        let bus = InMemoryBus::new();
        let delivery = seeded_delivery(&store, "UE-2026-000001").await;

        classifier(&store, &bus).handle(&delivery).await.unwrap();

        assert!(
            store
                .contains(
                    "invoices-classified",
                    "classified/ubereats/UE-2026-000001/page-000.png"
                )
                .await
        );

        let published = bus.published_to("invoice-classified").await;
        assert_eq!(published.len(), 1);
        let event = ClassifiedEvent::decode(&published[0].body).unwrap();
        assert_eq!(event.vendor, VendorType::UberEats);
        assert_eq!(event.pages.len(), 2);
        assert_eq!(event.source.name, "UE-2026-000001.tiff");
        assert_eq!(
            published[0].attributes.get(ATTR_VENDOR).map(String::as_str),
            Some("ubereats")
        );
    }

    #[tokio::test]
    async fn test_unrecognized_id_is_other() {
        let store = InMemoryObjectStore::new();
        let bus = InMemoryBus::new();
        let delivery = seeded_delivery(&store, "unknown-abcdef0123456789").await;

        classifier(&store, &bus).handle(&delivery).await.unwrap();

        let published = bus.published_to("invoice-classified").await;
        let event = ClassifiedEvent::decode(&published[0].body).unwrap();
        assert_eq!(event.vendor, VendorType::Other);
        assert!(event.pages[0].name.starts_with("classified/other/"));
    }

    #[tokio::test]
    async fn test_replay_converges() {
        let store = InMemoryObjectStore::new();
        let bus = InMemoryBus::new();
        let delivery = seeded_delivery(&store, "DD-42").await;

        let stage = classifier(&store, &bus);
        stage.handle(&delivery).await.unwrap();
        let count_after_first = store.object_count().await;
        stage.handle(&delivery).await.unwrap();

        assert_eq!(store.object_count().await, count_after_first);
    }

    #[tokio::test]
    async fn test_missing_page_is_not_transient_noise() {
        let store = InMemoryObjectStore::new();
        let bus = InMemoryBus::new();
        // Event references pages that were never written.
        let event = ConvertedEvent {
            invoice_id: InvoiceId::new("GH-7"),
            source: SourceRef {
                bucket: "landing".to_string(),
                name: "GH-7.tiff".to_string(),
            },
            pages: vec![PageRef {
                bucket: "invoices-processed".to_string(),
                name: "processed/GH-7/page-000.png".to_string(),
                page_index: 0,
            }],
        };
        let delivery = Delivery {
            message_id: "m-1".to_string(),
            publish_time: Utc::now(),
            delivery_attempt: 1,
            attributes: Attributes::new(),
            subscription: "s".to_string(),
            data: event.encode().unwrap(),
        };

        let err = classifier(&store, &bus).handle(&delivery).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(bus.published().await.is_empty());
    }
}
