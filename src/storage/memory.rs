// In-memory object store for tests and local development

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::domain::{PipelineError, Result};

use super::{object_uri, ObjectRef, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

/// Object store double backed by a map keyed on `(bucket, name)`.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object outside the pipeline, e.g. a landing upload.
    pub async fn seed(&self, bucket: &str, name: &str, data: Bytes, content_type: &str) {
        let mut objects = self.objects.write().await;
        objects.insert(
            (bucket.to_string(), name.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
    }

    pub async fn contains(&self, bucket: &str, name: &str) -> bool {
        let objects = self.objects.read().await;
        objects.contains_key(&(bucket.to_string(), name.to_string()))
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, name: &str) -> Result<Bytes> {
        let objects = self.objects.read().await;
        objects
            .get(&(bucket.to_string(), name.to_string()))
            .map(|o| o.data.clone())
            .ok_or_else(|| PipelineError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let mut objects = self.objects.write().await;
        objects.insert(
            (bucket.to_string(), name.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(object_uri(bucket, name))
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_name: &str,
        dst_bucket: &str,
        dst_name: &str,
    ) -> Result<String> {
        let mut objects = self.objects.write().await;
        let source = objects
            .get(&(src_bucket.to_string(), src_name.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::ObjectNotFound {
                bucket: src_bucket.to_string(),
                name: src_name.to_string(),
            })?;
        objects.insert((dst_bucket.to_string(), dst_name.to_string()), source);
        Ok(object_uri(dst_bucket, dst_name))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectRef>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((b, n), _)| b == bucket && n.starts_with(prefix))
            .map(|((b, n), o)| ObjectRef {
                bucket: b.clone(),
                name: n.clone(),
                size: o.data.len() as u64,
                content_type: o.content_type.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryObjectStore::new();
        let uri = store
            .put("bucket", "a/b.png", Bytes::from_static(b"data"), "image/png")
            .await
            .unwrap();

        assert_eq!(uri, "store://bucket/a/b.png");
        assert_eq!(store.get("bucket", "a/b.png").await.unwrap(), "data");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.get("bucket", "missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryObjectStore::new();
        store
            .put("b", "x", Bytes::from_static(b"one"), "text/plain")
            .await
            .unwrap();
        store
            .put("b", "x", Bytes::from_static(b"two"), "text/plain")
            .await
            .unwrap();

        assert_eq!(store.get("b", "x").await.unwrap(), "two");
        assert_eq!(store.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_copy_is_idempotent() {
        let store = InMemoryObjectStore::new();
        store
            .seed("src", "doc.tiff", Bytes::from_static(b"tiff"), "image/tiff")
            .await;

        let uri1 = store.copy("src", "doc.tiff", "dst", "doc.tiff").await.unwrap();
        let uri2 = store.copy("src", "doc.tiff", "dst", "doc.tiff").await.unwrap();

        assert_eq!(uri1, uri2);
        assert_eq!(store.get("dst", "doc.tiff").await.unwrap(), "tiff");
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = InMemoryObjectStore::new();
        store.seed("b", "p/one.png", Bytes::from_static(b"1"), "image/png").await;
        store.seed("b", "p/two.png", Bytes::from_static(b"2"), "image/png").await;
        store.seed("b", "q/other.png", Bytes::from_static(b"3"), "image/png").await;

        let listed = store.list("b", "p/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|o| o.name.starts_with("p/")));
    }
}
