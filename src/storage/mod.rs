//! Object storage port and adapters.
//!
//! Stages only ever see the [`ObjectStore`] trait; tests substitute the
//! in-memory adapter and local deployments use the filesystem adapter.
//! Every write in the pipeline is overwrite-safe so redelivered messages
//! converge on identical storage contents.

pub mod fs;
pub mod layout;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::Result;

pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;

/// Listing entry returned by [`ObjectStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Abstract object store.
///
/// Errors are classified through `PipelineError::kind()`: I/O problems are
/// transient, a missing object is permanent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, name: &str) -> Result<Bytes>;

    /// Write an object, replacing any existing content. Returns the uri.
    async fn put(&self, bucket: &str, name: &str, data: Bytes, content_type: &str)
        -> Result<String>;

    /// Server-side copy. Returns the destination uri.
    async fn copy(
        &self,
        src_bucket: &str,
        src_name: &str,
        dst_bucket: &str,
        dst_name: &str,
    ) -> Result<String>;

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectRef>>;
}

/// Canonical uri for an object.
pub fn object_uri(bucket: &str, name: &str) -> String {
    format!("store://{}/{}", bucket, name)
}
