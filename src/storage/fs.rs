// Filesystem-backed object store for local deployments

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{PipelineError, Result};

use super::{object_uri, ObjectRef, ObjectStore};

/// Object store rooted at a local directory; buckets are top-level
/// subdirectories. Missing objects map to the permanent not-found error,
/// all other filesystem failures stay transient.
#[derive(Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, name: &str) -> PathBuf {
        self.root.join(bucket).join(name)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, name: &str) -> Result<Bytes> {
        let path = self.object_path(bucket, name);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                })
            }
            Err(e) => Err(PipelineError::Io(e)),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<String> {
        let path = self.object_path(bucket, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(object_uri(bucket, name))
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_name: &str,
        dst_bucket: &str,
        dst_name: &str,
    ) -> Result<String> {
        let src = self.object_path(src_bucket, src_name);
        let dst = self.object_path(dst_bucket, dst_name);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::copy(&src, &dst).await {
            Ok(_) => Ok(object_uri(dst_bucket, dst_name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::ObjectNotFound {
                    bucket: src_bucket.to_string(),
                    name: src_name.to_string(),
                })
            }
            Err(e) => Err(PipelineError::Io(e)),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectRef>> {
        let bucket_root = self.root.join(bucket);
        let mut found = Vec::new();
        if !bucket_root.exists() {
            return Ok(found);
        }
        collect_files(&bucket_root, &bucket_root, bucket, prefix, &mut found).await?;
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

/// Iterative walk; object stores have no real directories so every file
/// under the bucket root is one object.
async fn collect_files(
    dir: &Path,
    bucket_root: &Path,
    bucket: &str,
    prefix: &str,
    found: &mut Vec<ObjectRef>,
) -> Result<()> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let name = path
                .strip_prefix(bucket_root)
                .map_err(|e| PipelineError::internal(format!("path outside bucket: {}", e)))?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if !name.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata().await?;
            found.push(ObjectRef {
                bucket: bucket.to_string(),
                name,
                size: meta.len(),
                content_type: "application/octet-stream".to_string(),
            });
        }
    }
    Ok(())
}
