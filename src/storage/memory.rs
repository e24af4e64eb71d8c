//! Process-local blob backend
//!
//! Keeps containers in a map guarded by a short-lived lock. Used when no real
//! object store is available (local runs) and as the test double for the
//! photo adapter: it counts calls and can be switched into a failing mode.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;
use url::Url;

use super::{join_segments, parse_base_url, BlobBackend, StorageError, StorageResult};

const DEFAULT_BASE_URL: &str = "http://localhost/blobs/";

/// A stored blob
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct Container {
    public_read: bool,
    blobs: HashMap<String, StoredBlob>,
}

/// In-memory blob backend
pub struct InMemoryBackend {
    base_url: Url,
    containers: RwLock<HashMap<String, Container>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryBackend {
    /// Create a backend whose URLs start with `base_url`
    pub fn new(base_url: Option<&str>) -> StorageResult<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url.unwrap_or(DEFAULT_BASE_URL))?,
            containers: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    /// Count the call and fail it if the backend is switched off
    fn enter(&self, fail: fn(String) -> StorageError) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(fail("backend unavailable".to_string()));
        }
        Ok(())
    }
}

/// Inspection and fault injection for tests
#[cfg(test)]
impl InMemoryBackend {
    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of backend calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn container_exists(&self, container: &str) -> bool {
        self.containers.read().contains_key(container)
    }

    pub fn is_public(&self, container: &str) -> bool {
        self.containers
            .read()
            .get(container)
            .map(|c| c.public_read)
            .unwrap_or(false)
    }

    pub fn get_blob(&self, container: &str, blob_name: &str) -> Option<StoredBlob> {
        self.containers
            .read()
            .get(container)
            .and_then(|c| c.blobs.get(blob_name).cloned())
    }

    pub fn blob_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .map(|c| c.blobs.len())
            .unwrap_or(0)
    }
}

fn missing_container(container: &str) -> String {
    format!("container '{}' does not exist", container)
}

#[async_trait]
impl BlobBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_container_if_not_exists(&self, container: &str) -> StorageResult<bool> {
        self.enter(StorageError::ContainerCreateFailed)?;

        let mut containers = self.containers.write();
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), Container::default());
        Ok(true)
    }

    async fn set_public_read_access(&self, container: &str) -> StorageResult<()> {
        self.enter(StorageError::PermissionFailed)?;

        match self.containers.write().get_mut(container) {
            Some(c) => {
                let already_public = std::mem::replace(&mut c.public_read, true);
                debug!(container, already_public, "Container is publicly readable");
                Ok(())
            }
            None => Err(StorageError::PermissionFailed(missing_container(container))),
        }
    }

    async fn upload_blob(
        &self,
        container: &str,
        blob_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        self.enter(StorageError::UploadFailed)?;

        match self.containers.write().get_mut(container) {
            Some(c) => {
                let blob = StoredBlob {
                    data,
                    content_type: content_type.to_string(),
                };
                debug!(
                    "Storing {} bytes of {} at {}/{}",
                    blob.data.len(),
                    blob.content_type,
                    container,
                    blob_name
                );
                c.blobs.insert(blob_name.to_string(), blob);
            }
            None => return Err(StorageError::UploadFailed(missing_container(container))),
        }

        Ok(self.blob_url(container, blob_name))
    }

    async fn delete_blob_if_exists(&self, container: &str, blob_name: &str) -> StorageResult<bool> {
        self.enter(StorageError::DeleteFailed)?;

        Ok(self
            .containers
            .write()
            .get_mut(container)
            .map(|c| c.blobs.remove(blob_name).is_some())
            .unwrap_or(false))
    }

    async fn delete_container_if_empty(&self, container: &str) -> StorageResult<bool> {
        self.enter(StorageError::DeleteFailed)?;

        // Check and removal under one write lock, like S3 refusing BucketNotEmpty
        let mut containers = self.containers.write();
        let is_empty = containers.get(container).map(|c| c.blobs.is_empty());
        if is_empty == Some(true) {
            containers.remove(container);
            return Ok(true);
        }
        Ok(false)
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> String {
        join_segments(&self.base_url, &[container, blob_name])
    }
}
