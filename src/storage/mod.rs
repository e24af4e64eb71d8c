//! Blob storage backends
//!
//! The photo adapter only talks to the [`BlobBackend`] trait. Two
//! implementations exist: S3-compatible object storage (via the AWS SDK)
//! and a process-local store for development and tests.

mod memory;
mod s3;

pub use memory::InMemoryBackend;
pub use s3::S3Backend;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

/// Errors that can occur during blob storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage not configured: {0}")]
    NotConfigured(String),

    #[error("Container creation failed: {0}")]
    ContainerCreateFailed(String),

    #[error("Setting container permissions failed: {0}")]
    PermissionFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Blob storage contract used by the photo adapter
///
/// A container is a flat namespace of blobs (an S3 bucket). Every call is an
/// independent request against the backend; implementations hold no
/// per-request state.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Backend code (e.g., "s3", "memory")
    fn name(&self) -> &'static str;

    /// Create `container` unless it exists. Returns `true` if it was created by this call.
    async fn create_container_if_not_exists(&self, container: &str) -> StorageResult<bool>;

    /// Allow anonymous reads of individual blobs. Listing stays private.
    async fn set_public_read_access(&self, container: &str) -> StorageResult<()>;

    /// Store `data` under `blob_name` and return the blob's canonical URL
    async fn upload_blob(
        &self,
        container: &str,
        blob_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Delete a blob. Returns `false` if it did not exist.
    async fn delete_blob_if_exists(&self, container: &str, blob_name: &str) -> StorageResult<bool>;

    /// Delete `container` only if it holds no blobs. The emptiness check and
    /// the removal are a single backend operation. Returns `false` if the
    /// container still has blobs or does not exist.
    async fn delete_container_if_empty(&self, container: &str) -> StorageResult<bool>;

    /// Canonical URL of a blob, without contacting the backend
    fn blob_url(&self, container: &str, blob_name: &str) -> String;
}

/// Parse a base URL that blob paths get appended to
pub(crate) fn parse_base_url(raw: &str) -> StorageResult<Url> {
    let url = Url::parse(raw).map_err(|e| StorageError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(StorageError::InvalidUrl(format!("{} cannot be used as a base URL", raw)));
    }
    Ok(url)
}

/// Append path segments to `base`, percent-encoding each one
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> String {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url.to_string()
}
