//! Photo storage adapter
//!
//! Uploads photos into the container named after their category and deletes
//! them again given the URL handed out at upload time. Each call is a short,
//! independent sequence of backend requests; nothing is cached between calls.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::PhotoSettings;
use crate::domain::photo::{blob_name_from_url, generate_blob_name};
use crate::domain::{Category, UploadedFile};
use crate::storage::{BlobBackend, StorageError};

/// Photo adapter errors
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Invalid category: '{0}'")]
    InvalidCategory(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type PhotoResult<T> = Result<T, PhotoError>;

/// Uploads and deletes category photos through an injected blob backend
#[derive(Clone)]
pub struct PhotoService {
    backend: Arc<dyn BlobBackend>,
    blob_prefix: String,
    remove_empty_containers: bool,
}

impl PhotoService {
    pub fn new(backend: Arc<dyn BlobBackend>, settings: &PhotoSettings) -> Self {
        Self {
            backend,
            blob_prefix: settings.blob_prefix.clone(),
            remove_empty_containers: settings.remove_empty_containers,
        }
    }

    /// Backend code, for health reporting
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store a photo under `category` and return its public URL.
    ///
    /// A missing or empty file is not an error: `Ok(None)` is returned and the
    /// backend is never contacted. The container is created on first use and
    /// made publicly readable.
    #[instrument(skip(self, file), fields(
        file_name = file.as_ref().map(|f| f.file_name.as_str()),
        size = file.as_ref().map(|f| f.len()),
    ))]
    pub async fn upload_photo(
        &self,
        category: &str,
        file: Option<UploadedFile>,
    ) -> PhotoResult<Option<String>> {
        let file = match file {
            Some(f) if !f.is_empty() => f,
            _ => return Ok(None),
        };
        let category = normalize(category)?;

        match self.store(&category, file).await {
            Ok(url) => {
                info!(container = %category, image_path = %url, "Photo uploaded");
                Ok(Some(url))
            }
            Err(e) => {
                error!(container = %category, error = %e, "Error uploading the photo blob to storage");
                Err(e.into())
            }
        }
    }

    /// Delete the photo behind `url` from `category`.
    ///
    /// Returns whether a blob was actually removed. An empty URL counts as a
    /// successful no-op.
    #[instrument(skip(self))]
    pub async fn delete_photo(&self, category: &str, url: &str) -> PhotoResult<bool> {
        if url.is_empty() {
            return Ok(true);
        }
        let category = normalize(category)?;

        match self.remove(&category, url).await {
            Ok(deleted) => {
                info!(container = %category, image_path = %url, deleted, "Photo deleted");
                Ok(deleted)
            }
            Err(e) => {
                error!(container = %category, error = %e, "Error deleting the photo from blob storage");
                Err(e.into())
            }
        }
    }

    async fn store(&self, category: &Category, file: UploadedFile) -> Result<String, StorageError> {
        let container = category.as_str();

        if self.backend.create_container_if_not_exists(container).await? {
            self.backend.set_public_read_access(container).await?;
            info!(container, "Created blob container and made it public");
        }

        let blob_name = generate_blob_name(&self.blob_prefix, file.extension());

        self.backend
            .upload_blob(container, &blob_name, file.data, &file.content_type)
            .await
    }

    async fn remove(&self, category: &Category, url: &str) -> Result<bool, StorageError> {
        let container = category.as_str();
        let blob_name = blob_name_from_url(url);

        let deleted = self.backend.delete_blob_if_exists(container, &blob_name).await?;

        if deleted && self.remove_empty_containers && self.backend.delete_container_if_empty(container).await? {
            info!(container, "Deleted empty blob container");
        }

        Ok(deleted)
    }
}

fn normalize(raw: &str) -> PhotoResult<Category> {
    Category::normalize(raw).ok_or_else(|| PhotoError::InvalidCategory(raw.to_string()))
}
