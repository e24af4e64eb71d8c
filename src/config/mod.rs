//! Configuration module for the photo store

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub photos: PhotoSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Which blob backend the service talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Any S3-compatible object store (AWS S3, R2, MinIO, ...)
    S3,
    /// Process-local store, contents are lost on restart
    Memory,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: BackendKind,
    /// Custom endpoint for S3-compatible stores. Unset means AWS.
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials. When unset the default AWS provider chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base used when building canonical blob URLs, e.g. a CDN in front of the bucket
    pub public_url_prefix: Option<String>,
    pub force_path_style: bool,
}

/// Photo adapter behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhotoSettings {
    /// Fixed prefix of every generated blob name
    pub blob_prefix: String,
    /// Drop a container once its last photo has been deleted
    pub remove_empty_containers: bool,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (`PHOTOS__SECTION__KEY`, e.g. `PHOTOS__STORAGE__REGION`)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(environment());

        builder.build()?.try_deserialize()
    }
}

/// PHOTOS__STORAGE__REGION, PHOTOS__SERVER__PORT, ...
fn environment() -> Environment {
    Environment::with_prefix("PHOTOS")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            backend: BackendKind::S3,
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            public_url_prefix: None,
            force_path_style: false,
        }
    }
}

impl Default for PhotoSettings {
    fn default() -> Self {
        PhotoSettings {
            blob_prefix: "productphoto".to_string(),
            remove_empty_containers: false,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}
