//! S3-compatible blob backend
//!
//! Containers map to buckets and blobs to objects. Works against AWS S3 and
//! any store speaking the same API (R2, MinIO, ...) through a custom endpoint.
//!
//! ## Canonical URLs
//! ```text
//! public_url_prefix set   {prefix}/{bucket}/{blob}
//! endpoint set            {endpoint}/{bucket}/{blob}
//! plain AWS               https://{bucket}.s3.{region}.amazonaws.com/{blob}
//! ```

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use bytes::Bytes;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{join_segments, parse_base_url, BlobBackend, StorageError, StorageResult};
use crate::config::StorageSettings;

/// AWS's default region, which rejects an explicit location constraint
const US_EAST_1: &str = "us-east-1";

/// How canonical blob URLs are built
#[derive(Debug, Clone)]
enum UrlStyle {
    /// `{base}/{bucket}/{blob}`
    PathStyle(Url),
    /// `https://{bucket}.s3.{region}.amazonaws.com/{blob}`
    VirtualHosted { region: String },
}

/// Blob backend for S3-compatible object storage
#[derive(Clone)]
pub struct S3Backend {
    client: S3Client,
    region: String,
    custom_endpoint: bool,
    url_style: UrlStyle,
}

impl S3Backend {
    /// Create a new S3 backend from settings
    pub async fn new(settings: &StorageSettings) -> StorageResult<Self> {
        let region = Region::new(settings.region.clone());

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

        match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = Credentials::new(
                    key_id,
                    secret,
                    None, // session token
                    None, // expiry
                    "photo-store-static-credentials",
                );
                loader = loader.credentials_provider(credentials);
            }
            (None, None) => debug!("No static credentials configured, using the default provider chain"),
            _ => {
                return Err(StorageError::NotConfigured(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ))
            }
        }

        if let Some(ref endpoint) = settings.endpoint {
            debug!("Creating S3 client with endpoint: {}", endpoint);
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let config = Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        Self::from_client(S3Client::from_conf(config), settings)
    }

    /// Wrap an already configured client
    pub fn from_client(client: S3Client, settings: &StorageSettings) -> StorageResult<Self> {
        let url_style = match (&settings.public_url_prefix, &settings.endpoint) {
            (Some(prefix), _) => UrlStyle::PathStyle(parse_base_url(prefix)?),
            (None, Some(endpoint)) => UrlStyle::PathStyle(parse_base_url(endpoint)?),
            (None, None) => UrlStyle::VirtualHosted { region: settings.region.clone() },
        };

        Ok(Self {
            client,
            region: settings.region.clone(),
            custom_endpoint: settings.endpoint.is_some(),
            url_style,
        })
    }

    /// AWS only accepts a location constraint outside us-east-1, and
    /// S3-compatible stores generally ignore or reject it.
    fn location_constraint(&self) -> Option<CreateBucketConfiguration> {
        if self.custom_endpoint || self.region == US_EAST_1 {
            return None;
        }
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build(),
        )
    }
}

/// Bucket policy granting anonymous `GetObject` on every object, but not `ListBucket`
fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadGetObject",
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{}/*", bucket)],
        }]
    })
    .to_string()
}

fn describe<E: std::error::Error + 'static>(err: &SdkError<E>) -> String {
    format!("{}", DisplayErrorContext(err))
}

/// Helper to check if an SDK error is a "not found" error
fn is_not_found_error<E: ProvideErrorMetadata>(err: &SdkError<E>) -> bool {
    let status_404 = err
        .raw_response()
        .map(|response| response.status().as_u16() == 404)
        .unwrap_or(false);
    status_404 || matches!(err.code(), Some("NoSuchBucket") | Some("NoSuchKey") | Some("NotFound"))
}

#[async_trait]
impl BlobBackend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self))]
    async fn create_container_if_not_exists(&self, container: &str) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => return Ok(false),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => {}
            Err(e) => return Err(StorageError::ContainerCreateFailed(describe(&e))),
        }

        debug!("Creating bucket: {}", container);

        let mut request = self.client.create_bucket().bucket(container);
        if let Some(configuration) = self.location_constraint() {
            request = request.create_bucket_configuration(configuration);
        }

        match request.send().await {
            Ok(_) => Ok(true),
            // Lost a race against a concurrent upload to the same category
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::ContainerCreateFailed(describe(&e))),
        }
    }

    #[instrument(skip(self))]
    async fn set_public_read_access(&self, container: &str) -> StorageResult<()> {
        // New AWS buckets block public policies by default
        if let Err(e) = self
            .client
            .delete_public_access_block()
            .bucket(container)
            .send()
            .await
        {
            if e.code() == Some("NotImplemented") {
                warn!(bucket = %container, "Store does not support public access blocks, skipping");
            } else {
                return Err(StorageError::PermissionFailed(describe(&e)));
            }
        }

        self.client
            .put_bucket_policy()
            .bucket(container)
            .policy(public_read_policy(container))
            .send()
            .await
            .map_err(|e| StorageError::PermissionFailed(describe(&e)))?;

        debug!("Bucket {} is now publicly readable", container);
        Ok(())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_blob(
        &self,
        container: &str,
        blob_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        debug!("Uploading {} bytes to {}/{}", data.len(), container, blob_name);

        self.client
            .put_object()
            .bucket(container)
            .key(blob_name)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(describe(&e)))?;

        Ok(self.blob_url(container, blob_name))
    }

    #[instrument(skip(self))]
    async fn delete_blob_if_exists(&self, container: &str, blob_name: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(container)
            .key(blob_name)
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => return Ok(false),
            Err(e) if is_not_found_error(&e) => return Ok(false),
            Err(e) => return Err(StorageError::DeleteFailed(describe(&e))),
        }

        self.client
            .delete_object()
            .bucket(container)
            .key(blob_name)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(describe(&e)))?;

        debug!("Deleted {}/{}", container, blob_name);
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn delete_container_if_empty(&self, container: &str) -> StorageResult<bool> {
        // S3 itself refuses to drop a bucket that still holds objects
        match self.client.delete_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.code() == Some("BucketNotEmpty") => {
                debug!("Bucket {} still holds objects, keeping it", container);
                Ok(false)
            }
            Err(e) if is_not_found_error(&e) => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(describe(&e))),
        }
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> String {
        match self.url_style {
            UrlStyle::PathStyle(ref base) => join_segments(base, &[container, blob_name]),
            UrlStyle::VirtualHosted { ref region } => {
                let host = format!("https://{}.s3.{}.amazonaws.com/", container, region);
                match Url::parse(&host) {
                    Ok(base) => join_segments(&base, &[blob_name]),
                    Err(_) => format!("{}{}", host, blob_name),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_smithy_http_client::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::body::SdkBody;

    const ENDPOINT: &str = "http://localhost:9000";

    fn settings() -> StorageSettings {
        StorageSettings {
            access_key_id: Some("test-key".to_string()),
            secret_access_key: Some("test-secret".to_string()),
            ..StorageSettings::default()
        }
    }

    #[actix_rt::test]
    async fn test_virtual_hosted_url() {
        let backend = S3Backend::new(&StorageSettings {
            region: "eu-west-1".to_string(),
            ..settings()
        })
        .await
        .unwrap();

        assert_eq!(
            backend.blob_url("hats", "productphoto1.png"),
            "https://hats.s3.eu-west-1.amazonaws.com/productphoto1.png"
        );
        assert!(backend.location_constraint().is_some());
    }

    #[actix_rt::test]
    async fn test_endpoint_url_is_path_style() {
        let backend = S3Backend::new(&StorageSettings {
            endpoint: Some("http://localhost:9000".to_string()),
            force_path_style: true,
            ..settings()
        })
        .await
        .unwrap();

        assert_eq!(
            backend.blob_url("hats", "productphoto1.png"),
            "http://localhost:9000/hats/productphoto1.png"
        );
        assert!(backend.location_constraint().is_none());
    }

    #[actix_rt::test]
    async fn test_public_prefix_wins_over_endpoint() {
        let backend = S3Backend::new(&StorageSettings {
            endpoint: Some("http://localhost:9000".to_string()),
            public_url_prefix: Some("https://cdn.example.com/photos/".to_string()),
            ..settings()
        })
        .await
        .unwrap();

        assert_eq!(
            backend.blob_url("hats", "a.png"),
            "https://cdn.example.com/photos/hats/a.png"
        );
    }

    #[actix_rt::test]
    async fn test_half_configured_credentials_rejected() {
        let result = S3Backend::new(&StorageSettings {
            access_key_id: Some("only-the-key".to_string()),
            secret_access_key: None,
            ..StorageSettings::default()
        })
        .await;

        assert!(matches!(result, Err(StorageError::NotConfigured(_))));
    }

    #[test]
    fn test_public_read_policy() {
        let policy: serde_json::Value = serde_json::from_str(&public_read_policy("hats")).unwrap();
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(statement["Principal"], "*");
        assert_eq!(statement["Action"][0], "s3:GetObject");
        assert_eq!(statement["Resource"][0], "arn:aws:s3:::hats/*");
    }

    fn event(path: &str, status: u16, body: impl Into<SdkBody>) -> ReplayEvent {
        ReplayEvent::new(
            http::Request::builder()
                .uri(format!("{}{}", ENDPOINT, path))
                .body(SdkBody::empty())
                .unwrap(),
            http::Response::builder().status(status).body(body.into()).unwrap(),
        )
    }

    fn s3_error(code: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
            code, code
        )
    }

    /// Backend whose client answers from canned responses, in order
    fn replay_backend(events: Vec<ReplayEvent>) -> (S3Backend, StaticReplayClient) {
        let replay = StaticReplayClient::new(events);
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(US_EAST_1))
            .credentials_provider(Credentials::new("test-key", "test-secret", None, None, "test"))
            .endpoint_url(ENDPOINT)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .http_client(replay.clone())
            .build();

        let backend = S3Backend::from_client(
            S3Client::from_conf(config),
            &StorageSettings {
                endpoint: Some(ENDPOINT.to_string()),
                force_path_style: true,
                ..settings()
            },
        )
        .unwrap();
        (backend, replay)
    }

    fn methods(replay: &StaticReplayClient) -> Vec<String> {
        replay.actual_requests().map(|r| r.method().to_string()).collect()
    }

    #[actix_rt::test]
    async fn test_missing_bucket_is_created() {
        let (backend, replay) = replay_backend(vec![
            event("/hats", 404, SdkBody::empty()),
            event("/hats", 200, SdkBody::empty()),
        ]);

        assert!(backend.create_container_if_not_exists("hats").await.unwrap());
        assert_eq!(methods(&replay), vec!["HEAD", "PUT"]);
    }

    #[actix_rt::test]
    async fn test_existing_bucket_is_not_recreated() {
        let (backend, replay) = replay_backend(vec![event("/hats", 200, SdkBody::empty())]);

        assert!(!backend.create_container_if_not_exists("hats").await.unwrap());
        assert_eq!(methods(&replay), vec!["HEAD"]);
    }

    #[actix_rt::test]
    async fn test_bucket_created_concurrently_counts_as_existing() {
        let (backend, replay) = replay_backend(vec![
            event("/hats", 404, SdkBody::empty()),
            event("/hats", 409, s3_error("BucketAlreadyOwnedByYou")),
        ]);

        assert!(!backend.create_container_if_not_exists("hats").await.unwrap());
        assert_eq!(methods(&replay).len(), 2);
    }

    #[actix_rt::test]
    async fn test_bucket_create_denied_is_an_error() {
        let (backend, _replay) = replay_backend(vec![
            event("/hats", 404, SdkBody::empty()),
            event("/hats", 403, s3_error("AccessDenied")),
        ]);

        let result = backend.create_container_if_not_exists("hats").await;
        assert!(matches!(result, Err(StorageError::ContainerCreateFailed(_))));
    }

    #[actix_rt::test]
    async fn test_public_access_block_not_implemented_is_tolerated() {
        let (backend, replay) = replay_backend(vec![
            event("/hats?publicAccessBlock", 501, s3_error("NotImplemented")),
            event("/hats?policy", 204, SdkBody::empty()),
        ]);

        backend.set_public_read_access("hats").await.unwrap();
        assert_eq!(methods(&replay), vec!["DELETE", "PUT"]);
        assert!(replay.actual_requests().last().unwrap().uri().contains("policy"));
    }

    #[actix_rt::test]
    async fn test_public_access_block_denied_stops_before_policy() {
        let (backend, replay) = replay_backend(vec![event(
            "/hats?publicAccessBlock",
            403,
            s3_error("AccessDenied"),
        )]);

        let result = backend.set_public_read_access("hats").await;
        assert!(matches!(result, Err(StorageError::PermissionFailed(_))));
        assert_eq!(methods(&replay), vec!["DELETE"]);
    }

    #[actix_rt::test]
    async fn test_delete_missing_object_skips_delete() {
        let (backend, replay) = replay_backend(vec![event("/hats/gone.png", 404, SdkBody::empty())]);

        assert!(!backend.delete_blob_if_exists("hats", "gone.png").await.unwrap());
        assert_eq!(methods(&replay), vec!["HEAD"]);
    }

    #[actix_rt::test]
    async fn test_delete_existing_object() {
        let (backend, replay) = replay_backend(vec![
            event("/hats/a.png", 200, SdkBody::empty()),
            event("/hats/a.png", 204, SdkBody::empty()),
        ]);

        assert!(backend.delete_blob_if_exists("hats", "a.png").await.unwrap());
        assert_eq!(methods(&replay), vec!["HEAD", "DELETE"]);
    }

    #[actix_rt::test]
    async fn test_non_empty_bucket_is_kept() {
        let (backend, replay) = replay_backend(vec![event("/hats", 409, s3_error("BucketNotEmpty"))]);

        assert!(!backend.delete_container_if_empty("hats").await.unwrap());
        assert_eq!(methods(&replay), vec!["DELETE"]);
    }

    #[actix_rt::test]
    async fn test_empty_bucket_is_deleted() {
        let (backend, _replay) = replay_backend(vec![event("/hats", 204, SdkBody::empty())]);
        assert!(backend.delete_container_if_empty("hats").await.unwrap());

        let (backend, _replay) = replay_backend(vec![event("/hats", 404, s3_error("NoSuchBucket"))]);
        assert!(!backend.delete_container_if_empty("hats").await.unwrap());
    }
}
