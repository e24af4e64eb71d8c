//! Photo upload and deletion endpoints

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::AppState;
use crate::domain::{UploadedFile, DEFAULT_CONTENT_TYPE};
use crate::photos::PhotoError;

/// Multipart field carrying the photo
pub const PHOTO_FIELD: &str = "photo";

/// Multipart form accepted by the upload endpoint
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PhotoUploadForm {
    /// The image file
    #[schema(value_type = String, format = Binary)]
    pub photo: Vec<u8>,
}

/// Response for an upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadPhotoResponse {
    pub success: bool,
    /// Canonical URL of the stored photo, `null` when no file was sent
    pub url: Option<String>,
}

/// Request body for deleting a photo
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeletePhotoRequest {
    /// URL previously returned by the upload endpoint
    #[serde(default)]
    pub url: String,
}

/// Response for a deletion
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletePhotoResponse {
    pub success: bool,
    /// Whether a stored photo was actually removed
    pub deleted: bool,
}

/// Error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    fn new(code: &str, message: impl Into<String>) -> Self {
        ErrorResponse {
            success: false,
            error: ApiError {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

/// Problems reading the multipart body
#[derive(Debug, Error)]
enum UploadError {
    #[error("Malformed multipart body: {0}")]
    Malformed(String),

    #[error("Photo exceeds the {0} byte upload limit")]
    TooLarge(usize),
}

/// Pull the `photo` field out of a multipart body, skipping any other fields
async fn read_photo_field(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<Option<UploadedFile>, UploadError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| UploadError::Malformed(e.to_string()))?;

        if field.name() != Some(PHOTO_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| UploadError::Malformed(e.to_string()))?;
            }
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| UploadError::Malformed(e.to_string()))?;
            if data.len() + chunk.len() > max_bytes {
                return Err(UploadError::TooLarge(max_bytes));
            }
            data.extend_from_slice(&chunk);
        }

        return Ok(Some(UploadedFile::new(file_name, content_type, data.freeze())));
    }

    Ok(None)
}

fn photo_error_response(err: &PhotoError) -> HttpResponse {
    match err {
        PhotoError::InvalidCategory(_) => {
            HttpResponse::BadRequest().json(ErrorResponse::new("INVALID_CATEGORY", err.to_string()))
        }
        PhotoError::Storage(_) => {
            HttpResponse::BadGateway().json(ErrorResponse::new("STORAGE_ERROR", err.to_string()))
        }
    }
}

/// POST /api/v1/photos/{category} - Upload a photo
#[utoipa::path(
    post,
    path = "/api/v1/photos/{category}",
    tag = "photos",
    params(
        ("category" = String, Path, description = "Photo category, case-insensitive")
    ),
    request_body(content = PhotoUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Photo stored", body = UploadPhotoResponse),
        (status = 200, description = "No photo in the request, nothing stored", body = UploadPhotoResponse),
        (status = 400, description = "Invalid category or multipart body", body = ErrorResponse),
        (status = 413, description = "Photo too large", body = ErrorResponse),
        (status = 502, description = "Blob storage failed", body = ErrorResponse)
    )
)]
pub async fn upload_photo(
    state: web::Data<AppState>,
    path: web::Path<String>,
    mut payload: Multipart,
) -> HttpResponse {
    let category = path.into_inner();
    let max_bytes = state.settings.photos.max_upload_bytes;

    let file = match read_photo_field(&mut payload, max_bytes).await {
        Ok(file) => file,
        Err(e @ UploadError::TooLarge(_)) => {
            warn!(category = %category, error = %e, "Rejected oversized photo");
            return HttpResponse::PayloadTooLarge().json(ErrorResponse::new("PAYLOAD_TOO_LARGE", e.to_string()));
        }
        Err(e) => {
            warn!(category = %category, error = %e, "Rejected malformed upload");
            return HttpResponse::BadRequest().json(ErrorResponse::new("INVALID_UPLOAD", e.to_string()));
        }
    };

    match state.photos.upload_photo(&category, file).await {
        Ok(Some(url)) => HttpResponse::Created().json(UploadPhotoResponse {
            success: true,
            url: Some(url),
        }),
        Ok(None) => {
            info!(category = %category, "Upload request without a photo");
            HttpResponse::Ok().json(UploadPhotoResponse {
                success: true,
                url: None,
            })
        }
        Err(e) => photo_error_response(&e),
    }
}

/// DELETE /api/v1/photos/{category} - Delete a photo by URL
#[utoipa::path(
    delete,
    path = "/api/v1/photos/{category}",
    tag = "photos",
    params(
        ("category" = String, Path, description = "Photo category, case-insensitive")
    ),
    request_body = DeletePhotoRequest,
    responses(
        (status = 200, description = "Deletion processed", body = DeletePhotoResponse),
        (status = 400, description = "Invalid category", body = ErrorResponse),
        (status = 502, description = "Blob storage failed", body = ErrorResponse)
    )
)]
pub async fn delete_photo(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DeletePhotoRequest>,
) -> HttpResponse {
    let category = path.into_inner();

    match state.photos.delete_photo(&category, &body.url).await {
        Ok(deleted) => HttpResponse::Ok().json(DeletePhotoResponse {
            success: true,
            deleted,
        }),
        Err(e) => photo_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::photos::PhotoService;
    use crate::storage::{InMemoryBackend, StorageError};
    use actix_web::{http::{header, StatusCode}, test, App};
    use std::sync::Arc;

    const BOUNDARY: &str = "----photo-store-test-boundary";

    fn app_state(max_upload_bytes: usize) -> (Arc<InMemoryBackend>, web::Data<AppState>) {
        let mut settings = Settings::default();
        settings.photos.max_upload_bytes = max_upload_bytes;

        let backend = Arc::new(InMemoryBackend::new(Some("https://photos.example.com/")).unwrap());
        let photos = PhotoService::new(backend.clone(), &settings.photos);

        (backend, web::Data::new(AppState { settings, photos }))
    }

    fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(category: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(&format!("/api/v1/photos/{}", category))
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    #[actix_rt::test]
    async fn test_upload_then_delete() {
        let (backend, state) = app_state(1024);
        let app = test::init_service(
            App::new().app_data(state).configure(crate::api::configure_routes),
        )
        .await;

        let body = multipart_body(PHOTO_FIELD, "beanie.jpg", "image/jpeg", b"jpeg-bytes");
        let resp = test::call_service(&app, upload_request("Hats", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let uploaded: UploadPhotoResponse = test::read_body_json(resp).await;
        let url = uploaded.url.unwrap();
        assert!(url.starts_with("https://photos.example.com/hats/productphoto"));
        assert!(url.ends_with(".jpg"));
        assert_eq!(backend.blob_count("hats"), 1);

        let req = test::TestRequest::delete()
            .uri("/api/v1/photos/hats")
            .set_json(serde_json::json!({ "url": url }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let deleted: DeletePhotoResponse = test::read_body_json(resp).await;
        assert!(deleted.deleted);
        assert_eq!(backend.blob_count("hats"), 0);
    }

    #[actix_rt::test]
    async fn test_upload_without_photo_field() {
        let (backend, state) = app_state(1024);
        let app = test::init_service(
            App::new().app_data(state).configure(crate::api::configure_routes),
        )
        .await;

        let body = multipart_body("avatar", "beanie.jpg", "image/jpeg", b"jpeg-bytes");
        let resp = test::call_service(&app, upload_request("hats", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let uploaded: UploadPhotoResponse = test::read_body_json(resp).await;
        assert!(uploaded.url.is_none());
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_rt::test]
    async fn test_upload_too_large() {
        let (backend, state) = app_state(4);
        let app = test::init_service(
            App::new().app_data(state).configure(crate::api::configure_routes),
        )
        .await;

        let body = multipart_body(PHOTO_FIELD, "big.png", "image/png", b"way more than four bytes");
        let resp = test::call_service(&app, upload_request("hats", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_rt::test]
    async fn test_storage_failure_maps_to_bad_gateway() {
        let (backend, state) = app_state(1024);
        backend.set_failing(true);
        let app = test::init_service(
            App::new().app_data(state).configure(crate::api::configure_routes),
        )
        .await;

        let body = multipart_body(PHOTO_FIELD, "a.png", "image/png", b"png");
        let resp = test::call_service(&app, upload_request("hats", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "STORAGE_ERROR");
    }

    #[actix_rt::test]
    async fn test_delete_empty_url_and_missing_blob() {
        let (backend, state) = app_state(1024);
        let app = test::init_service(
            App::new().app_data(state).configure(crate::api::configure_routes),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri("/api/v1/photos/hats")
            .set_json(serde_json::json!({ "url": "" }))
            .to_request();
        let deleted: DeletePhotoResponse = test::call_and_read_body_json(&app, req).await;
        assert!(deleted.deleted);
        assert_eq!(backend.call_count(), 0);

        let req = test::TestRequest::delete()
            .uri("/api/v1/photos/hats")
            .set_json(serde_json::json!({ "url": "https://photos.example.com/hats/missing.png" }))
            .to_request();
        let deleted: DeletePhotoResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!deleted.deleted);
    }

    #[actix_rt::test]
    async fn test_error_status_mapping() {
        let resp = photo_error_response(&PhotoError::InvalidCategory("  ".to_string()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = photo_error_response(&PhotoError::Storage(StorageError::UploadFailed(
            "backend unavailable".to_string(),
        )));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
