//! OpenAPI 3.0 specification definition

use utoipa::OpenApi;

use crate::api::handlers::{
    health::HealthResponse,
    photos::{
        PhotoUploadForm, UploadPhotoResponse, DeletePhotoRequest,
        DeletePhotoResponse, ErrorResponse, ApiError,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Photo Store API",
        version = "1.0.0",
        description = "Upload and delete category photos in S3-compatible blob storage",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "photos", description = "Photo upload and deletion endpoints")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::photos::upload_photo,
        crate::api::handlers::photos::delete_photo,
    ),
    components(
        schemas(
            HealthResponse,
            PhotoUploadForm,
            UploadPhotoResponse,
            DeletePhotoRequest,
            DeletePhotoResponse,
            ErrorResponse,
            ApiError,
        )
    )
)]
pub struct ApiDoc;
