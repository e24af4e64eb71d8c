//! Photo Store
//!
//! Stores product photos in category-named containers of an S3-compatible
//! blob store and hands back their public URLs. Photos are later deleted by
//! that URL.

use actix_web::{web, App, HttpServer, middleware};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

mod api;
mod config;
mod domain;
mod photos;
mod storage;

use crate::config::{BackendKind, Settings};
use crate::photos::PhotoService;
use crate::storage::{BlobBackend, InMemoryBackend, S3Backend};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub photos: PhotoService,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("photo_store=info".parse()?)
                .add_directive("actix_web=info".parse()?)
        )
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting Photo Store v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let backend: Arc<dyn BlobBackend> = match settings.storage.backend {
        BackendKind::S3 => Arc::new(
            S3Backend::new(&settings.storage)
                .await
                .context("Failed to initialize S3 backend")?,
        ),
        BackendKind::Memory => {
            tracing::warn!("Using in-memory blob storage, photos will not survive a restart");
            Arc::new(
                InMemoryBackend::new(settings.storage.public_url_prefix.as_deref())
                    .context("Failed to initialize in-memory backend")?,
            )
        }
    };
    info!(backend = backend.name(), "Blob backend ready");

    let photos = PhotoService::new(backend, &settings.photos);
    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);

    let app_state = web::Data::new(AppState {
        settings: settings.clone(),
        photos,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingLogger::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "photo-store"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
