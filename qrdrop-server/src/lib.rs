//! HTTP sharing server for QRDrop.
//!
//! Thin actix-web layer over a [`BlobStore`]: uploads get a fresh id and
//! access key, downloads and deletes require that key.

pub mod config;
pub mod error;
pub mod handlers;

use actix_web::web;
use qrdrop_blobstore::BlobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;

/// Shared handler state.
pub struct AppState {
    pub store: Arc<BlobStore>,
    pub max_upload_bytes: usize,
}

/// Registers every route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/upload", web::post().to(handlers::upload))
        .route("/download/{id}", web::get().to(handlers::download))
        .route("/file/{id}", web::get().to(handlers::file_info))
        .route("/file/{id}", web::delete().to(handlers::delete_file))
        .route("/health", web::get().to(handlers::health));
}

/// Periodically purges expired records and reclaims orphaned payloads.
pub fn spawn_maintenance(store: Arc<BlobStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let store = Arc::clone(&store);
            let swept = tokio::task::spawn_blocking(move || {
                let purged = store.purge_expired()?;
                let orphans = store.collect_orphans()?;
                Ok::<_, qrdrop_blobstore::StoreError>((purged, orphans))
            })
            .await;
            match swept {
                Ok(Ok((0, 0))) => {}
                Ok(Ok((purged, orphans))) => info!(purged, orphans, "maintenance pass"),
                Ok(Err(e)) => warn!(error = %e, "maintenance pass failed"),
                Err(e) => warn!(error = %e, "maintenance task panicked"),
            }
        }
    })
}
