use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use qrdrop_blobstore::BlobStore;
use qrdrop_server::{configure, spawn_maintenance, AppState, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let store = BlobStore::open(&config.data_dir, config.store.clone())
        .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?;
    let store = Arc::new(store);

    if let Some(dir) = &config.legacy_dir {
        let imported = store
            .import_legacy_index(&dir.join("files.json"), dir)
            .with_context(|| format!("failed to import legacy files from {}", dir.display()))?;
        info!(imported, dir = %dir.display(), "legacy import finished");
    }

    if config.purge_interval_secs > 0 {
        spawn_maintenance(
            Arc::clone(&store),
            Duration::from_secs(config.purge_interval_secs),
        );
    }

    let state = web::Data::new(AppState {
        store,
        max_upload_bytes: config.max_upload_bytes,
    });

    info!(
        bind = %config.bind,
        port = config.port,
        data_dir = %config.data_dir.display(),
        encrypt_at_rest = config.store.encrypt_at_rest,
        "starting qrdrop server"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.bind, config.port))?
    .run()
    .await?;

    Ok(())
}
