//! Server lifecycle.
//!
//! Startup: open storage, load registries, bind, spawn background jobs.
//! Shutdown on ctrl-c: stop accepting requests, let the batch writer drain
//! once and the config flusher flush once, then close storage.

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{BackgroundJobs, JobMetrics};
use crate::routes::create_router;
use crate::services::ControlPlane;
use crate::state::AppState;
use convoy_storage::{open_store, StoreHandle};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Run the server until ctrl-c.
pub async fn run(config: ServerConfig) -> ApiResult<()> {
    let raw = open_store(config.storage_driver, &config.storage_dsn, &config.store_options())
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to open storage: {}", e)))?;
    let store = StoreHandle::new(raw);
    let plane = Arc::new(ControlPlane::bootstrap(store.clone(), &config).await?);

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", config.listen_address, e)))?;

    let metrics = JobMetrics::default();
    let jobs = BackgroundJobs::spawn(&plane, &config, &metrics);
    let state = AppState::new(
        Arc::clone(&plane),
        store.clone(),
        metrics,
        config.identity,
        config.request_timeout(),
    );
    let app = create_router(state);

    tracing::info!(
        address = %config.listen_address,
        identity = %config.identity,
        driver = %config.storage_driver,
        "Convoy server listening"
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)));

    tracing::info!("HTTP server stopped, draining background jobs");
    jobs.shutdown().await;
    if let Err(e) = store.close().await {
        tracing::error!(error = %e, "Failed to close storage");
    }
    tracing::info!("Convoy server shut down");
    served
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
