//! Convoy Server Entry Point
//!
//! Loads configuration, initializes logging, and runs the control plane
//! until ctrl-c.

use convoy_api::telemetry::{init_tracing, LogFormat};
use convoy_api::{server, ApiResult, ServerConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env())?;

    let config = ServerConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Convoy server");

    server::run(config).await
}
