//! Health Check Endpoints
//!
//! JSON probes for orchestrators:
//! - `/health/live`: the process is up and serving
//! - `/health/ready`: storage answers, plus background job counters

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use convoy_agents::{ReaperSnapshot, WriterSnapshot};
use convoy_configs::FlusherSnapshot;
use convoy_storage::StoreHandle;
use serde::{Deserialize, Serialize};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub storage: ComponentHealth,
    pub jobs: JobCounters,
    pub identity: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCounters {
    pub writer_batches: u64,
    pub agents_written: u64,
    pub writer_failures: u64,
    pub reaper_cycles: u64,
    pub agents_marked_offline: u64,
    pub agents_evicted: u64,
    pub reaper_failures: u64,
    pub flush_rounds: u64,
    pub flush_failures: u64,
    pub pending_agent_updates: usize,
}

impl JobCounters {
    fn from_snapshots(writer: WriterSnapshot, reaper: ReaperSnapshot, flusher: FlusherSnapshot, pending: usize) -> Self {
        Self {
            writer_batches: writer.batches,
            agents_written: writer.agents_written,
            writer_failures: writer.failures,
            reaper_cycles: reaper.cycles,
            agents_marked_offline: reaper.marked_offline,
            agents_evicted: reaper.evicted,
            reaper_failures: reaper.failures,
            flush_rounds: flusher.rounds,
            flush_failures: flusher.failures,
            pending_agent_updates: pending,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: HealthStatus::Healthy,
            message: Some("alive".to_string()),
            details: None,
        }),
    )
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let storage = check_storage(&state.store).await;
    let pending = state.plane.agents().pending_len().unwrap_or_default();
    let jobs = JobCounters::from_snapshots(
        state.metrics.writer.snapshot(),
        state.metrics.reaper.snapshot(),
        state.metrics.flusher.snapshot(),
        pending,
    );
    let status = storage.status;

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            storage,
            jobs,
            identity: state.identity.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response))
}

async fn check_storage(store: &StoreHandle) -> ComponentHealth {
    let start = std::time::Instant::now();
    let driver = store.raw().driver().to_string();
    match store.ping().await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            driver,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Storage readiness check failed");
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                driver,
                latency_ms: None,
                error: Some(e.to_string()),
            }
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
