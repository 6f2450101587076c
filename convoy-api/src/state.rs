//! Shared application state for Axum routers.

use crate::config::Identity;
use crate::jobs::JobMetrics;
use crate::services::ControlPlane;
use convoy_storage::StoreHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub plane: Arc<ControlPlane>,
    /// Raw store, for the readiness probe.
    pub store: StoreHandle,
    pub metrics: JobMetrics,
    pub identity: Identity,
    pub request_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        plane: Arc<ControlPlane>,
        store: StoreHandle,
        metrics: JobMetrics,
        identity: Identity,
        request_timeout: Duration,
    ) -> Self {
        Self {
            plane,
            store,
            metrics,
            identity,
            request_timeout,
            start_time: Instant::now(),
        }
    }
}
