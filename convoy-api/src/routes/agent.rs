//! Agent API
//!
//! Heartbeats and config body fetches. Served by every instance.

use crate::error::ApiResult;
use crate::proto::{reply, Proto};
use crate::state::AppState;
use axum::{extract::State, routing::post, Router};
use convoy_core::{wire, ConfigKind};

pub async fn heartbeat(
    State(state): State<AppState>,
    Proto(req): Proto<wire::HeartbeatRequest>,
) -> ApiResult<Proto<wire::HeartbeatResponse>> {
    let request_id = req.request_id.clone();
    reply(request_id, state.plane.heartbeat(req).await)
}

async fn fetch_config(
    state: AppState,
    kind: ConfigKind,
    req: wire::FetchConfigRequest,
) -> ApiResult<Proto<wire::FetchConfigResponse>> {
    let request_id = req.request_id.clone();
    reply(request_id, state.plane.fetch_configs(kind, req).await)
}

pub async fn fetch_pipeline_config(
    State(state): State<AppState>,
    Proto(req): Proto<wire::FetchConfigRequest>,
) -> ApiResult<Proto<wire::FetchConfigResponse>> {
    fetch_config(state, ConfigKind::Pipeline, req).await
}

pub async fn fetch_instance_config(
    State(state): State<AppState>,
    Proto(req): Proto<wire::FetchConfigRequest>,
) -> ApiResult<Proto<wire::FetchConfigResponse>> {
    fetch_config(state, ConfigKind::Instance, req).await
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/HeartBeat", post(heartbeat))
        .route("/FetchPipelineConfig", post(fetch_pipeline_config))
        .route("/FetchInstanceConfig", post(fetch_instance_config))
}
