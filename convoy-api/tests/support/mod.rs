//! Shared helpers for the convoy-api integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use convoy_api::{create_router, AppState, ControlPlane, Identity, JobMetrics, ServerConfig};
use convoy_core::wire;
use convoy_test_utils::fixtures::memory_store;
use convoy_test_utils::MemoryStore;
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// N = 3, M = 2, one-second heartbeats.
pub fn scenario_config() -> ServerConfig {
    ServerConfig {
        online_after_success: 3,
        offline_after_fail: 2,
        agent_update_interval_seconds: 1,
        ..ServerConfig::default()
    }
}

/// A control plane over a fresh in-memory store.
pub async fn plane_with(config: &ServerConfig) -> (MemoryStore, ControlPlane) {
    let (memory, store) = memory_store();
    let plane = ControlPlane::bootstrap(store, config)
        .await
        .expect("bootstrap over memory store");
    (memory, plane)
}

/// A router over a fresh in-memory store, plus the plane behind it.
pub async fn app_with(config: &ServerConfig) -> (Router, Arc<ControlPlane>) {
    let (_, store) = memory_store();
    let plane = Arc::new(
        ControlPlane::bootstrap(store.clone(), config)
            .await
            .expect("bootstrap over memory store"),
    );
    let state = AppState::new(
        Arc::clone(&plane),
        store,
        JobMetrics::default(),
        config.identity,
        Duration::from_secs(config.request_timeout_secs),
    );
    (create_router(state), plane)
}

pub async fn primary_app() -> (Router, Arc<ControlPlane>) {
    app_with(&scenario_config()).await
}

pub async fn secondary_app() -> (Router, Arc<ControlPlane>) {
    app_with(&ServerConfig {
        identity: Identity::Secondary,
        ..scenario_config()
    })
    .await
}

/// POST a protobuf message and decode the reply as `R`.
pub async fn call<R: Message + Default>(app: &Router, path: &str, msg: &impl Message) -> (StatusCode, R) {
    let (status, bytes) = post_raw(app, path, msg.encode_to_vec()).await;
    let reply = R::decode(bytes.as_slice()).expect("protobuf reply");
    (status, reply)
}

pub async fn post_raw(app: &Router, path: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-protobuf")
        .body(Body::from(body))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    (status, bytes.to_vec())
}

pub async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(path).body(Body::empty()).expect("request");
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

// ============================================================================
// MESSAGE BUILDERS
// ============================================================================

pub fn detail(name: &str, body: &str) -> Option<wire::ConfigDetail> {
    Some(wire::ConfigDetail {
        name: name.to_string(),
        detail: body.as_bytes().to_vec(),
        ..Default::default()
    })
}

pub fn group(name: &str, tags: &[(&str, &str)], operator: wire::TagOperator) -> Option<wire::AgentGroup> {
    Some(wire::AgentGroup {
        name: name.to_string(),
        tags: wire_tags(tags),
        tag_operator: operator as i32,
        ..Default::default()
    })
}

pub fn wire_tags(pairs: &[(&str, &str)]) -> Vec<wire::AgentGroupTag> {
    pairs
        .iter()
        .map(|(name, value)| wire::AgentGroupTag {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

/// A heartbeat reporting `pipeline` as the applied pipeline configs.
pub fn beat(id: &str, seq: u64, tags: &[(&str, &str)], pipeline: &[(&str, i64)]) -> wire::HeartbeatRequest {
    wire::HeartbeatRequest {
        request_id: format!("{id}-{seq}").into_bytes(),
        sequence_num: seq,
        instance_id: id.as_bytes().to_vec(),
        agent_type: "logtail".to_string(),
        tags: wire_tags(tags),
        startup_time: 100,
        interval: 1,
        pipeline_configs: pipeline
            .iter()
            .map(|(name, version)| wire::ConfigInfo {
                name: name.to_string(),
                version: *version,
                status: wire::ConfigStatus::Applied as i32,
                message: String::new(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Check status of `name` in a list of results.
pub fn check_of(results: &[wire::ConfigCheckResult], name: &str) -> wire::CheckStatus {
    let result = results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no check result for {name}"));
    wire::CheckStatus::try_from(result.check_status).expect("known check status")
}
