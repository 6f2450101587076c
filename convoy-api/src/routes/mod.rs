//! HTTP routes
//!
//! - `/Agent/*`: agent API, always served
//! - `/User/*`: operator API, primary instances only
//! - `/health/*`: JSON probes

pub mod agent;
pub mod health;
pub mod user;

use crate::config::Identity;
use crate::error::ApiError;
use crate::state::AppState;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::any::Any;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the full router over `state`.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .nest("/Agent", agent::create_router())
        .nest("/health", health::create_router());
    if state.identity == Identity::Primary {
        router = router.nest("/User", user::create_router());
    } else {
        tracing::info!("Secondary identity: operator API disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TimeoutLayer::new(state.request_timeout)),
        )
        .with_state(state)
}

/// A panic in a handler is a bug. Log it and answer with an internal error.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");
    ApiError::internal_error("Internal server error").into_response()
}
