//! Convoy API - Control Plane Server
//!
//! The transport layer of the Convoy control plane. Agents heartbeat and
//! fetch configs over protobuf-over-HTTP; operators manage groups, configs
//! and their assignments through the same encoding. The crate also owns
//! server configuration, logging setup, background job wiring and graceful
//! shutdown.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod proto;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{Identity, ServerConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{BackgroundJobs, JobMetrics};
pub use proto::Proto;
pub use routes::create_router;
pub use services::ControlPlane;
pub use state::AppState;
