//! Constants for the Convoy server
//!
//! Defaults for every `ServerConfig` knob live here so they can be found and
//! tested in one place.

// ============================================================================
// NETWORK
// ============================================================================

/// Default address the server binds to.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8899";

/// Default deadline for a single request in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Content type of every agent and operator message.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

// ============================================================================
// AGENT LIFECYCLE
// ============================================================================

/// Default reaper period in seconds (U).
pub const DEFAULT_AGENT_UPDATE_INTERVAL_SECS: u64 = 1;

/// Heartbeat interval suggested to agents. Zero leaves it to the agent.
pub const DEFAULT_HEARTBEAT_INTERVAL_HINT_SECS: i32 = 0;

// ============================================================================
// CONFIG CACHE
// ============================================================================

/// Default period of the config flusher in milliseconds.
pub const DEFAULT_CONFIG_FLUSH_INTERVAL_MS: u64 = 3_000;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Path of the optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "CONVOY_CONFIG_FILE";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "CONVOY_";

/// `json` switches log output to the JSON formatter.
pub const LOG_FORMAT_ENV: &str = "CONVOY_LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "convoy_api=info,tower_http=info,info";
