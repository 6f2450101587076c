//! Tunables for the agent lifecycle.

use std::time::Duration;

pub const DEFAULT_ONLINE_AFTER_SUCCESS: u32 = 3;
pub const DEFAULT_OFFLINE_AFTER_FAIL: u32 = 3;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_CLEAR_HOURS_AFTER_OFFLINE: u64 = 24;
pub const DEFAULT_MAX_PENDING_UPDATES: usize = 100_000;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;

/// Thresholds and periods driving the heartbeat state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    /// Consecutive good beats before an agent is ONLINE (N).
    pub online_after_success: u32,

    /// Missed intervals before an agent is OFFLINE (M).
    pub offline_after_fail: u32,

    /// Reaper period (U).
    pub reap_interval: Duration,

    /// Silence after which an agent and its status rows are deleted (H).
    pub evict_after: Duration,

    /// Bound on distinct agents waiting for the batch writer (B).
    pub max_pending: usize,

    /// Batch writer period.
    pub flush_interval: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            online_after_success: DEFAULT_ONLINE_AFTER_SUCCESS,
            offline_after_fail: DEFAULT_OFFLINE_AFTER_FAIL,
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            evict_after: Duration::from_secs(DEFAULT_CLEAR_HOURS_AFTER_OFFLINE * 3600),
            max_pending: DEFAULT_MAX_PENDING_UPDATES,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
        }
    }
}

impl AgentSettings {
    /// Eviction threshold as a chrono duration, saturating on overflow.
    pub(crate) fn evict_after_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.evict_after).unwrap_or(chrono::Duration::MAX)
    }
}
