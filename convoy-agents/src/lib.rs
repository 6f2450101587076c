//! Convoy Agents
//!
//! The agent side of the control plane: an in-memory index of agents fed by
//! heartbeats, the INIT/ONLINE/OFFLINE state machine, a batched writer that
//! persists agent records off the request path, and a reaper that counts
//! missed intervals and evicts agents that went silent.

mod reaper;
mod registry;
mod settings;
mod writer;

pub use reaper::{agent_reaper_task, ReapStats, ReaperMetrics, ReaperSnapshot};
pub use registry::{AgentRegistry, AgentView, HeartbeatInput, ReportedStatuses};
pub use settings::{
    AgentSettings, DEFAULT_CLEAR_HOURS_AFTER_OFFLINE, DEFAULT_FLUSH_INTERVAL_MS,
    DEFAULT_MAX_PENDING_UPDATES, DEFAULT_OFFLINE_AFTER_FAIL, DEFAULT_ONLINE_AFTER_SUCCESS,
    DEFAULT_REAP_INTERVAL_SECS,
};
pub use writer::{agent_batch_writer_task, WriteStats, WriterMetrics, WriterSnapshot};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{AgentSettings, HeartbeatInput};
    use convoy_core::{AgentConfigStatus, ConfigApplyStatus, ConfigKind, InstanceId};
    use convoy_test_utils::fixtures::tags;

    /// N = 3, M = 2, otherwise defaults.
    pub fn settings() -> AgentSettings {
        AgentSettings {
            online_after_success: 3,
            offline_after_fail: 2,
            ..AgentSettings::default()
        }
    }

    /// A heartbeat promising a one-second interval.
    pub fn beat(id: &str, seq: u64) -> HeartbeatInput {
        HeartbeatInput {
            sequence_num: seq,
            interval: 1,
            startup_time: 100,
            tags: tags(&[("env", "prod")]),
            ..HeartbeatInput::new(InstanceId::from(id))
        }
    }

    pub fn status(id: &str, kind: ConfigKind, name: &str, version: i64) -> AgentConfigStatus {
        AgentConfigStatus {
            instance_id: InstanceId::from(id),
            config_name: name.to_string(),
            kind,
            version,
            status: ConfigApplyStatus::Applied,
            message: String::new(),
        }
    }
}
