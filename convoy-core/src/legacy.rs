//! Records kept for agents that still speak the machine-group protocol.
//!
//! The control plane stores them unchanged; no operation in the agent or
//! operator APIs reads or interprets them.

use crate::{InstanceId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: String,
    pub ip: String,
    pub hostname: String,
    pub heartbeat: Timestamp,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub configs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub content: String,
    pub version: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAlarm {
    pub instance_id: InstanceId,
    pub alarm_type: String,
    pub message: String,
    pub time: Timestamp,
}

impl AgentAlarm {
    /// Alarms are keyed by agent and time so repeats do not overwrite.
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.instance_id.to_hex(),
            crate::timestamp_to_nanos(&self.time)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
    pub reported_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_alarm_key_orders_by_agent_then_time() {
        let alarm = AgentAlarm {
            instance_id: InstanceId::new(vec![1]),
            alarm_type: "parse".into(),
            message: "bad line".into(),
            time: Utc.timestamp_opt(10, 0).unwrap(),
        };
        assert_eq!(alarm.key(), "01/10000000000");
    }
}
