//! Canonical entity model
//!
//! These are the shapes persisted in storage and indexed in memory. Wire
//! messages are converted to and from them in `codec`.

use crate::{
    ConfigApplyStatus, ConfigKind, InstanceId, RunningStatus, TagOperator, Timestamp,
    DEFAULT_GROUP_NAME,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// CONFIG
// ============================================================================

/// A named, versioned configuration body of one kind.
///
/// `version` starts at 1 and increases on every update, delete or revival.
/// A tombstoned config is hidden from operators but still reported to
/// agents as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub kind: ConfigKind,
    #[serde(with = "crate::base64_bytes")]
    pub content: Vec<u8>,
    pub version: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tombstone: bool,
}

impl Config {
    pub fn new(
        name: impl Into<String>,
        kind: ConfigKind,
        content: impl Into<Vec<u8>>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            content: content.into(),
            version: 1,
            description: description.into(),
            tombstone: false,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.tombstone
    }

    /// Replace the body, bumping the version. Clears any tombstone.
    pub fn revise(&mut self, content: Vec<u8>, description: String) {
        self.content = content;
        self.description = description;
        self.tombstone = false;
        self.version += 1;
    }

    /// Tombstone the config, bumping the version.
    pub fn mark_deleted(&mut self) {
        self.tombstone = true;
        self.version += 1;
    }
}

// ============================================================================
// AGENT GROUP
// ============================================================================

/// One `name = value` tag used by selectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupTag {
    pub name: String,
    pub value: String,
}

impl GroupTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Predicate over an agent's tags deciding group membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupSelector {
    /// Single `key=value` tag carried over from machine groups.
    Legacy { tag: GroupTag },
    Tags {
        tags: Vec<GroupTag>,
        operator: TagOperator,
    },
}

impl GroupSelector {
    /// Selector with no tags. Matches nothing unless it belongs to the
    /// default group.
    pub fn empty() -> Self {
        GroupSelector::Tags {
            tags: Vec::new(),
            operator: TagOperator::And,
        }
    }

    /// Parse a legacy tag string. A string without `=` names a key whose
    /// value must be empty.
    pub fn legacy(raw: &str) -> Self {
        let tag = match raw.split_once('=') {
            Some((name, value)) => GroupTag::new(name, value),
            None => GroupTag::new(raw, ""),
        };
        GroupSelector::Legacy { tag }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GroupSelector::Legacy { tag } => tag.name.is_empty(),
            GroupSelector::Tags { tags, .. } => tags.is_empty(),
        }
    }
}

impl Default for GroupSelector {
    fn default() -> Self {
        Self::empty()
    }
}

/// Named set of agents defined by a selector, plus the configs applied to
/// it. The applied maps record when each config was attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selector: GroupSelector,
    #[serde(default)]
    pub applied_pipeline_configs: BTreeMap<String, Timestamp>,
    #[serde(default)]
    pub applied_instance_configs: BTreeMap<String, Timestamp>,
    pub version: i64,
}

impl AgentGroup {
    pub fn new(name: impl Into<String>, description: impl Into<String>, selector: GroupSelector) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            selector,
            applied_pipeline_configs: BTreeMap::new(),
            applied_instance_configs: BTreeMap::new(),
            version: 1,
        }
    }

    /// The implicit group every agent belongs to.
    pub fn default_group() -> Self {
        Self::new(DEFAULT_GROUP_NAME, "all agents", GroupSelector::empty())
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_GROUP_NAME
    }

    pub fn applied(&self, kind: ConfigKind) -> &BTreeMap<String, Timestamp> {
        match kind {
            ConfigKind::Pipeline => &self.applied_pipeline_configs,
            ConfigKind::Instance => &self.applied_instance_configs,
        }
    }

    pub fn applied_mut(&mut self, kind: ConfigKind) -> &mut BTreeMap<String, Timestamp> {
        match kind {
            ConfigKind::Pipeline => &mut self.applied_pipeline_configs,
            ConfigKind::Instance => &mut self.applied_instance_configs,
        }
    }
}

// ============================================================================
// AGENT
// ============================================================================

/// Server-side record of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub running_status: RunningStatus,
    /// Unix seconds the agent process started.
    pub startup_time: i64,
    /// Seconds between heartbeats the agent promised.
    pub interval: i32,
    pub latest_heartbeat: Timestamp,
    /// Start of the current liveness window, advanced by the reaper.
    pub beat_cycle_time: Timestamp,
    pub success_beat_count: u32,
    pub fail_beat_count: u32,
    pub sequence_num: u64,
}

impl Agent {
    /// A never-seen agent at `now`, before its first beat is counted.
    pub fn new(instance_id: InstanceId, now: Timestamp) -> Self {
        Self {
            instance_id,
            agent_type: String::new(),
            ip: String::new(),
            hostname: String::new(),
            version: String::new(),
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
            running_status: RunningStatus::Init,
            startup_time: 0,
            interval: 0,
            latest_heartbeat: now,
            beat_cycle_time: now,
            success_beat_count: 0,
            fail_beat_count: 0,
            sequence_num: 0,
        }
    }

    /// Decode a stored agent, mapping an unrecognized running status to
    /// INIT. The flag reports whether the stored record needs a repair write.
    pub fn from_stored(mut value: serde_json::Value) -> Result<(Agent, bool), serde_json::Error> {
        let mut repaired = false;
        if let Some(status) = value.get_mut("running_status") {
            let known = status
                .as_str()
                .map(|s| s.parse::<RunningStatus>().is_ok())
                .unwrap_or(false);
            if !known {
                *status = serde_json::Value::String(RunningStatus::Init.as_str().to_string());
                repaired = true;
            }
        }
        let agent = serde_json::from_value(value)?;
        Ok((agent, repaired))
    }
}

/// Last status an agent reported for one config.
///
/// Keyed by the composite `(instance_id, config_name)` within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfigStatus {
    pub instance_id: InstanceId,
    pub config_name: String,
    pub kind: ConfigKind,
    pub version: i64,
    pub status: ConfigApplyStatus,
    #[serde(default)]
    pub message: String,
}

impl AgentConfigStatus {
    /// Composite storage key: `<instance hex>/<config name>`.
    pub fn key(&self) -> String {
        Self::compose_key(&self.instance_id, &self.config_name)
    }

    pub fn compose_key(instance_id: &InstanceId, config_name: &str) -> String {
        format!("{}/{}", instance_id.to_hex(), config_name)
    }

    /// Prefix shared by every status row of one agent.
    pub fn key_prefix(instance_id: &InstanceId) -> String {
        format!("{}/", instance_id.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_config_versions_advance() {
        let mut config = Config::new("nginx", ConfigKind::Pipeline, b"a: 1".to_vec(), "");
        assert_eq!(config.version, 1);
        config.mark_deleted();
        assert!(!config.is_live());
        assert_eq!(config.version, 2);
        config.revise(b"a: 2".to_vec(), "again".into());
        assert!(config.is_live());
        assert_eq!(config.version, 3);
    }

    #[test]
    fn test_legacy_selector_parse() {
        assert_eq!(
            GroupSelector::legacy("env=prod"),
            GroupSelector::Legacy { tag: GroupTag::new("env", "prod") }
        );
        assert_eq!(
            GroupSelector::legacy("canary"),
            GroupSelector::Legacy { tag: GroupTag::new("canary", "") }
        );
        assert_eq!(
            GroupSelector::legacy("k=v=w"),
            GroupSelector::Legacy { tag: GroupTag::new("k", "v=w") }
        );
    }

    #[test]
    fn test_default_group_shape() {
        let group = AgentGroup::default_group();
        assert!(group.is_default());
        assert!(group.selector.is_empty());
        assert!(group.applied(ConfigKind::Pipeline).is_empty());
    }

    #[test]
    fn test_agent_from_stored_repairs_unknown_status() {
        let agent = Agent::new(InstanceId::from("a"), Utc::now());
        let mut value = serde_json::to_value(&agent).unwrap();
        value["running_status"] = serde_json::json!("ZOMBIE");
        let (decoded, repaired) = Agent::from_stored(value).unwrap();
        assert!(repaired);
        assert_eq!(decoded.running_status, RunningStatus::Init);
    }

    #[test]
    fn test_agent_from_stored_keeps_known_status() {
        let mut agent = Agent::new(InstanceId::from("a"), Utc::now());
        agent.running_status = RunningStatus::Online;
        let value = serde_json::to_value(&agent).unwrap();
        let (decoded, repaired) = Agent::from_stored(value).unwrap();
        assert!(!repaired);
        assert_eq!(decoded, agent);
    }

    #[test]
    fn test_status_key_layout() {
        let row = AgentConfigStatus {
            instance_id: InstanceId::new(vec![0xab]),
            config_name: "nginx".into(),
            kind: ConfigKind::Pipeline,
            version: 1,
            status: ConfigApplyStatus::Applied,
            message: String::new(),
        };
        assert_eq!(row.key(), "ab/nginx");
        assert!(row.key().starts_with(&AgentConfigStatus::key_prefix(&row.instance_id)));
    }
}
