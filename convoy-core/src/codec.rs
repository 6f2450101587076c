//! Pure conversions between canonical entities and wire messages.
//!
//! Decoding validates at the boundary: enum values outside the known set and
//! empty names are rejected with `InvalidParameter`.

use crate::wire;
use crate::{
    timestamp_from_nanos, timestamp_to_nanos, Agent, AgentConfigStatus, AgentGroup,
    ConfigApplyStatus, ConfigKind, ConfigUpdateStatus, ConvoyError, ConvoyResult, ErrorKind,
    GroupSelector, GroupTag, InstanceId, RunningStatus, TagOperator,
};
use crate::Config;
use std::collections::{BTreeMap, HashMap};

/// Whether a config body travels with its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    WithBody,
    WithoutBody,
}

// ============================================================================
// ENUMS
// ============================================================================

impl From<ConfigApplyStatus> for wire::ConfigStatus {
    fn from(status: ConfigApplyStatus) -> Self {
        match status {
            ConfigApplyStatus::Unset => wire::ConfigStatus::Unset,
            ConfigApplyStatus::Applying => wire::ConfigStatus::Applying,
            ConfigApplyStatus::Applied => wire::ConfigStatus::Applied,
            ConfigApplyStatus::Failed => wire::ConfigStatus::Failed,
        }
    }
}

impl ConfigApplyStatus {
    pub fn from_wire(raw: i32) -> ConvoyResult<Self> {
        match wire::ConfigStatus::try_from(raw) {
            Ok(wire::ConfigStatus::Unset) => Ok(ConfigApplyStatus::Unset),
            Ok(wire::ConfigStatus::Applying) => Ok(ConfigApplyStatus::Applying),
            Ok(wire::ConfigStatus::Applied) => Ok(ConfigApplyStatus::Applied),
            Ok(wire::ConfigStatus::Failed) => Ok(ConfigApplyStatus::Failed),
            Err(_) => Err(ConvoyError::invalid(format!("unknown config status {raw}"))),
        }
    }
}

impl From<ConfigUpdateStatus> for wire::CheckStatus {
    fn from(status: ConfigUpdateStatus) -> Self {
        match status {
            ConfigUpdateStatus::New => wire::CheckStatus::New,
            ConfigUpdateStatus::Modified => wire::CheckStatus::Modified,
            ConfigUpdateStatus::Same => wire::CheckStatus::Same,
            ConfigUpdateStatus::Deleted => wire::CheckStatus::Deleted,
        }
    }
}

impl ConfigUpdateStatus {
    pub fn from_wire(raw: i32) -> ConvoyResult<Self> {
        match wire::CheckStatus::try_from(raw) {
            Ok(wire::CheckStatus::New) => Ok(ConfigUpdateStatus::New),
            Ok(wire::CheckStatus::Modified) => Ok(ConfigUpdateStatus::Modified),
            Ok(wire::CheckStatus::Same) => Ok(ConfigUpdateStatus::Same),
            Ok(wire::CheckStatus::Deleted) => Ok(ConfigUpdateStatus::Deleted),
            Err(_) => Err(ConvoyError::invalid(format!("unknown check status {raw}"))),
        }
    }
}

impl From<TagOperator> for wire::TagOperator {
    fn from(op: TagOperator) -> Self {
        match op {
            TagOperator::And => wire::TagOperator::LogicAnd,
            TagOperator::Or => wire::TagOperator::LogicOr,
        }
    }
}

impl TagOperator {
    pub fn from_wire(raw: i32) -> ConvoyResult<Self> {
        match wire::TagOperator::try_from(raw) {
            Ok(wire::TagOperator::LogicAnd) => Ok(TagOperator::And),
            Ok(wire::TagOperator::LogicOr) => Ok(TagOperator::Or),
            Err(_) => Err(ConvoyError::invalid(format!("unknown tag operator {raw}"))),
        }
    }
}

impl From<RunningStatus> for wire::RunningStatus {
    fn from(status: RunningStatus) -> Self {
        match status {
            RunningStatus::Init => wire::RunningStatus::Init,
            RunningStatus::Online => wire::RunningStatus::Online,
            RunningStatus::Offline => wire::RunningStatus::Offline,
        }
    }
}

impl RunningStatus {
    pub fn from_wire(raw: i32) -> ConvoyResult<Self> {
        match wire::RunningStatus::try_from(raw) {
            Ok(wire::RunningStatus::Init) => Ok(RunningStatus::Init),
            Ok(wire::RunningStatus::Online) => Ok(RunningStatus::Online),
            Ok(wire::RunningStatus::Offline) => Ok(RunningStatus::Offline),
            Err(_) => Err(ConvoyError::invalid(format!("unknown running status {raw}"))),
        }
    }
}

impl ErrorKind {
    /// Integer placed in `CommonResponse::status` for this kind.
    pub fn wire_status(&self) -> i32 {
        match self {
            ErrorKind::InvalidParameter
            | ErrorKind::AlreadyExists
            | ErrorKind::AlreadyApplied
            | ErrorKind::SequenceOutOfOrder => wire::status::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::NotApplied => wire::status::NOT_FOUND,
            ErrorKind::StillReferenced | ErrorKind::Internal => wire::status::INTERNAL_ERROR,
            ErrorKind::ServerBusy => wire::status::SERVER_BUSY,
        }
    }
}

impl wire::CommonResponse {
    pub fn accept() -> Self {
        Self {
            status: wire::status::ACCEPT,
            error_message: Vec::new(),
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: kind.wire_status(),
            error_message: message.into().into_bytes(),
        }
    }
}

// ============================================================================
// TAGS
// ============================================================================

/// Collapse repeated wire tags into a map. Later duplicates win.
pub fn tags_from_wire(tags: &[wire::AgentGroupTag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.name.clone(), t.value.clone()))
        .collect()
}

pub fn tags_to_wire(tags: &BTreeMap<String, String>) -> Vec<wire::AgentGroupTag> {
    tags.iter()
        .map(|(name, value)| wire::AgentGroupTag {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn applied_to_wire(applied: &BTreeMap<String, crate::Timestamp>) -> HashMap<String, i64> {
    applied
        .iter()
        .map(|(name, at)| (name.clone(), timestamp_to_nanos(at)))
        .collect()
}

fn applied_from_wire(applied: HashMap<String, i64>) -> BTreeMap<String, crate::Timestamp> {
    applied
        .into_iter()
        .map(|(name, nanos)| (name, timestamp_from_nanos(nanos)))
        .collect()
}

fn require_name(name: &str, what: &str) -> ConvoyResult<()> {
    if name.is_empty() {
        return Err(ConvoyError::invalid(format!("{what} name must not be empty")));
    }
    Ok(())
}

// ============================================================================
// ENTITIES
// ============================================================================

impl Config {
    pub fn to_wire(&self, mode: BodyMode) -> wire::ConfigDetail {
        wire::ConfigDetail {
            name: self.name.clone(),
            version: self.version,
            detail: match mode {
                BodyMode::WithBody => self.content.clone(),
                BodyMode::WithoutBody => Vec::new(),
            },
            description: self.description.clone(),
            tombstone: self.tombstone,
        }
    }

    pub fn from_wire(kind: ConfigKind, msg: wire::ConfigDetail) -> ConvoyResult<Self> {
        require_name(&msg.name, "config")?;
        Ok(Self {
            name: msg.name,
            kind,
            content: msg.detail,
            version: msg.version,
            description: msg.description,
            tombstone: msg.tombstone,
        })
    }
}

impl AgentGroup {
    pub fn to_wire(&self) -> wire::AgentGroup {
        let (tags, tag_operator, legacy_tag) = match &self.selector {
            GroupSelector::Legacy { tag } => {
                let legacy = if tag.value.is_empty() {
                    tag.name.clone()
                } else {
                    format!("{}={}", tag.name, tag.value)
                };
                (Vec::new(), wire::TagOperator::LogicAnd, legacy)
            }
            GroupSelector::Tags { tags, operator } => (
                tags.iter()
                    .map(|t| wire::AgentGroupTag {
                        name: t.name.clone(),
                        value: t.value.clone(),
                    })
                    .collect(),
                wire::TagOperator::from(*operator),
                String::new(),
            ),
        };
        wire::AgentGroup {
            name: self.name.clone(),
            description: self.description.clone(),
            tags,
            tag_operator: tag_operator as i32,
            legacy_tag,
            version: self.version,
            applied_pipeline_configs: applied_to_wire(&self.applied_pipeline_configs),
            applied_instance_configs: applied_to_wire(&self.applied_instance_configs),
        }
    }

    pub fn from_wire(msg: wire::AgentGroup) -> ConvoyResult<Self> {
        require_name(&msg.name, "agent group")?;
        let operator = TagOperator::from_wire(msg.tag_operator)?;
        let selector = if msg.legacy_tag.is_empty() {
            GroupSelector::Tags {
                tags: msg
                    .tags
                    .into_iter()
                    .map(|t| GroupTag::new(t.name, t.value))
                    .collect(),
                operator,
            }
        } else {
            GroupSelector::legacy(&msg.legacy_tag)
        };
        Ok(Self {
            name: msg.name,
            description: msg.description,
            selector,
            applied_pipeline_configs: applied_from_wire(msg.applied_pipeline_configs),
            applied_instance_configs: applied_from_wire(msg.applied_instance_configs),
            version: msg.version,
        })
    }
}

impl Agent {
    /// Encode the agent. Reported config statuses are attached by the caller.
    pub fn to_wire(&self) -> wire::AgentInfo {
        wire::AgentInfo {
            instance_id: self.instance_id.as_bytes().to_vec(),
            agent_type: self.agent_type.clone(),
            attributes: Some(wire::AgentAttributes {
                version: self.version.clone(),
                ip: self.ip.clone(),
                hostname: self.hostname.clone(),
                extras: self
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            }),
            tags: tags_to_wire(&self.tags),
            running_status: wire::RunningStatus::from(self.running_status) as i32,
            startup_time: self.startup_time,
            interval: self.interval,
            latest_heartbeat: timestamp_to_nanos(&self.latest_heartbeat),
            beat_cycle_time: timestamp_to_nanos(&self.beat_cycle_time),
            success_beat_count: self.success_beat_count,
            fail_beat_count: self.fail_beat_count,
            sequence_num: self.sequence_num,
            pipeline_configs: Vec::new(),
            instance_configs: Vec::new(),
        }
    }

    pub fn from_wire(msg: wire::AgentInfo) -> ConvoyResult<Self> {
        if msg.instance_id.is_empty() {
            return Err(ConvoyError::invalid("instance_id must not be empty"));
        }
        let attributes = msg.attributes.unwrap_or_default();
        Ok(Self {
            instance_id: InstanceId::new(msg.instance_id),
            agent_type: msg.agent_type,
            ip: attributes.ip,
            hostname: attributes.hostname,
            version: attributes.version,
            attributes: attributes.extras.into_iter().collect(),
            tags: tags_from_wire(&msg.tags),
            running_status: RunningStatus::from_wire(msg.running_status)?,
            startup_time: msg.startup_time,
            interval: msg.interval,
            latest_heartbeat: timestamp_from_nanos(msg.latest_heartbeat),
            beat_cycle_time: timestamp_from_nanos(msg.beat_cycle_time),
            success_beat_count: msg.success_beat_count,
            fail_beat_count: msg.fail_beat_count,
            sequence_num: msg.sequence_num,
        })
    }
}

impl AgentConfigStatus {
    pub fn to_wire(&self) -> wire::ConfigInfo {
        wire::ConfigInfo {
            name: self.config_name.clone(),
            version: self.version,
            status: wire::ConfigStatus::from(self.status) as i32,
            message: self.message.clone(),
        }
    }

    pub fn from_wire(
        instance_id: &InstanceId,
        kind: ConfigKind,
        msg: wire::ConfigInfo,
    ) -> ConvoyResult<Self> {
        require_name(&msg.name, "config")?;
        Ok(Self {
            instance_id: instance_id.clone(),
            config_name: msg.name,
            kind,
            version: msg.version,
            status: ConfigApplyStatus::from_wire(msg.status)?,
            message: msg.message,
        })
    }
}
