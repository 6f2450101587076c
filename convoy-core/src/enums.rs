//! Enumerations used by the entity model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a textual enum token is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToken {
    pub kind: &'static str,
    pub token: String,
}

impl fmt::Display for UnknownToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.token)
    }
}

impl std::error::Error for UnknownToken {}

// ============================================================================
// CONFIG KIND
// ============================================================================

/// The two independent configuration namespaces.
///
/// A pipeline config and an instance config may share a name; they never
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    Pipeline,
    Instance,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 2] = [ConfigKind::Pipeline, ConfigKind::Instance];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Pipeline => "pipeline",
            ConfigKind::Instance => "instance",
        }
    }

    /// Capitalized form used in operator route names.
    pub fn title(&self) -> &'static str {
        match self {
            ConfigKind::Pipeline => "Pipeline",
            ConfigKind::Instance => "Instance",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RUNNING STATUS
// ============================================================================

/// Liveness state of an agent, derived by the heartbeat state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunningStatus {
    #[default]
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "ONLINE")]
    Online,
    #[serde(rename = "OFFLINE")]
    Offline,
}

impl RunningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunningStatus::Init => "INIT",
            RunningStatus::Online => "ONLINE",
            RunningStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for RunningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunningStatus {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(RunningStatus::Init),
            "ONLINE" => Ok(RunningStatus::Online),
            "OFFLINE" => Ok(RunningStatus::Offline),
            other => Err(UnknownToken {
                kind: "running status",
                token: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// TAG OPERATOR
// ============================================================================

/// How a tag selector combines its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TagOperator {
    #[default]
    #[serde(rename = "LOGIC_AND")]
    And,
    #[serde(rename = "LOGIC_OR")]
    Or,
}

impl TagOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagOperator::And => "LOGIC_AND",
            TagOperator::Or => "LOGIC_OR",
        }
    }
}

impl FromStr for TagOperator {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOGIC_AND" => Ok(TagOperator::And),
            "LOGIC_OR" => Ok(TagOperator::Or),
            other => Err(UnknownToken {
                kind: "tag operator",
                token: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// CONFIG STATUS
// ============================================================================

/// Apply status an agent reports for one of its configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigApplyStatus {
    #[default]
    Unset,
    Applying,
    Applied,
    Failed,
}

/// Outcome of diffing one config between the desired and reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigUpdateStatus {
    New,
    Modified,
    Same,
    Deleted,
}
