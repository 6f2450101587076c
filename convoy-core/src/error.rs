//! Error types for Convoy operations

use crate::ConfigKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Entity families named in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    PipelineConfig,
    InstanceConfig,
    AgentGroup,
    Agent,
    AgentConfigStatus,
}

impl From<ConfigKind> for EntityKind {
    fn from(kind: ConfigKind) -> Self {
        match kind {
            ConfigKind::Pipeline => EntityKind::PipelineConfig,
            ConfigKind::Instance => EntityKind::InstanceConfig,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EntityKind::PipelineConfig => "pipeline config",
            EntityKind::InstanceConfig => "instance config",
            EntityKind::AgentGroup => "agent group",
            EntityKind::Agent => "agent",
            EntityKind::AgentConfigStatus => "agent config status",
        };
        f.write_str(text)
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Key not found in {table}: {key}")]
    NotFound { table: String, key: String },

    #[error("Key already exists in {table}: {key}")]
    AlreadyExists { table: String, key: String },

    #[error("Serialization failed for {table}: {reason}")]
    Serialization { table: String, reason: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },

    #[error("Connection error: {reason}")]
    Connection { reason: String },

    #[error("Schema mismatch on {table}: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("Storage operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Storage driver not supported: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Server configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Provider not supported: {provider}")]
    ProviderNotSupported { provider: String },
}

/// Categories every surfaced error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    NotFound,
    AlreadyExists,
    AlreadyApplied,
    NotApplied,
    StillReferenced,
    SequenceOutOfOrder,
    ServerBusy,
    Internal,
}

/// Master error type for control plane operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvoyError {
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("{entity} not found: {name}")]
    NotFound { entity: EntityKind, name: String },

    #[error("{entity} already exists: {name}")]
    AlreadyExists { entity: EntityKind, name: String },

    #[error("{kind} config {config} is already applied to group {group}")]
    AlreadyApplied {
        kind: ConfigKind,
        group: String,
        config: String,
    },

    #[error("{kind} config {config} is not applied to group {group}")]
    NotApplied {
        kind: ConfigKind,
        group: String,
        config: String,
    },

    #[error("{kind} config {config} is still applied to groups {groups:?}")]
    StillReferenced {
        kind: ConfigKind,
        config: String,
        groups: Vec<String>,
    },

    #[error("Heartbeat out of order for agent {instance_id}: expected {expected}, got {got}")]
    SequenceOutOfOrder {
        instance_id: String,
        expected: u64,
        got: u64,
    },

    #[error("Server busy: {reason}")]
    ServerBusy { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ConvoyError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ConvoyError::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: EntityKind, name: impl Into<String>) -> Self {
        ConvoyError::NotFound {
            entity,
            name: name.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        ConvoyError::Internal {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvoyError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            ConvoyError::NotFound { .. } => ErrorKind::NotFound,
            ConvoyError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ConvoyError::AlreadyApplied { .. } => ErrorKind::AlreadyApplied,
            ConvoyError::NotApplied { .. } => ErrorKind::NotApplied,
            ConvoyError::StillReferenced { .. } => ErrorKind::StillReferenced,
            ConvoyError::SequenceOutOfOrder { .. } => ErrorKind::SequenceOutOfOrder,
            ConvoyError::ServerBusy { .. } => ErrorKind::ServerBusy,
            ConvoyError::Storage(StorageError::Timeout { .. }) => ErrorKind::ServerBusy,
            ConvoyError::Internal { .. } | ConvoyError::Storage(_) | ConvoyError::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Result type for control plane operations.
pub type ConvoyResult<T> = Result<T, ConvoyError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            table: "agent".to_string(),
            key: "abcd".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("agent"));
        assert!(msg.contains("abcd"));
    }

    #[test]
    fn test_config_error_display_provider() {
        let err = ConfigError::ProviderNotSupported {
            provider: "sqlite".to_string(),
        };
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn test_convoy_error_from_storage() {
        let err: ConvoyError = StorageError::LockPoisoned.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("lock poisoned"));
    }

    #[test]
    fn test_storage_timeout_is_busy() {
        let err: ConvoyError = StorageError::Timeout {
            operation: "write_batch".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ServerBusy);
    }

    #[test]
    fn test_still_referenced_lists_groups() {
        let err = ConvoyError::StillReferenced {
            kind: ConfigKind::Pipeline,
            config: "nginx".to_string(),
            groups: vec!["web".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("pipeline config nginx"));
        assert!(msg.contains("web"));
        assert_eq!(err.kind(), ErrorKind::StillReferenced);
    }

    #[test]
    fn test_not_found_names_entity() {
        let err = ConvoyError::not_found(EntityKind::AgentGroup, "web");
        assert_eq!(err.to_string(), "agent group not found: web");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
