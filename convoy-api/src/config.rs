//! Server Configuration
//!
//! `ServerConfig` is assembled once at startup from three layers, later
//! layers winning:
//!
//! 1. Built-in defaults (see `constants`)
//! 2. An optional TOML file named by `CONVOY_CONFIG_FILE`
//! 3. `CONVOY_<FIELD>` environment variables, e.g. `CONVOY_LISTEN_ADDRESS`

use crate::constants::{
    CONFIG_FILE_ENV, DEFAULT_AGENT_UPDATE_INTERVAL_SECS, DEFAULT_CONFIG_FLUSH_INTERVAL_MS,
    DEFAULT_HEARTBEAT_INTERVAL_HINT_SECS, DEFAULT_LISTEN_ADDRESS, DEFAULT_REQUEST_TIMEOUT_SECS,
    ENV_PREFIX,
};
use convoy_agents::{
    AgentSettings, DEFAULT_CLEAR_HOURS_AFTER_OFFLINE, DEFAULT_FLUSH_INTERVAL_MS,
    DEFAULT_MAX_PENDING_UPDATES, DEFAULT_OFFLINE_AFTER_FAIL, DEFAULT_ONLINE_AFTER_SUCCESS,
};
use convoy_configs::DeletePolicy;
use convoy_core::ConfigError;
use convoy_storage::{StorageDriver, StoreOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// IDENTITY
// ============================================================================

/// Role of this instance.
///
/// A secondary serves only the agent API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    #[default]
    Primary,
    Secondary,
}

impl Identity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Identity::Primary => "primary",
            Identity::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Identity::Primary),
            "secondary" => Ok(Identity::Secondary),
            other => Err(format!("expected primary or secondary, got {other}")),
        }
    }
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// Process-wide settings, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8899`.
    pub listen_address: String,

    pub storage_driver: StorageDriver,

    /// Connection string for non-memory drivers.
    pub storage_dsn: String,

    /// Create missing tables at startup instead of refusing to start.
    pub auto_migrate_schema: bool,

    /// Consecutive heartbeats before an agent is ONLINE (N).
    pub online_after_success: u32,

    /// Missed intervals before an agent is OFFLINE (M).
    pub offline_after_fail: u32,

    /// Reaper period in seconds (U).
    pub agent_update_interval_seconds: u64,

    /// Hours of silence before an agent is deleted (H).
    pub clear_hours_after_offline: u64,

    pub identity: Identity,

    pub request_timeout_secs: u64,

    /// Batch writer period.
    pub agent_flush_interval_ms: u64,

    /// Config flusher period.
    pub config_flush_interval_ms: u64,

    /// Bound on distinct agents waiting for the batch writer (B).
    pub max_pending_agent_updates: usize,

    /// Send NEW/MODIFIED bodies inside the heartbeat reply.
    pub inline_config_bodies: bool,

    pub config_delete_policy: DeletePolicy,

    /// Heartbeat interval returned to agents. Zero means no suggestion.
    pub heartbeat_interval_hint_secs: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            storage_driver: StorageDriver::Memory,
            storage_dsn: String::new(),
            auto_migrate_schema: true,
            online_after_success: DEFAULT_ONLINE_AFTER_SUCCESS,
            offline_after_fail: DEFAULT_OFFLINE_AFTER_FAIL,
            agent_update_interval_seconds: DEFAULT_AGENT_UPDATE_INTERVAL_SECS,
            clear_hours_after_offline: DEFAULT_CLEAR_HOURS_AFTER_OFFLINE,
            identity: Identity::Primary,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            agent_flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            config_flush_interval_ms: DEFAULT_CONFIG_FLUSH_INTERVAL_MS,
            max_pending_agent_updates: DEFAULT_MAX_PENDING_UPDATES,
            inline_config_bodies: true,
            config_delete_policy: DeletePolicy::Tombstone,
            heartbeat_interval_hint_secs: DEFAULT_HEARTBEAT_INTERVAL_HINT_SECS,
        }
    }
}

impl ServerConfig {
    /// Defaults, then the file named by `CONVOY_CONFIG_FILE`, then the
    /// environment. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse TOML. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.message().to_string(),
        })
    }

    /// Apply `CONVOY_<FIELD>` overrides read through `vars`.
    pub fn apply_env<F>(&mut self, vars: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |field: &str| {
            let key = format!("{}{}", ENV_PREFIX, field.to_ascii_uppercase());
            vars(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = lookup("listen_address") {
            self.listen_address = value;
        }
        if let Some((_, value)) = lookup("storage_driver") {
            self.storage_driver = value
                .parse()
                .map_err(|_| ConfigError::ProviderNotSupported { provider: value.clone() })?;
        }
        if let Some((_, value)) = lookup("storage_dsn") {
            self.storage_dsn = value;
        }
        if let Some((key, value)) = lookup("auto_migrate_schema") {
            self.auto_migrate_schema = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = lookup("online_after_success") {
            self.online_after_success = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("offline_after_fail") {
            self.offline_after_fail = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("agent_update_interval_seconds") {
            self.agent_update_interval_seconds = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("clear_hours_after_offline") {
            self.clear_hours_after_offline = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("identity") {
            self.identity = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("request_timeout_secs") {
            self.request_timeout_secs = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("agent_flush_interval_ms") {
            self.agent_flush_interval_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("config_flush_interval_ms") {
            self.config_flush_interval_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("max_pending_agent_updates") {
            self.max_pending_agent_updates = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = lookup("inline_config_bodies") {
            self.inline_config_bodies = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = lookup("config_delete_policy") {
            self.config_delete_policy = parse_delete_policy(&key, &value)?;
        }
        if let Some((key, value)) = lookup("heartbeat_interval_hint_secs") {
            self.heartbeat_interval_hint_secs = parse_value(&key, &value)?;
        }
        Ok(())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "listen_address".to_string(),
            });
        }
        if !self.storage_driver.is_supported() {
            return Err(ConfigError::ProviderNotSupported {
                provider: self.storage_driver.to_string(),
            });
        }
        if self.storage_driver != StorageDriver::Memory && self.storage_dsn.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "storage_dsn".to_string(),
            });
        }

        let positive = [
            ("online_after_success", u64::from(self.online_after_success)),
            ("offline_after_fail", u64::from(self.offline_after_fail)),
            ("agent_update_interval_seconds", self.agent_update_interval_seconds),
            ("request_timeout_secs", self.request_timeout_secs),
            ("agent_flush_interval_ms", self.agent_flush_interval_ms),
            ("config_flush_interval_ms", self.config_flush_interval_ms),
            ("max_pending_agent_updates", self.max_pending_agent_updates as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.heartbeat_interval_hint_secs < 0 {
            return Err(ConfigError::InvalidValue {
                field: "heartbeat_interval_hint_secs".to_string(),
                value: self.heartbeat_interval_hint_secs.to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_primary(&self) -> bool {
        self.identity == Identity::Primary
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn config_flush_interval(&self) -> Duration {
        Duration::from_millis(self.config_flush_interval_ms)
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            online_after_success: self.online_after_success,
            offline_after_fail: self.offline_after_fail,
            reap_interval: Duration::from_secs(self.agent_update_interval_seconds),
            evict_after: Duration::from_secs(self.clear_hours_after_offline.saturating_mul(3600)),
            max_pending: self.max_pending_agent_updates,
            flush_interval: Duration::from_millis(self.agent_flush_interval_ms),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            auto_migrate: self.auto_migrate_schema,
            op_timeout: self.request_timeout(),
            ..StoreOptions::default()
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_delete_policy(key: &str, value: &str) -> Result<DeletePolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "tombstone" => Ok(DeletePolicy::Tombstone),
        "reject_referenced" => Ok(DeletePolicy::RejectReferenced),
        _ => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            value: value.to_string(),
            reason: "expected tombstone or reject_referenced".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert!(config.is_primary());
        assert_eq!(config.storage_driver, StorageDriver::Memory);
        assert_eq!(config.config_delete_policy, DeletePolicy::Tombstone);
        assert_eq!(config.agent_settings(), AgentSettings::default());
    }

    #[test]
    fn test_toml_overlays_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            listen_address = "127.0.0.1:9000"
            storage_driver = "postgres"
            storage_dsn = "host=db user=convoy"
            offline_after_fail = 2
            identity = "secondary"
            config_delete_policy = "reject_referenced"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.storage_driver, StorageDriver::Postgres);
        assert_eq!(config.offline_after_fail, 2);
        assert_eq!(config.identity, Identity::Secondary);
        assert_eq!(config.config_delete_policy, DeletePolicy::RejectReferenced);
        assert_eq!(config.online_after_success, DEFAULT_ONLINE_AFTER_SUCCESS);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let err = ServerConfig::from_toml("listen_adress = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ServerConfig::from_toml("online_after_success = 5").unwrap();
        config
            .apply_env(env(&[
                ("CONVOY_ONLINE_AFTER_SUCCESS", "3"),
                ("CONVOY_CLEAR_HOURS_AFTER_OFFLINE", "1"),
                ("CONVOY_INLINE_CONFIG_BODIES", "false"),
                ("CONVOY_IDENTITY", "Secondary"),
            ]))
            .unwrap();
        assert_eq!(config.online_after_success, 3);
        assert!(!config.inline_config_bodies);
        assert!(!config.is_primary());
        assert_eq!(config.agent_settings().evict_after, Duration::from_secs(3600));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_env(env(&[("CONVOY_OFFLINE_AFTER_FAIL", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "CONVOY_OFFLINE_AFTER_FAIL"));

        let err = config
            .apply_env(env(&[("CONVOY_STORAGE_DRIVER", "oracle")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ProviderNotSupported {
                provider: "oracle".to_string()
            }
        );
    }

    #[test]
    fn test_unbuilt_drivers_fail_validation() {
        for driver in ["sqlite", "mysql", "sqlserver"] {
            let mut config = ServerConfig::default();
            config
                .apply_env(env(&[("CONVOY_STORAGE_DRIVER", driver), ("CONVOY_STORAGE_DSN", "x")]))
                .unwrap();
            assert_eq!(
                config.validate().unwrap_err(),
                ConfigError::ProviderNotSupported {
                    provider: driver.to_string()
                }
            );
        }
    }

    #[test]
    fn test_postgres_needs_dsn() {
        let config = ServerConfig {
            storage_driver: StorageDriver::Postgres,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::MissingRequired {
                field: "storage_dsn".to_string()
            }
        );
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        for config in [
            ServerConfig {
                online_after_success: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                offline_after_fail: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                agent_update_interval_seconds: 0,
                ..ServerConfig::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
        }
        let config = ServerConfig {
            listen_address: " ".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingRequired { .. })));
    }

    #[test]
    fn test_store_options_follow_config() {
        let config = ServerConfig {
            auto_migrate_schema: false,
            request_timeout_secs: 3,
            ..ServerConfig::default()
        };
        let options = config.store_options();
        assert!(!options.auto_migrate);
        assert_eq!(options.op_timeout, Duration::from_secs(3));
    }
}
