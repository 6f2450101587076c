//! Backend selection.

use crate::{MemoryStore, PostgresStore, Store};
use convoy_core::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Storage drivers an operator can name in configuration.
///
/// Only `memory` and `postgres` are built in; naming another driver fails
/// at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    #[default]
    Memory,
    Postgres,
    Sqlite,
    Mysql,
    Sqlserver,
}

impl StorageDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageDriver::Memory => "memory",
            StorageDriver::Postgres => "postgres",
            StorageDriver::Sqlite => "sqlite",
            StorageDriver::Mysql => "mysql",
            StorageDriver::Sqlserver => "sqlserver",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, StorageDriver::Memory | StorageDriver::Postgres)
    }
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageDriver {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "leveldb" => Ok(StorageDriver::Memory),
            "postgres" | "postgresql" => Ok(StorageDriver::Postgres),
            "sqlite" => Ok(StorageDriver::Sqlite),
            "mysql" => Ok(StorageDriver::Mysql),
            "sqlserver" | "mssql" => Ok(StorageDriver::Sqlserver),
            other => Err(StorageError::UnsupportedDriver {
                driver: other.to_string(),
            }),
        }
    }
}

/// Connection settings shared by every backend.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create missing tables instead of failing on them.
    pub auto_migrate: bool,
    pub max_connections: usize,
    /// Deadline for a single storage operation.
    pub op_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            auto_migrate: false,
            max_connections: 16,
            op_timeout: Duration::from_secs(10),
        }
    }
}

/// Open the backend named by `driver`.
pub async fn open_store(
    driver: StorageDriver,
    dsn: &str,
    options: &StoreOptions,
) -> StorageResult<Arc<dyn Store>> {
    match driver {
        StorageDriver::Memory => {
            tracing::info!(driver = "memory", "Opening in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageDriver::Postgres => {
            tracing::info!(driver = "postgres", auto_migrate = options.auto_migrate, "Opening PostgreSQL store");
            Ok(Arc::new(PostgresStore::connect(dsn, options).await?))
        }
        unsupported => Err(StorageError::UnsupportedDriver {
            driver: unsupported.to_string(),
        }),
    }
}
