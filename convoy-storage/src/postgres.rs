//! PostgreSQL storage backend.
//!
//! Each logical table maps to one relation with a text column per key part
//! and a JSONB `value` column.

use crate::{Batch, BatchItem, BatchOp, Store, StoreOptions, Table};
use async_trait::async_trait;
use convoy_core::{StorageError, StorageResult};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;

// ============================================================================
// SQL HELPERS
// ============================================================================

fn column_list(table: Table) -> String {
    table.key_columns().join(", ")
}

/// `a = $n AND b = $n+1 ...` starting at placeholder `first`.
fn key_predicate(table: Table, first: usize) -> String {
    table
        .key_columns()
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ${}", first + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Predicate and parameters selecting keys that start with `prefix`.
///
/// Complete leading key parts compare with `=`, so a prefix ending in `/`
/// on a composite key becomes an equality on the first column.
fn prefix_predicate(table: Table, prefix: &str) -> (String, Vec<String>) {
    let columns = table.key_columns();
    let parts: Vec<&str> = prefix.splitn(columns.len(), '/').collect();
    let (exact, rest) = parts.split_at(parts.len().saturating_sub(1));

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (col, part) in columns.iter().zip(exact) {
        params.push(part.to_string());
        clauses.push(format!("{col} = ${}", params.len()));
    }
    if let Some(partial) = rest.first().filter(|p| !p.is_empty()) {
        params.push(format!("{}%", escape_like(partial)));
        clauses.push(format!("{} LIKE ${} ESCAPE '\\'", columns[exact.len()], params.len()));
    }
    if clauses.is_empty() {
        clauses.push("TRUE".to_string());
    }
    (clauses.join(" AND "), params)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql(table: Table) -> String {
    let key_defs = table
        .key_columns()
        .iter()
        .map(|col| format!("{col} TEXT NOT NULL"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({key_defs}, value JSONB NOT NULL, PRIMARY KEY ({}))",
        table.name(),
        column_list(table)
    )
}

fn split_key(table: Table, key: &str) -> StorageResult<Vec<&str>> {
    table.split_key(key).ok_or_else(|| StorageError::Backend {
        reason: format!("key {key} does not match the key layout of {table}"),
    })
}

fn backend_err(e: tokio_postgres::Error) -> StorageError {
    StorageError::Backend {
        reason: e.to_string(),
    }
}

fn pool_err(e: deadpool_postgres::PoolError) -> StorageError {
    match e {
        deadpool_postgres::PoolError::Timeout(_) => StorageError::Timeout {
            operation: "acquire connection".to_string(),
        },
        other => StorageError::Connection {
            reason: other.to_string(),
        },
    }
}

fn decode_value(table: Table, row: &tokio_postgres::Row) -> StorageResult<Value> {
    row.try_get::<_, Value>("value")
        .map_err(|e| StorageError::Serialization {
            table: table.name().to_string(),
            reason: e.to_string(),
        })
}

// ============================================================================
// STORE
// ============================================================================

/// Store backed by a deadpool-managed PostgreSQL pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
    op_timeout: Duration,
}

impl PostgresStore {
    /// Connect to `dsn`, then create missing tables or verify the existing
    /// schema depending on `options.auto_migrate`.
    pub async fn connect(dsn: &str, options: &StoreOptions) -> StorageResult<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(dsn.to_string());
        cfg.pool = Some(PoolConfig::new(options.max_connections));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Connection {
                reason: format!("Failed to create pool: {}", e),
            })?;

        let store = Self {
            pool,
            op_timeout: options.op_timeout,
        };
        store.ping().await?;

        if options.auto_migrate {
            store.migrate().await?;
        } else {
            store.verify_schema().await?;
        }
        tracing::info!(tables = Table::ALL.len(), auto_migrate = options.auto_migrate, "PostgreSQL store ready");
        Ok(store)
    }

    async fn timed<T, F>(&self, operation: &str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation: operation.to_string(),
            }),
        }
    }

    async fn client(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    /// Create every table that does not exist yet.
    pub async fn migrate(&self) -> StorageResult<()> {
        self.timed("migrate", async {
            let client = self.client().await?;
            for table in Table::ALL {
                client
                    .batch_execute(&create_table_sql(table))
                    .await
                    .map_err(backend_err)?;
            }
            Ok(())
        })
        .await
    }

    /// Check that every table exists with the expected columns.
    pub async fn verify_schema(&self) -> StorageResult<()> {
        self.timed("verify_schema", async {
            let client = self.client().await?;
            for table in Table::ALL {
                let rows = client
                    .query(
                        "SELECT column_name::text FROM information_schema.columns WHERE table_name = $1",
                        &[&table.name()],
                    )
                    .await
                    .map_err(backend_err)?;
                let columns: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();
                if columns.is_empty() {
                    return Err(StorageError::SchemaMismatch {
                        table: table.name().to_string(),
                        reason: "table is missing".to_string(),
                    });
                }
                for expected in table.key_columns().iter().copied().chain(["value"]) {
                    if !columns.iter().any(|c| c == expected) {
                        return Err(StorageError::SchemaMismatch {
                            table: table.name().to_string(),
                            reason: format!("column {expected} is missing"),
                        });
                    }
                }
            }
            Ok(())
        })
        .await
    }
}

async fn apply_item(tx: &tokio_postgres::Transaction<'_>, item: &BatchItem) -> StorageResult<()> {
    let table = item.table;
    let parts = split_key(table, &item.key)?;
    let key_count = parts.len();
    let mut params: Vec<&(dyn ToSql + Sync)> =
        parts.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let missing = || StorageError::Serialization {
        table: table.name().to_string(),
        reason: format!("batch item for key {} carries no value", item.key),
    };

    match item.op {
        BatchOp::Add => {
            let value = item.value.as_ref().ok_or_else(missing)?;
            params.push(value);
            let sql = format!(
                "INSERT INTO {} ({}, value) VALUES ({}) ON CONFLICT DO NOTHING",
                table.name(),
                column_list(table),
                placeholders(key_count + 1)
            );
            let inserted = tx.execute(sql.as_str(), &params).await.map_err(backend_err)?;
            if inserted == 0 {
                return Err(StorageError::AlreadyExists {
                    table: table.name().to_string(),
                    key: item.key.clone(),
                });
            }
        }
        BatchOp::Update => {
            let value = item.value.as_ref().ok_or_else(missing)?;
            params.push(value);
            let sql = format!(
                "UPDATE {} SET value = ${} WHERE {}",
                table.name(),
                key_count + 1,
                key_predicate(table, 1)
            );
            let updated = tx.execute(sql.as_str(), &params).await.map_err(backend_err)?;
            if updated == 0 {
                return Err(StorageError::NotFound {
                    table: table.name().to_string(),
                    key: item.key.clone(),
                });
            }
        }
        BatchOp::Put => {
            let value = item.value.as_ref().ok_or_else(missing)?;
            params.push(value);
            let sql = format!(
                "INSERT INTO {} ({cols}, value) VALUES ({}) \
                 ON CONFLICT ({cols}) DO UPDATE SET value = EXCLUDED.value",
                table.name(),
                placeholders(key_count + 1),
                cols = column_list(table),
            );
            tx.execute(sql.as_str(), &params).await.map_err(backend_err)?;
        }
        BatchOp::Delete => {
            let sql = format!("DELETE FROM {} WHERE {}", table.name(), key_predicate(table, 1));
            tx.execute(sql.as_str(), &params).await.map_err(backend_err)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PostgresStore {
    fn driver(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>> {
        self.timed("get", async {
            let parts = split_key(table, key)?;
            let params: Vec<&(dyn ToSql + Sync)> =
                parts.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            let sql = format!(
                "SELECT value FROM {} WHERE {}",
                table.name(),
                key_predicate(table, 1)
            );
            let client = self.client().await?;
            let row = client
                .query_opt(sql.as_str(), &params)
                .await
                .map_err(backend_err)?;
            row.map(|r| decode_value(table, &r)).transpose()
        })
        .await
    }

    async fn add(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        let mut batch = Batch::new();
        batch.add(table, key, value);
        self.write_batch(&mut batch).await
    }

    async fn update(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        let mut batch = Batch::new();
        batch.update(table, key, value);
        self.write_batch(&mut batch).await
    }

    async fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        let mut batch = Batch::new();
        batch.delete(table, key);
        self.write_batch(&mut batch).await
    }

    async fn get_all(&self, table: Table) -> StorageResult<Vec<Value>> {
        self.timed("get_all", async {
            let sql = format!(
                "SELECT value FROM {} ORDER BY {}",
                table.name(),
                column_list(table)
            );
            let client = self.client().await?;
            let rows = client.query(sql.as_str(), &[]).await.map_err(backend_err)?;
            rows.iter().map(|r| decode_value(table, r)).collect()
        })
        .await
    }

    async fn get_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<Value>> {
        self.timed("get_prefix", async {
            let (predicate, values) = prefix_predicate(table, prefix);
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            let sql = format!(
                "SELECT value FROM {} WHERE {} ORDER BY {}",
                table.name(),
                predicate,
                column_list(table)
            );
            let client = self.client().await?;
            let rows = client
                .query(sql.as_str(), &params)
                .await
                .map_err(backend_err)?;
            rows.iter().map(|r| decode_value(table, r)).collect()
        })
        .await
    }

    async fn write_batch(&self, batch: &mut Batch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let items = batch.items();
        self.timed("write_batch", async {
            let mut client = self.client().await?;
            let tx = client.transaction().await.map_err(backend_err)?;
            for item in items {
                apply_item(&tx, item).await?;
            }
            tx.commit().await.map_err(backend_err)
        })
        .await?;
        batch.clear();
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.timed("ping", async {
            let client = self.client().await?;
            client.simple_query("SELECT 1").await.map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql_composite_key() {
        let sql = create_table_sql(Table::AgentPipelineConfig);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS agent_pipeline_config"));
        assert!(sql.contains("agent_instance_id TEXT NOT NULL"));
        assert!(sql.contains("config_name TEXT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (agent_instance_id, config_name)"));
    }

    #[test]
    fn test_key_predicate_offsets() {
        assert_eq!(
            key_predicate(Table::AgentInstanceConfig, 2),
            "agent_instance_id = $2 AND config_name = $3"
        );
        assert_eq!(key_predicate(Table::Agent, 1), "instance_id = $1");
    }

    #[test]
    fn test_prefix_predicate_on_agent_key() {
        let (predicate, params) = prefix_predicate(Table::AgentInstanceConfig, "ab01/");
        assert_eq!(predicate, "agent_instance_id = $1");
        assert_eq!(params, vec!["ab01"]);
    }

    #[test]
    fn test_prefix_predicate_partial_part_escaped() {
        let (predicate, params) = prefix_predicate(Table::AgentPipelineConfig, "ab01/ng_x%");
        assert_eq!(predicate, "agent_instance_id = $1 AND config_name LIKE $2 ESCAPE '\\'");
        assert_eq!(params, vec!["ab01".to_string(), "ng\\_x\\%%".to_string()]);

        let (predicate, params) = prefix_predicate(Table::PipelineConfig, "");
        assert_eq!(predicate, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "$1, $2, $3");
    }
}

#[cfg(all(test, feature = "db-tests"))]
mod db_tests {
    use super::*;
    use serde_json::json;

    async fn connect() -> PostgresStore {
        let dsn = std::env::var("CONVOY_TEST_POSTGRES_DSN")
            .unwrap_or_else(|_| "postgres://postgres@localhost/convoy_test".to_string());
        let options = StoreOptions {
            auto_migrate: true,
            ..StoreOptions::default()
        };
        PostgresStore::connect(&dsn, &options).await.unwrap()
    }

    #[tokio::test]
    async fn test_batch_round_trip() {
        let store = connect().await;
        store.delete(Table::AgentPipelineConfig, "ff/db-test").await.unwrap();

        let mut batch = Batch::new();
        batch.put(Table::AgentPipelineConfig, "ff/db-test", json!({"v": 1}));
        batch.put(Table::AgentPipelineConfig, "ff/db-test", json!({"v": 2}));
        store.write_batch(&mut batch).await.unwrap();
        assert!(batch.is_empty());

        let value = store.get(Table::AgentPipelineConfig, "ff/db-test").await.unwrap();
        assert_eq!(value, Some(json!({"v": 2})));
        let scanned = store.get_prefix(Table::AgentPipelineConfig, "ff/").await.unwrap();
        assert!(scanned.contains(&json!({"v": 2})));
        store.delete(Table::AgentPipelineConfig, "ff/db-test").await.unwrap();
    }
}
