//! Convoy Storage
//!
//! A small key/value abstraction over logical tables. Values are the JSON
//! serialization of canonical entities. Two backends are provided: an
//! in-process [`MemoryStore`] and a [`PostgresStore`].

mod batch;
mod driver;
mod handle;
mod memory;
mod postgres;
mod record;
mod table;

pub use batch::{Batch, BatchItem, BatchOp};
pub use driver::{open_store, StorageDriver, StoreOptions};
pub use handle::StoreHandle;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use record::Record;
pub use table::Table;

use async_trait::async_trait;
use convoy_core::StorageResult;
use serde_json::Value;

/// Backend-agnostic storage operations.
///
/// Implementations must be safe to share across tasks. `write_batch` is the
/// only multi-key operation and must apply all of its items or none.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name used in logs.
    fn driver(&self) -> &'static str;

    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>>;

    async fn has(&self, table: Table, key: &str) -> StorageResult<bool> {
        Ok(self.get(table, key).await?.is_some())
    }

    /// Insert a new row. Fails with `AlreadyExists` when the key is taken.
    async fn add(&self, table: Table, key: &str, value: Value) -> StorageResult<()>;

    /// Overwrite an existing row. Fails with `NotFound` when absent.
    async fn update(&self, table: Table, key: &str, value: Value) -> StorageResult<()>;

    /// Remove a row. Deleting a missing key succeeds.
    async fn delete(&self, table: Table, key: &str) -> StorageResult<()>;

    /// All rows of `table`, ordered by key.
    async fn get_all(&self, table: Table) -> StorageResult<Vec<Value>>;

    /// Rows of `table` whose key starts with `prefix`, ordered by key.
    async fn get_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<Value>>;

    /// Apply every item atomically. On success the batch is emptied.
    async fn write_batch(&self, batch: &mut Batch) -> StorageResult<()>;

    /// Cheap liveness probe.
    async fn ping(&self) -> StorageResult<()>;

    async fn close(&self) -> StorageResult<()>;
}
