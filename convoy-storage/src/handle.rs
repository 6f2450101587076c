//! Typed access on top of a [`Store`].

use crate::{Batch, Record, Store, Table};
use convoy_core::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Cloneable, typed front for a shared store.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn Store>,
}

fn encode<T: Serialize>(table: Table, value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization {
        table: table.name().to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(table: Table, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| StorageError::Serialization {
        table: table.name().to_string(),
        reason: e.to_string(),
    })
}

impl StoreHandle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { inner: store }
    }

    /// The untyped store, for callers that decode rows themselves.
    pub fn raw(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    pub async fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StorageResult<Option<T>> {
        match self.inner.get(table, key).await? {
            Some(value) => decode(table, value).map(Some),
            None => Ok(None),
        }
    }

    pub async fn has(&self, table: Table, key: &str) -> StorageResult<bool> {
        self.inner.has(table, key).await
    }

    pub async fn add<R: Record>(&self, record: &R) -> StorageResult<()> {
        let table = record.table();
        self.inner.add(table, &record.key(), encode(table, record)?).await
    }

    pub async fn update<R: Record>(&self, record: &R) -> StorageResult<()> {
        let table = record.table();
        self.inner.update(table, &record.key(), encode(table, record)?).await
    }

    /// Insert or overwrite a single record.
    pub async fn put<R: Record>(&self, record: &R) -> StorageResult<()> {
        let mut batch = Batch::new();
        batch.put_record(record)?;
        self.inner.write_batch(&mut batch).await
    }

    pub async fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        self.inner.delete(table, key).await
    }

    pub async fn get_all<T: DeserializeOwned>(&self, table: Table) -> StorageResult<Vec<T>> {
        self.inner
            .get_all(table)
            .await?
            .into_iter()
            .map(|value| decode(table, value))
            .collect()
    }

    pub async fn get_prefix<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StorageResult<Vec<T>> {
        self.inner
            .get_prefix(table, prefix)
            .await?
            .into_iter()
            .map(|value| decode(table, value))
            .collect()
    }

    pub async fn write_batch(&self, batch: &mut Batch) -> StorageResult<()> {
        self.inner.write_batch(batch).await
    }

    pub async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }

    pub async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("driver", &self.inner.driver())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chrono::Utc;
    use convoy_core::legacy::Machine;
    use convoy_core::{AgentGroup, Config, ConfigKind, GroupSelector};

    fn handle() -> StoreHandle {
        StoreHandle::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_config_kinds_use_separate_tables() {
        let store = handle();
        let pipeline = Config::new("shared", ConfigKind::Pipeline, b"p".to_vec(), "");
        let instance = Config::new("shared", ConfigKind::Instance, b"i".to_vec(), "");
        store.add(&pipeline).await.unwrap();
        store.add(&instance).await.unwrap();

        let got: Config = store.get(Table::PipelineConfig, "shared").await.unwrap().unwrap();
        assert_eq!(got, pipeline);
        let got: Config = store.get(Table::InstanceConfig, "shared").await.unwrap().unwrap();
        assert_eq!(got, instance);
    }

    #[tokio::test]
    async fn test_put_upserts() {
        let store = handle();
        let mut group = AgentGroup::new("web", "", GroupSelector::legacy("env=prod"));
        store.put(&group).await.unwrap();
        group.version = 2;
        store.put(&group).await.unwrap();
        let all: Vec<AgentGroup> = store.get_all(Table::AgentGroup).await.unwrap();
        assert_eq!(all, vec![group]);
    }

    #[tokio::test]
    async fn test_decode_failure_is_serialization_error() {
        let store = handle();
        store.raw().add(Table::AgentGroup, "bad", serde_json::json!(42)).await.unwrap();
        let err = store.get::<AgentGroup>(Table::AgentGroup, "bad").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_legacy_records_persist() {
        let store = handle();
        let machine = Machine {
            machine_id: "m-1".into(),
            ip: "10.0.0.1".into(),
            hostname: "host".into(),
            heartbeat: Utc::now(),
            tag: "env=prod".into(),
        };
        store.add(&machine).await.unwrap();
        let got: Option<Machine> = store.get(Table::Machine, "m-1").await.unwrap();
        assert_eq!(got, Some(machine));
    }
}
