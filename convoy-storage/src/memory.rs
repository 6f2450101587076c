//! In-process storage backend.

use crate::{Batch, BatchOp, Store, Table};
use async_trait::async_trait;
use convoy_core::{StorageError, StorageResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

type Rows = BTreeMap<String, Value>;

/// Store backed by ordered maps behind a lock.
///
/// Clones share the same data. Nothing survives a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<Table, Rows>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: Table) -> usize {
        self.tables
            .read()
            .map(|t| t.get(&table).map(BTreeMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Remove every row from every table.
    pub fn clear(&self) -> StorageResult<()> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

fn not_found(table: Table, key: &str) -> StorageError {
    StorageError::NotFound {
        table: table.name().to_string(),
        key: key.to_string(),
    }
}

fn already_exists(table: Table, key: &str) -> StorageError {
    StorageError::AlreadyExists {
        table: table.name().to_string(),
        key: key.to_string(),
    }
}

fn missing_value(table: Table, key: &str) -> StorageError {
    StorageError::Serialization {
        table: table.name().to_string(),
        reason: format!("batch item for key {key} carries no value"),
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn driver(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(&table).and_then(|rows| rows.get(key)).cloned())
    }

    async fn add(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let rows = tables.entry(table).or_default();
        if rows.contains_key(key) {
            return Err(already_exists(table, key));
        }
        rows.insert(key.to_string(), value);
        Ok(())
    }

    async fn update(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        match tables.get_mut(&table).and_then(|rows| rows.get_mut(key)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(not_found(table, key)),
        }
    }

    async fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(rows) = tables.get_mut(&table) {
            rows.remove(key);
        }
        Ok(())
    }

    async fn get_all(&self, table: Table) -> StorageResult<Vec<Value>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<Value>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables
            .get(&table)
            .map(|rows| {
                rows.range(prefix.to_string()..)
                    .take_while(|(key, _)| key.starts_with(prefix))
                    .map(|(_, value)| value.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_batch(&self, batch: &mut Batch) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;

        // Stage against copies of the touched tables so a failing item
        // leaves the live data untouched.
        let mut staged: HashMap<Table, Rows> = HashMap::new();
        for item in batch.items() {
            let rows = staged
                .entry(item.table)
                .or_insert_with(|| tables.get(&item.table).cloned().unwrap_or_default());
            match item.op {
                BatchOp::Add => {
                    if rows.contains_key(&item.key) {
                        return Err(already_exists(item.table, &item.key));
                    }
                    let value = item.value.clone().ok_or_else(|| missing_value(item.table, &item.key))?;
                    rows.insert(item.key.clone(), value);
                }
                BatchOp::Update => {
                    if !rows.contains_key(&item.key) {
                        return Err(not_found(item.table, &item.key));
                    }
                    let value = item.value.clone().ok_or_else(|| missing_value(item.table, &item.key))?;
                    rows.insert(item.key.clone(), value);
                }
                BatchOp::Put => {
                    let value = item.value.clone().ok_or_else(|| missing_value(item.table, &item.key))?;
                    rows.insert(item.key.clone(), value);
                }
                BatchOp::Delete => {
                    rows.remove(&item.key);
                }
            }
        }

        tables.extend(staged);
        batch.clear();
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.tables
            .read()
            .map(|_| ())
            .map_err(|_| StorageError::LockPoisoned)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Last write to a key inside one batch wins.
        #[test]
        fn prop_batch_last_write_wins(values in prop::collection::vec(0i64..1000, 1..10)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let mut batch = Batch::new();
                for v in &values {
                    batch.put(Table::Agent, "k", json!(v));
                }
                store.write_batch(&mut batch).await.unwrap();
                let last = *values.last().unwrap();
                assert_eq!(store.get(Table::Agent, "k").await.unwrap(), Some(json!(last)));
            });
        }
    }
}
