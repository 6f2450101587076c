//! Atomic write batches

use crate::{Record, Table};
use convoy_core::{StorageError, StorageResult};
use serde_json::Value;

/// Kind of mutation carried by a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert; fails the batch if the key exists.
    Add,
    /// Overwrite; fails the batch if the key is absent.
    Update,
    /// Insert or overwrite.
    Put,
    /// Remove if present.
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub op: BatchOp,
    pub table: Table,
    pub key: String,
    pub value: Option<Value>,
}

/// Ordered list of mutations applied all-or-nothing by
/// [`Store::write_batch`](crate::Store::write_batch).
///
/// Items touching the same key apply in insertion order. A successful write
/// empties the batch; a failed one leaves it intact for retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    items: Vec<BatchItem>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn push(&mut self, op: BatchOp, table: Table, key: impl Into<String>, value: Option<Value>) {
        self.items.push(BatchItem {
            op,
            table,
            key: key.into(),
            value,
        });
    }

    pub fn add(&mut self, table: Table, key: impl Into<String>, value: Value) {
        self.push(BatchOp::Add, table, key, Some(value));
    }

    pub fn update(&mut self, table: Table, key: impl Into<String>, value: Value) {
        self.push(BatchOp::Update, table, key, Some(value));
    }

    pub fn put(&mut self, table: Table, key: impl Into<String>, value: Value) {
        self.push(BatchOp::Put, table, key, Some(value));
    }

    pub fn delete(&mut self, table: Table, key: impl Into<String>) {
        self.push(BatchOp::Delete, table, key, None);
    }

    /// Queue an upsert of `record` under its own table and key.
    pub fn put_record<R: Record>(&mut self, record: &R) -> StorageResult<()> {
        let table = record.table();
        let value = serde_json::to_value(record).map_err(|e| StorageError::Serialization {
            table: table.name().to_string(),
            reason: e.to_string(),
        })?;
        self.put(table, record.key(), value);
        Ok(())
    }

    pub fn delete_record<R: Record>(&mut self, record: &R) {
        self.delete(record.table(), record.key());
    }
}
