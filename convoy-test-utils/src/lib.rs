//! Convoy Test Utilities
//!
//! Shared test infrastructure for the Convoy workspace:
//! - Proptest generators for entity types
//! - Fixtures for stores, tags and timestamps
//! - A store wrapper that injects write failures
//! - Assertions on error kinds

pub use convoy_core::{
    Agent, AgentGroup, Config, ConfigKind, ConvoyError, ConvoyResult, ErrorKind, GroupSelector,
    GroupTag, InstanceId, RunningStatus, StorageError, StorageResult, TagOperator, Timestamp,
};
pub use convoy_storage::{Batch, MemoryStore, Store, StoreHandle, Table};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// FAILING STORE
// ============================================================================

/// Memory store whose next `n` batch writes fail with a backend error.
///
/// Reads and single-key writes always go through.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures_left: Arc<AtomicUsize>,
    batch_attempts: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `write_batch` fail.
    pub fn fail_next_batches(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Total `write_batch` calls seen, failed or not.
    pub fn batch_attempts(&self) -> usize {
        self.batch_attempts.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn driver(&self) -> &'static str {
        "flaky-memory"
    }

    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>> {
        self.inner.get(table, key).await
    }

    async fn add(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        self.inner.add(table, key, value).await
    }

    async fn update(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        self.inner.update(table, key, value).await
    }

    async fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        self.inner.delete(table, key).await
    }

    async fn get_all(&self, table: Table) -> StorageResult<Vec<Value>> {
        self.inner.get_all(table).await
    }

    async fn get_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<Value>> {
        self.inner.get_prefix(table, prefix).await
    }

    async fn write_batch(&self, batch: &mut Batch) -> StorageResult<()> {
        self.batch_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Backend {
                reason: "injected batch failure".to_string(),
            });
        }
        self.inner.write_batch(batch).await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

pub mod generators {
    //! Proptest strategies for Convoy entity types.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Names safe for every table key and legacy selector.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,11}"
    }

    pub fn arb_instance_id() -> impl Strategy<Value = InstanceId> {
        prop::collection::vec(any::<u8>(), 1..16).prop_map(InstanceId::new)
    }

    /// Timestamps between 2020 and 2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }

    /// Small tag maps drawn from a narrow key/value alphabet so selectors
    /// and agents overlap often.
    pub fn arb_tags() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-c]", "[x-z]", 0..4)
    }

    pub fn arb_tag_operator() -> impl Strategy<Value = TagOperator> {
        prop_oneof![Just(TagOperator::And), Just(TagOperator::Or)]
    }

    pub fn arb_selector() -> impl Strategy<Value = GroupSelector> {
        prop_oneof![
            ("[a-c]", "[x-z]").prop_map(|(k, v)| GroupSelector::Legacy {
                tag: GroupTag::new(k, v)
            }),
            (
                prop::collection::vec(("[a-c]", "[x-z]"), 0..4),
                arb_tag_operator()
            )
                .prop_map(|(tags, operator)| GroupSelector::Tags {
                    tags: tags.into_iter().map(|(k, v)| GroupTag::new(k, v)).collect(),
                    operator,
                }),
        ]
    }

    pub fn arb_config_kind() -> impl Strategy<Value = ConfigKind> {
        prop_oneof![Just(ConfigKind::Pipeline), Just(ConfigKind::Instance)]
    }

    pub fn arb_config() -> impl Strategy<Value = Config> {
        (
            arb_name(),
            arb_config_kind(),
            prop::collection::vec(any::<u8>(), 0..64),
            1i64..100,
            any::<bool>(),
        )
            .prop_map(|(name, kind, content, version, tombstone)| Config {
                name,
                kind,
                content,
                version,
                description: String::new(),
                tombstone,
            })
    }

    pub fn arb_running_status() -> impl Strategy<Value = RunningStatus> {
        prop_oneof![
            Just(RunningStatus::Init),
            Just(RunningStatus::Online),
            Just(RunningStatus::Offline),
        ]
    }

    pub fn arb_agent() -> impl Strategy<Value = Agent> {
        (
            arb_instance_id(),
            arb_tags(),
            arb_running_status(),
            arb_timestamp(),
            0i32..120,
            0u32..5,
            0u32..5,
            any::<u64>(),
            prop::collection::btree_map(arb_name(), "[a-z0-9.]{0,8}", 0..3),
        )
            .prop_map(|(id, tags, status, seen, interval, success, fail, seq, attributes)| {
                let mut agent = Agent::new(id, seen);
                agent.agent_type = "logtail".to_string();
                agent.ip = "10.0.0.1".to_string();
                agent.attributes = attributes;
                agent.tags = tags;
                agent.running_status = status;
                agent.interval = interval;
                agent.success_beat_count = success;
                agent.fail_beat_count = fail;
                agent.sequence_num = seq;
                agent
            })
    }

    pub fn arb_group() -> impl Strategy<Value = AgentGroup> {
        (arb_name(), arb_selector()).prop_map(|(name, selector)| AgentGroup::new(name, "", selector))
    }
}

pub mod fixtures {
    //! Ready-made values for common scenarios.

    use super::*;
    use chrono::{DateTime, Duration};
    use std::collections::BTreeMap;

    /// Fixed epoch all scenario clocks count from.
    pub fn epoch() -> Timestamp {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    /// `epoch() + secs`.
    pub fn at(secs: i64) -> Timestamp {
        epoch() + Duration::seconds(secs)
    }

    /// `epoch() + millis`.
    pub fn at_millis(millis: i64) -> Timestamp {
        epoch() + Duration::milliseconds(millis)
    }

    pub fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn tag_selector(pairs: &[(&str, &str)], operator: TagOperator) -> GroupSelector {
        GroupSelector::Tags {
            tags: pairs.iter().map(|(k, v)| GroupTag::new(*k, *v)).collect(),
            operator,
        }
    }

    pub fn pipeline_config(name: &str, content: &str) -> Config {
        Config::new(name, ConfigKind::Pipeline, content.as_bytes().to_vec(), "")
    }

    pub fn instance_config(name: &str, content: &str) -> Config {
        Config::new(name, ConfigKind::Instance, content.as_bytes().to_vec(), "")
    }

    /// Fresh memory store plus a typed handle over it.
    pub fn memory_store() -> (MemoryStore, StoreHandle) {
        let store = MemoryStore::new();
        let handle = StoreHandle::new(Arc::new(store.clone()));
        (store, handle)
    }

    /// Fresh failing store plus a typed handle over it.
    pub fn flaky_store() -> (FlakyStore, StoreHandle) {
        let store = FlakyStore::new();
        let handle = StoreHandle::new(Arc::new(store.clone()));
        (store, handle)
    }
}

pub mod assertions {
    //! Assertions on control plane results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &ConvoyResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a result failed with the given error kind.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &ConvoyResult<T>, kind: ErrorKind) {
        match result {
            Err(err) => assert_eq!(err.kind(), kind, "Wrong error kind for {:?}", err),
            Ok(value) => panic!("Expected {:?} error, got Ok: {:?}", kind, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_flaky_store_fails_then_recovers() {
        let store = FlakyStore::new();
        store.fail_next_batches(1);
        let mut batch = Batch::new();
        batch.put(Table::Agent, "a", json!(1));
        assert!(store.write_batch(&mut batch).await.is_err());
        assert_eq!(batch.len(), 1);
        store.write_batch(&mut batch).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(store.batch_attempts(), 2);
        assert_eq!(store.memory().count(Table::Agent), 1);
    }
}
