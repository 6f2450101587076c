//! Operator-facing view over configs and groups.

use crate::{ConfigRegistry, FlushStats, GroupRegistry};
use chrono::Utc;
use convoy_core::{
    AgentGroup, Config, ConfigKind, ConvoyError, ConvoyResult, EntityKind, GroupSelector,
};
use convoy_storage::StoreHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What deleting a config that groups still reference does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Tombstone it; agents see it as deleted on their next heartbeat.
    #[default]
    Tombstone,
    /// Refuse with `StillReferenced` while any group references it.
    RejectReferenced,
}

/// Configs, groups and the relation between them.
///
/// Operations touching both registries take their locks one after the
/// other, never nested. Relation writes and config deletes also hold
/// `relations` across their check and their write, so a config is never
/// applied after it was tombstoned nor tombstoned under `RejectReferenced`
/// while a group gains a reference to it.
pub struct Catalog {
    configs: ConfigRegistry,
    groups: GroupRegistry,
    delete_policy: DeletePolicy,
    relations: Mutex<()>,
}

/// Everything the resolver needs, cloned out of the registries at once.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub groups: Vec<Arc<AgentGroup>>,
    pub pipeline_configs: HashMap<String, Arc<Config>>,
    pub instance_configs: HashMap<String, Arc<Config>>,
}

impl CatalogSnapshot {
    pub fn configs(&self, kind: ConfigKind) -> &HashMap<String, Arc<Config>> {
        match kind {
            ConfigKind::Pipeline => &self.pipeline_configs,
            ConfigKind::Instance => &self.instance_configs,
        }
    }
}

impl Catalog {
    pub fn new(store: StoreHandle, delete_policy: DeletePolicy) -> Self {
        Self {
            configs: ConfigRegistry::new(store.clone()),
            groups: GroupRegistry::new(store),
            delete_policy,
            relations: Mutex::new(()),
        }
    }

    /// Fill both indices from storage and make sure the default group exists.
    pub async fn load(&self) -> ConvoyResult<()> {
        let configs = self.configs.load().await?;
        let groups = self.groups.load().await?;
        self.groups.ensure_default().await?;
        tracing::info!(configs, groups, policy = ?self.delete_policy, "Catalog loaded");
        Ok(())
    }

    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    // ========================================================================
    // CONFIGS
    // ========================================================================

    pub async fn create_config(&self, kind: ConfigKind, name: &str, content: Vec<u8>, description: String) -> ConvoyResult<Config> {
        self.configs.create(kind, name, content, description).await
    }

    pub async fn update_config(&self, kind: ConfigKind, name: &str, content: Vec<u8>, description: String) -> ConvoyResult<Config> {
        self.configs.update(kind, name, content, description).await
    }

    pub async fn delete_config(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Config> {
        let _relations = self.relations.lock().await;
        if self.delete_policy == DeletePolicy::RejectReferenced {
            let groups = self.groups.groups_with(kind, name).await;
            if !groups.is_empty() {
                return Err(ConvoyError::StillReferenced {
                    kind,
                    config: name.to_string(),
                    groups,
                });
            }
        }
        self.configs.delete(kind, name).await
    }

    pub async fn get_config(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Config> {
        self.configs.get(kind, name).await
    }

    pub async fn list_configs(&self, kind: ConfigKind) -> Vec<Config> {
        self.configs.list(kind).await
    }

    // ========================================================================
    // GROUPS
    // ========================================================================

    pub async fn create_group(&self, name: &str, description: String, selector: GroupSelector) -> ConvoyResult<AgentGroup> {
        self.groups.create(name, description, selector).await
    }

    pub async fn update_group(&self, name: &str, description: String, selector: GroupSelector) -> ConvoyResult<AgentGroup> {
        self.groups.update(name, description, selector).await
    }

    pub async fn delete_group(&self, name: &str) -> ConvoyResult<()> {
        self.groups.delete(name).await
    }

    pub async fn get_group(&self, name: &str) -> ConvoyResult<AgentGroup> {
        self.groups.get(name).await
    }

    pub async fn list_groups(&self) -> Vec<AgentGroup> {
        self.groups.list().await
    }

    // ========================================================================
    // RELATIONS
    // ========================================================================

    /// Attach a live config to a group.
    pub async fn apply_config(&self, kind: ConfigKind, config: &str, group: &str) -> ConvoyResult<AgentGroup> {
        let _relations = self.relations.lock().await;
        self.configs.get(kind, config).await?;
        self.groups.apply(kind, group, config, Utc::now()).await
    }

    /// Detach a config from a group. Tombstoned configs can still be
    /// detached.
    pub async fn remove_config(&self, kind: ConfigKind, config: &str, group: &str) -> ConvoyResult<AgentGroup> {
        let _relations = self.relations.lock().await;
        if self.configs.lookup(kind, config).await?.is_none() {
            return Err(ConvoyError::not_found(EntityKind::from(kind), config));
        }
        self.groups.remove(kind, group, config).await
    }

    /// Live configs applied to `group`, ordered by name.
    pub async fn applied_configs(&self, kind: ConfigKind, group: &str) -> ConvoyResult<Vec<String>> {
        let group = self.groups.get(group).await?;
        let mut live = Vec::new();
        for name in group.applied(kind).keys() {
            if let Some(config) = self.configs.lookup(kind, name).await? {
                if config.is_live() {
                    live.push(name.clone());
                }
            }
        }
        Ok(live)
    }

    /// Groups a live config is applied to, ordered by name.
    pub async fn applied_groups(&self, kind: ConfigKind, config: &str) -> ConvoyResult<Vec<String>> {
        self.configs.get(kind, config).await?;
        Ok(self.groups.groups_with(kind, config).await)
    }

    // ========================================================================
    // RESOLVER SUPPORT
    // ========================================================================

    pub async fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            groups: self.groups.snapshot().await,
            pipeline_configs: self.configs.snapshot(ConfigKind::Pipeline).await,
            instance_configs: self.configs.snapshot(ConfigKind::Instance).await,
        }
    }

    /// One push-then-pull round over every index.
    pub async fn flush(&self) -> ConvoyResult<FlushStats> {
        let mut stats = self.groups.flush().await?;
        for kind in ConfigKind::ALL {
            stats += self.configs.flush(kind).await?;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_test_utils::assertions::assert_kind;
    use convoy_test_utils::fixtures::memory_store;
    use convoy_test_utils::ErrorKind;

    async fn catalog(policy: DeletePolicy) -> Catalog {
        let (_, handle) = memory_store();
        let catalog = Catalog::new(handle, policy);
        catalog.load().await.unwrap();
        catalog
    }

    async fn seed(catalog: &Catalog) {
        catalog.create_group("web", String::new(), GroupSelector::empty()).await.unwrap();
        catalog.create_config(ConfigKind::Pipeline, "nginx", b"a".to_vec(), String::new()).await.unwrap();
        catalog.apply_config(ConfigKind::Pipeline, "nginx", "web").await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_requires_live_config() {
        let catalog = catalog(DeletePolicy::Tombstone).await;
        catalog.create_group("web", String::new(), GroupSelector::empty()).await.unwrap();
        let missing = catalog.apply_config(ConfigKind::Pipeline, "nginx", "web").await;
        assert_kind(&missing, ErrorKind::NotFound);

        catalog.create_config(ConfigKind::Pipeline, "nginx", Vec::new(), String::new()).await.unwrap();
        catalog.delete_config(ConfigKind::Pipeline, "nginx").await.unwrap();
        let tombstoned = catalog.apply_config(ConfigKind::Pipeline, "nginx", "web").await;
        assert_kind(&tombstoned, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_apply_wrong_kind_is_not_found() {
        let catalog = catalog(DeletePolicy::Tombstone).await;
        seed(&catalog).await;
        let result = catalog.apply_config(ConfigKind::Instance, "nginx", "web").await;
        assert_kind(&result, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_tombstone_policy_hides_from_projections() {
        let catalog = catalog(DeletePolicy::Tombstone).await;
        seed(&catalog).await;
        catalog.delete_config(ConfigKind::Pipeline, "nginx").await.unwrap();

        assert!(catalog.applied_configs(ConfigKind::Pipeline, "web").await.unwrap().is_empty());
        let groups = catalog.applied_groups(ConfigKind::Pipeline, "nginx").await;
        assert_kind(&groups, ErrorKind::NotFound);

        // The relation survives so agents can be told about the deletion.
        let group = catalog.get_group("web").await.unwrap();
        assert!(group.applied(ConfigKind::Pipeline).contains_key("nginx"));

        catalog.remove_config(ConfigKind::Pipeline, "nginx", "web").await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_referenced_delete() {
        let catalog = catalog(DeletePolicy::RejectReferenced).await;
        seed(&catalog).await;
        let result = catalog.delete_config(ConfigKind::Pipeline, "nginx").await;
        match result {
            Err(ConvoyError::StillReferenced { groups, .. }) => assert_eq!(groups, vec!["web"]),
            other => panic!("expected StillReferenced, got {:?}", other),
        }

        catalog.remove_config(ConfigKind::Pipeline, "nginx", "web").await.unwrap();
        catalog.delete_config(ConfigKind::Pipeline, "nginx").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_apply_and_delete_never_strand_a_reference() {
        for _ in 0..50 {
            let shared = Arc::new(catalog(DeletePolicy::RejectReferenced).await);
            shared.create_group("web", String::new(), GroupSelector::empty()).await.unwrap();
            shared.create_config(ConfigKind::Pipeline, "nginx", b"a".to_vec(), String::new()).await.unwrap();

            let apply = {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.apply_config(ConfigKind::Pipeline, "nginx", "web").await })
            };
            let delete = {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.delete_config(ConfigKind::Pipeline, "nginx").await })
            };
            let (applied, deleted) = tokio::join!(apply, delete);
            let (applied, deleted) = (applied.unwrap(), deleted.unwrap());
            assert_ne!(applied.is_ok(), deleted.is_ok());

            let config = shared.configs().lookup(ConfigKind::Pipeline, "nginx").await.unwrap().unwrap();
            let referenced = !shared.groups().groups_with(ConfigKind::Pipeline, "nginx").await.is_empty();
            assert!(!(config.tombstone && referenced));
        }
    }

    #[tokio::test]
    async fn test_remove_unknown_config() {
        let catalog = catalog(DeletePolicy::Tombstone).await;
        catalog.create_group("web", String::new(), GroupSelector::empty()).await.unwrap();
        let result = catalog.remove_config(ConfigKind::Instance, "ghost", "web").await;
        assert_kind(&result, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_projections_are_symmetric() {
        let catalog = catalog(DeletePolicy::Tombstone).await;
        seed(&catalog).await;
        catalog.create_group("api", String::new(), GroupSelector::empty()).await.unwrap();
        catalog.apply_config(ConfigKind::Pipeline, "nginx", "api").await.unwrap();

        assert_eq!(
            catalog.applied_groups(ConfigKind::Pipeline, "nginx").await.unwrap(),
            vec!["api", "web"]
        );
        for group in ["api", "web"] {
            assert_eq!(
                catalog.applied_configs(ConfigKind::Pipeline, group).await.unwrap(),
                vec!["nginx"]
            );
        }
    }

    #[tokio::test]
    async fn test_snapshot_includes_tombstones() {
        let catalog = catalog(DeletePolicy::Tombstone).await;
        seed(&catalog).await;
        catalog.delete_config(ConfigKind::Pipeline, "nginx").await.unwrap();
        let snapshot = catalog.snapshot().await;
        assert!(snapshot.configs(ConfigKind::Pipeline)["nginx"].tombstone);
        assert_eq!(snapshot.groups.len(), 2);
    }
}
