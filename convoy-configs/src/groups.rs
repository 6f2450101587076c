//! Agent groups and the configs applied to them.

use crate::FlushStats;
use convoy_core::{
    AgentGroup, ConfigKind, ConvoyError, ConvoyResult, EntityKind, GroupSelector, StorageError,
    Timestamp,
};
use convoy_storage::{Batch, StoreHandle, Table};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Index = HashMap<String, Arc<AgentGroup>>;

/// Write-through cache of agent groups over storage.
pub struct GroupRegistry {
    store: StoreHandle,
    groups: Mutex<Index>,
}

impl GroupRegistry {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self) -> ConvoyResult<usize> {
        let mut groups = self.groups.lock().await;
        *groups = self.read_all().await?;
        Ok(groups.len())
    }

    async fn read_all(&self) -> ConvoyResult<Index> {
        let stored: Vec<AgentGroup> = self.store.get_all(Table::AgentGroup).await?;
        Ok(stored
            .into_iter()
            .map(|g| (g.name.clone(), Arc::new(g)))
            .collect())
    }

    async fn read_through(&self, groups: &mut Index, name: &str) -> ConvoyResult<Option<Arc<AgentGroup>>> {
        if let Some(found) = groups.get(name) {
            return Ok(Some(Arc::clone(found)));
        }
        match self.store.get::<AgentGroup>(Table::AgentGroup, name).await? {
            Some(group) => {
                let group = Arc::new(group);
                groups.insert(name.to_string(), Arc::clone(&group));
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    async fn require(&self, groups: &mut Index, name: &str) -> ConvoyResult<AgentGroup> {
        self.read_through(groups, name)
            .await?
            .map(|g| (*g).clone())
            .ok_or_else(|| ConvoyError::not_found(EntityKind::AgentGroup, name))
    }

    async fn write_existing(&self, groups: &mut Index, group: AgentGroup) -> ConvoyResult<AgentGroup> {
        match self.store.update(&group).await {
            Ok(()) => {
                groups.insert(group.name.clone(), Arc::new(group.clone()));
                Ok(group)
            }
            Err(StorageError::NotFound { .. }) => {
                groups.remove(&group.name);
                Err(ConvoyError::not_found(EntityKind::AgentGroup, group.name))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Create the default group if storage does not have it yet.
    pub async fn ensure_default(&self) -> ConvoyResult<()> {
        let mut groups = self.groups.lock().await;
        let default = AgentGroup::default_group();
        if self.read_through(&mut groups, &default.name).await?.is_some() {
            return Ok(());
        }
        match self.store.add(&default).await {
            Ok(()) | Err(StorageError::AlreadyExists { .. }) => {}
            Err(other) => return Err(other.into()),
        }
        tracing::info!(group = %default.name, "Default agent group created");
        groups.insert(default.name.clone(), Arc::new(default));
        Ok(())
    }

    /// Create a group at version 1. Applied configs are never taken from
    /// the request.
    pub async fn create(&self, name: &str, description: String, selector: GroupSelector) -> ConvoyResult<AgentGroup> {
        if name.is_empty() {
            return Err(ConvoyError::invalid("agent group name must not be empty"));
        }
        let mut groups = self.groups.lock().await;
        let already = || ConvoyError::AlreadyExists {
            entity: EntityKind::AgentGroup,
            name: name.to_string(),
        };
        if self.read_through(&mut groups, name).await?.is_some() {
            return Err(already());
        }
        let group = AgentGroup::new(name, description, selector);
        self.store.add(&group).await.map_err(|e| match e {
            StorageError::AlreadyExists { .. } => already(),
            other => other.into(),
        })?;
        tracing::info!(group = name, "Agent group created");
        groups.insert(name.to_string(), Arc::new(group.clone()));
        Ok(group)
    }

    /// Replace description and selector. The default group's selector
    /// cannot change.
    pub async fn update(&self, name: &str, description: String, selector: GroupSelector) -> ConvoyResult<AgentGroup> {
        let mut groups = self.groups.lock().await;
        let mut group = self.require(&mut groups, name).await?;
        if group.is_default() && group.selector != selector {
            return Err(ConvoyError::invalid("the default group's selector cannot be changed"));
        }
        group.description = description;
        group.selector = selector;
        group.version += 1;
        let group = self.write_existing(&mut groups, group).await?;
        tracing::info!(group = name, version = group.version, "Agent group updated");
        Ok(group)
    }

    pub async fn delete(&self, name: &str) -> ConvoyResult<()> {
        let mut groups = self.groups.lock().await;
        let group = self.require(&mut groups, name).await?;
        if group.is_default() {
            return Err(ConvoyError::invalid("the default group cannot be deleted"));
        }
        self.store.delete(Table::AgentGroup, name).await?;
        groups.remove(name);
        tracing::info!(group = name, "Agent group deleted");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> ConvoyResult<AgentGroup> {
        let mut groups = self.groups.lock().await;
        self.require(&mut groups, name).await
    }

    /// All groups ordered by name.
    pub async fn list(&self) -> Vec<AgentGroup> {
        let groups = self.groups.lock().await;
        let mut all: Vec<AgentGroup> = groups.values().map(|g| (**g).clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub async fn snapshot(&self) -> Vec<Arc<AgentGroup>> {
        self.groups.lock().await.values().cloned().collect()
    }

    /// Record `config` as applied to `group`. The caller has verified the
    /// config exists.
    pub async fn apply(&self, kind: ConfigKind, group_name: &str, config: &str, now: Timestamp) -> ConvoyResult<AgentGroup> {
        let mut groups = self.groups.lock().await;
        let mut group = self.require(&mut groups, group_name).await?;
        if group.applied(kind).contains_key(config) {
            return Err(ConvoyError::AlreadyApplied {
                kind,
                group: group_name.to_string(),
                config: config.to_string(),
            });
        }
        group.applied_mut(kind).insert(config.to_string(), now);
        group.version += 1;
        let group = self.write_existing(&mut groups, group).await?;
        tracing::info!(kind = %kind, group = group_name, config, "Config applied to group");
        Ok(group)
    }

    pub async fn remove(&self, kind: ConfigKind, group_name: &str, config: &str) -> ConvoyResult<AgentGroup> {
        let mut groups = self.groups.lock().await;
        let mut group = self.require(&mut groups, group_name).await?;
        if group.applied_mut(kind).remove(config).is_none() {
            return Err(ConvoyError::NotApplied {
                kind,
                group: group_name.to_string(),
                config: config.to_string(),
            });
        }
        group.version += 1;
        let group = self.write_existing(&mut groups, group).await?;
        tracing::info!(kind = %kind, group = group_name, config, "Config removed from group");
        Ok(group)
    }

    /// Names of groups `config` is applied to, ordered.
    pub async fn groups_with(&self, kind: ConfigKind, config: &str) -> Vec<String> {
        let groups = self.groups.lock().await;
        let mut names: Vec<String> = groups
            .values()
            .filter(|g| g.applied(kind).contains_key(config))
            .map(|g| g.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Push groups storage holds at an older version, then reload from
    /// storage.
    ///
    /// Mutations write through, so a group missing from storage was deleted
    /// by another instance and is dropped rather than written back.
    pub async fn flush(&self) -> ConvoyResult<FlushStats> {
        let mut groups = self.groups.lock().await;
        let stored = self.read_all().await?;

        let mut batch = Batch::new();
        for group in groups.values() {
            let stale = stored
                .get(&group.name)
                .is_some_and(|s| s.version < group.version);
            if stale {
                batch.put_record(group.as_ref())?;
            }
        }
        let pushed = batch.len();
        if pushed > 0 {
            self.store.write_batch(&mut batch).await?;
            *groups = self.read_all().await?;
        } else {
            *groups = stored;
        }
        Ok(FlushStats {
            pushed,
            pulled: groups.len(),
        })
    }
}
