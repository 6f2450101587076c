//! Versioned config bodies, one namespace per kind.

use crate::FlushStats;
use convoy_core::{Config, ConfigKind, ConvoyError, ConvoyResult, EntityKind, StorageError};
use convoy_storage::{Batch, StoreHandle, Table};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Index = HashMap<String, Arc<Config>>;

/// Write-through cache of configs over storage.
///
/// Each kind has its own index and lock. Mutations hold the lock across
/// the storage write, so writes to one kind are serialized and the index
/// never runs ahead of storage.
pub struct ConfigRegistry {
    store: StoreHandle,
    pipeline: Mutex<Index>,
    instance: Mutex<Index>,
}

fn require_name(name: &str) -> ConvoyResult<()> {
    if name.is_empty() {
        return Err(ConvoyError::invalid("config name must not be empty"));
    }
    Ok(())
}

impl ConfigRegistry {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            pipeline: Mutex::new(HashMap::new()),
            instance: Mutex::new(HashMap::new()),
        }
    }

    fn index(&self, kind: ConfigKind) -> &Mutex<Index> {
        match kind {
            ConfigKind::Pipeline => &self.pipeline,
            ConfigKind::Instance => &self.instance,
        }
    }

    /// Replace both indices with what storage holds.
    pub async fn load(&self) -> ConvoyResult<usize> {
        let mut total = 0;
        for kind in ConfigKind::ALL {
            let mut entries = self.index(kind).lock().await;
            *entries = self.read_all(kind).await?;
            total += entries.len();
        }
        Ok(total)
    }

    async fn read_all(&self, kind: ConfigKind) -> ConvoyResult<Index> {
        let stored: Vec<Config> = self.store.get_all(Table::configs(kind)).await?;
        Ok(stored
            .into_iter()
            .map(|c| (c.name.clone(), Arc::new(c)))
            .collect())
    }

    /// Look `name` up in the index, falling back to storage on a miss.
    async fn read_through(
        &self,
        entries: &mut Index,
        kind: ConfigKind,
        name: &str,
    ) -> ConvoyResult<Option<Arc<Config>>> {
        if let Some(found) = entries.get(name) {
            return Ok(Some(Arc::clone(found)));
        }
        match self.store.get::<Config>(Table::configs(kind), name).await? {
            Some(config) => {
                let config = Arc::new(config);
                entries.insert(name.to_string(), Arc::clone(&config));
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Create a config at version 1, or revive a tombstoned one at the
    /// next version.
    pub async fn create(
        &self,
        kind: ConfigKind,
        name: &str,
        content: Vec<u8>,
        description: String,
    ) -> ConvoyResult<Config> {
        require_name(name)?;
        let mut entries = self.index(kind).lock().await;

        let config = match self.read_through(&mut entries, kind, name).await? {
            Some(existing) if existing.is_live() => {
                return Err(ConvoyError::AlreadyExists {
                    entity: kind.into(),
                    name: name.to_string(),
                });
            }
            Some(tombstoned) => {
                let mut revived = (*tombstoned).clone();
                revived.revise(content, description);
                self.store.update(&revived).await?;
                tracing::info!(kind = %kind, config = name, version = revived.version, "Config revived");
                revived
            }
            None => {
                let config = Config::new(name, kind, content, description);
                self.store.add(&config).await.map_err(|e| match e {
                    StorageError::AlreadyExists { .. } => ConvoyError::AlreadyExists {
                        entity: kind.into(),
                        name: name.to_string(),
                    },
                    other => other.into(),
                })?;
                tracing::info!(kind = %kind, config = name, "Config created");
                config
            }
        };

        entries.insert(name.to_string(), Arc::new(config.clone()));
        Ok(config)
    }

    /// Replace the body of a live config, bumping its version.
    pub async fn update(
        &self,
        kind: ConfigKind,
        name: &str,
        content: Vec<u8>,
        description: String,
    ) -> ConvoyResult<Config> {
        require_name(name)?;
        let mut entries = self.index(kind).lock().await;
        let mut config = match self.read_through(&mut entries, kind, name).await? {
            Some(existing) if existing.is_live() => (*existing).clone(),
            _ => return Err(ConvoyError::not_found(kind.into(), name)),
        };
        config.revise(content, description);
        self.write_existing(&mut entries, &config).await?;
        tracing::info!(kind = %kind, config = name, version = config.version, "Config updated");
        Ok(config)
    }

    /// Tombstone a live config, bumping its version.
    pub async fn delete(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Config> {
        require_name(name)?;
        let mut entries = self.index(kind).lock().await;
        let mut config = match self.read_through(&mut entries, kind, name).await? {
            Some(existing) if existing.is_live() => (*existing).clone(),
            _ => return Err(ConvoyError::not_found(kind.into(), name)),
        };
        config.mark_deleted();
        self.write_existing(&mut entries, &config).await?;
        tracing::info!(kind = %kind, config = name, version = config.version, "Config tombstoned");
        Ok(config)
    }

    async fn write_existing(&self, entries: &mut Index, config: &Config) -> ConvoyResult<()> {
        match self.store.update(config).await {
            Ok(()) => {
                entries.insert(config.name.clone(), Arc::new(config.clone()));
                Ok(())
            }
            Err(StorageError::NotFound { .. }) => {
                entries.remove(&config.name);
                Err(ConvoyError::not_found(config.kind.into(), config.name.clone()))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// A live config by name.
    pub async fn get(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Config> {
        self.lookup(kind, name)
            .await?
            .filter(|c| c.is_live())
            .map(|c| (*c).clone())
            .ok_or_else(|| ConvoyError::not_found(kind.into(), name))
    }

    /// A config by name, tombstoned or not.
    pub async fn lookup(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Option<Arc<Config>>> {
        let mut entries = self.index(kind).lock().await;
        self.read_through(&mut entries, kind, name).await
    }

    /// Live configs ordered by name.
    pub async fn list(&self, kind: ConfigKind) -> Vec<Config> {
        let entries = self.index(kind).lock().await;
        let mut live: Vec<Config> = entries
            .values()
            .filter(|c| c.is_live())
            .map(|c| (**c).clone())
            .collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        live
    }

    /// Every config of `kind`, tombstones included.
    pub async fn snapshot(&self, kind: ConfigKind) -> HashMap<String, Arc<Config>> {
        self.index(kind).lock().await.clone()
    }

    /// Push entries storage holds at an older version, then replace the
    /// index with what storage holds.
    ///
    /// An entry missing from storage was removed out of band and is not
    /// written back.
    pub async fn flush(&self, kind: ConfigKind) -> ConvoyResult<FlushStats> {
        let table = Table::configs(kind);
        let mut entries = self.index(kind).lock().await;
        let stored = self.read_all(kind).await?;

        let mut batch = Batch::new();
        for config in entries.values() {
            let stale = stored
                .get(&config.name)
                .is_some_and(|s| s.version < config.version);
            if stale {
                batch.put_record(config.as_ref())?;
            }
        }
        let pushed = batch.len();
        if pushed > 0 {
            self.store.write_batch(&mut batch).await?;
            *entries = self.read_all(kind).await?;
        } else {
            *entries = stored;
        }

        tracing::debug!(table = %table, pushed, pulled = entries.len(), "Config index flushed");
        Ok(FlushStats {
            pushed,
            pulled: entries.len(),
        })
    }
}
