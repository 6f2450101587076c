//! In-memory agent index, heartbeat ingest and operator queries.

use crate::AgentSettings;
use chrono::Utc;
use convoy_core::{
    Agent, AgentConfigStatus, ConfigKind, ConvoyError, ConvoyResult, EntityKind, InstanceId,
    RunningStatus, StorageError, Timestamp,
};
use convoy_storage::{Store, StoreHandle, Table};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// TYPES
// ============================================================================

/// Config statuses an agent reported on its latest heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportedStatuses {
    pub pipeline: Vec<AgentConfigStatus>,
    pub instance: Vec<AgentConfigStatus>,
}

impl ReportedStatuses {
    pub fn get(&self, kind: ConfigKind) -> &[AgentConfigStatus] {
        match kind {
            ConfigKind::Pipeline => &self.pipeline,
            ConfigKind::Instance => &self.instance,
        }
    }

    fn get_mut(&mut self, kind: ConfigKind) -> &mut Vec<AgentConfigStatus> {
        match kind {
            ConfigKind::Pipeline => &mut self.pipeline,
            ConfigKind::Instance => &mut self.instance,
        }
    }

    /// Reported `name -> version` for one kind.
    pub fn versions(&self, kind: ConfigKind) -> HashMap<String, i64> {
        self.get(kind)
            .iter()
            .map(|s| (s.config_name.clone(), s.version))
            .collect()
    }

    pub(crate) fn names(&self, kind: ConfigKind) -> BTreeSet<String> {
        self.get(kind).iter().map(|s| s.config_name.clone()).collect()
    }
}

/// Status row names known to exist in storage, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RowSet {
    pub(crate) pipeline: BTreeSet<String>,
    pub(crate) instance: BTreeSet<String>,
}

impl RowSet {
    pub(crate) fn get(&self, kind: ConfigKind) -> &BTreeSet<String> {
        match kind {
            ConfigKind::Pipeline => &self.pipeline,
            ConfigKind::Instance => &self.instance,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: ConfigKind) -> &mut BTreeSet<String> {
        match kind {
            ConfigKind::Pipeline => &mut self.pipeline,
            ConfigKind::Instance => &mut self.instance,
        }
    }

    pub(crate) fn extend(&mut self, other: RowSet) {
        self.pipeline.extend(other.pipeline);
        self.instance.extend(other.instance);
    }
}

/// Everything one heartbeat carries, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatInput {
    pub instance_id: InstanceId,
    pub agent_type: String,
    pub ip: String,
    pub hostname: String,
    pub version: String,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    /// Seconds between heartbeats the agent promises.
    pub interval: i32,
    pub startup_time: i64,
    pub sequence_num: u64,
    pub statuses: ReportedStatuses,
}

impl HeartbeatInput {
    /// A bare heartbeat for `instance_id` with every other field empty.
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            agent_type: String::new(),
            ip: String::new(),
            hostname: String::new(),
            version: String::new(),
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
            interval: 0,
            startup_time: 0,
            sequence_num: 0,
            statuses: ReportedStatuses::default(),
        }
    }
}

/// An agent together with the config statuses it last reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentView {
    pub agent: Agent,
    pub statuses: ReportedStatuses,
}

pub(crate) struct TrackedAgent {
    pub(crate) agent: Agent,
    pub(crate) statuses: ReportedStatuses,
    pub(crate) persisted: RowSet,
}

impl TrackedAgent {
    fn view(&self) -> AgentView {
        AgentView {
            agent: self.agent.clone(),
            statuses: self.statuses.clone(),
        }
    }

    /// Rows that must go when this agent is evicted.
    pub(crate) fn all_rows(&self) -> RowSet {
        let mut rows = self.persisted.clone();
        for kind in ConfigKind::ALL {
            rows.get_mut(kind).extend(self.statuses.names(kind));
        }
        rows
    }
}

/// A write waiting for the batch writer. `statuses` is `None` when only the
/// agent record changed.
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub(crate) agent: Agent,
    pub(crate) statuses: Option<ReportedStatuses>,
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) agents: HashMap<InstanceId, TrackedAgent>,
    pub(crate) pending: HashMap<InstanceId, PendingWrite>,
    pub(crate) evictions: HashMap<InstanceId, RowSet>,
}

impl RegistryState {
    /// Queue a reaper write-back. Keeps any statuses already queued and
    /// ignores the pending bound.
    pub(crate) fn queue_agent(&mut self, agent: Agent) {
        match self.pending.get_mut(&agent.instance_id) {
            Some(existing) => existing.agent = agent,
            None => {
                self.pending.insert(
                    agent.instance_id.clone(),
                    PendingWrite {
                        agent,
                        statuses: None,
                    },
                );
            }
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Agents known to this server instance.
///
/// The index, the pending-updates map and the eviction queue share one
/// mutex that is never held across an await point. Storage writes happen
/// only in the batch writer.
pub struct AgentRegistry {
    pub(crate) store: StoreHandle,
    pub(crate) settings: AgentSettings,
    pub(crate) state: Mutex<RegistryState>,
    pub(crate) flush_lock: tokio::sync::Mutex<()>,
}

fn decode_agent(row: serde_json::Value) -> ConvoyResult<(Agent, bool)> {
    Agent::from_stored(row).map_err(|e| {
        StorageError::Serialization {
            table: Table::Agent.name().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl AgentRegistry {
    pub fn new(store: StoreHandle, settings: AgentSettings) -> Self {
        Self {
            store,
            settings,
            state: Mutex::new(RegistryState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub(crate) fn lock(&self) -> ConvoyResult<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| ConvoyError::Storage(StorageError::LockPoisoned))
    }

    /// Replace the index with what storage holds. Agents whose stored
    /// running status is unrecognized come back as INIT and are queued for
    /// a repair write.
    pub async fn load(&self) -> ConvoyResult<usize> {
        let mut statuses: HashMap<InstanceId, ReportedStatuses> = HashMap::new();
        for kind in ConfigKind::ALL {
            let rows: Vec<AgentConfigStatus> = self.store.get_all(Table::agent_configs(kind)).await?;
            for row in rows {
                statuses
                    .entry(row.instance_id.clone())
                    .or_default()
                    .get_mut(kind)
                    .push(row);
            }
        }

        let mut agents = HashMap::new();
        let mut repairs = Vec::new();
        for row in self.store.raw().get_all(Table::Agent).await? {
            let (agent, repaired) = match decode_agent(row) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable agent row");
                    continue;
                }
            };
            let reported = statuses.remove(&agent.instance_id).unwrap_or_default();
            let persisted = persisted_rows(&reported);
            if repaired {
                repairs.push(agent.clone());
            }
            agents.insert(
                agent.instance_id.clone(),
                TrackedAgent {
                    agent,
                    statuses: reported,
                    persisted,
                },
            );
        }

        // Status rows without an agent are leftovers of a failed eviction.
        let mut state = self.lock()?;
        for (instance_id, reported) in statuses {
            state.evictions.insert(instance_id, persisted_rows(&reported));
        }
        let repaired = repairs.len();
        for agent in repairs {
            state.queue_agent(agent);
        }
        state.agents = agents;
        let loaded = state.agents.len();
        drop(state);

        tracing::info!(agents = loaded, repaired, "Agent index loaded");
        Ok(loaded)
    }

    /// Pull one agent and its status rows from storage when the index does
    /// not know it yet.
    async fn read_through(&self, instance_id: &InstanceId) -> ConvoyResult<()> {
        {
            let state = self.lock()?;
            if state.agents.contains_key(instance_id) || state.evictions.contains_key(instance_id) {
                return Ok(());
            }
        }

        let Some(row) = self.store.raw().get(Table::Agent, &instance_id.to_hex()).await? else {
            return Ok(());
        };
        let (agent, repaired) = decode_agent(row)?;

        let prefix = AgentConfigStatus::key_prefix(instance_id);
        let mut reported = ReportedStatuses::default();
        for kind in ConfigKind::ALL {
            let rows: Vec<AgentConfigStatus> =
                self.store.get_prefix(Table::agent_configs(kind), &prefix).await?;
            reported.get_mut(kind).extend(rows);
        }

        let mut state = self.lock()?;
        if state.agents.contains_key(instance_id) {
            return Ok(());
        }
        if repaired {
            state.queue_agent(agent.clone());
        }
        let persisted = persisted_rows(&reported);
        state.agents.insert(
            instance_id.clone(),
            TrackedAgent {
                agent,
                statuses: reported,
                persisted,
            },
        );
        tracing::debug!(instance_id = %instance_id, "Agent read through from storage");
        Ok(())
    }

    // ========================================================================
    // HEARTBEAT
    // ========================================================================

    pub async fn heartbeat(&self, input: HeartbeatInput) -> ConvoyResult<Agent> {
        self.heartbeat_at(input, Utc::now()).await
    }

    /// Run one heartbeat through the state machine as of `now` and queue
    /// the result for persistence.
    ///
    /// A rejected heartbeat leaves every piece of state untouched.
    #[tracing::instrument(skip_all, fields(instance_id = %input.instance_id, seq = input.sequence_num))]
    pub async fn heartbeat_at(&self, input: HeartbeatInput, now: Timestamp) -> ConvoyResult<Agent> {
        if input.instance_id.is_empty() {
            return Err(ConvoyError::invalid("instance_id must not be empty"));
        }
        self.read_through(&input.instance_id).await?;

        let online_after = self.settings.online_after_success;
        let mut state = self.lock()?;
        let queued = state.pending.contains_key(&input.instance_id);
        if !queued && state.pending.len() >= self.settings.max_pending {
            tracing::warn!(pending = state.pending.len(), "Pending agent updates full");
            return Err(ConvoyError::ServerBusy {
                reason: format!("{} agent updates waiting to be written", state.pending.len()),
            });
        }

        let mut agent = match state.agents.get(&input.instance_id) {
            None => {
                tracing::info!(agent_type = %input.agent_type, "Agent registered");
                Agent::new(input.instance_id.clone(), now)
            }
            Some(tracked) => {
                let stored = &tracked.agent;
                let expected = stored.sequence_num.wrapping_add(1);
                if input.sequence_num != 0 && input.sequence_num != expected {
                    return Err(ConvoyError::SequenceOutOfOrder {
                        instance_id: input.instance_id.to_hex(),
                        expected,
                        got: input.sequence_num,
                    });
                }
                let mut agent = stored.clone();
                let restarted = input.sequence_num == 0 || input.startup_time > stored.startup_time;
                if restarted || stored.running_status == RunningStatus::Offline {
                    tracing::info!(
                        restarted,
                        previous = %stored.running_status.as_str(),
                        "Agent liveness reset"
                    );
                    agent.success_beat_count = 0;
                    agent.fail_beat_count = 0;
                    agent.running_status = RunningStatus::Init;
                }
                agent
            }
        };

        agent.startup_time = agent.startup_time.max(input.startup_time);
        agent.agent_type = input.agent_type;
        agent.ip = input.ip;
        agent.hostname = input.hostname;
        agent.version = input.version;
        agent.attributes = input.attributes;
        agent.tags = input.tags;
        agent.interval = input.interval;

        agent.success_beat_count = agent.success_beat_count.saturating_add(1).min(online_after);
        agent.fail_beat_count = 0;
        if agent.success_beat_count >= online_after && agent.running_status != RunningStatus::Online {
            agent.running_status = RunningStatus::Online;
            tracing::info!("Agent online");
        }

        agent.latest_heartbeat = now;
        agent.beat_cycle_time = now;
        agent.sequence_num = input.sequence_num;

        let statuses = input.statuses;
        state.pending.insert(
            input.instance_id.clone(),
            PendingWrite {
                agent: agent.clone(),
                statuses: Some(statuses.clone()),
            },
        );
        match state.agents.get_mut(&input.instance_id) {
            Some(tracked) => {
                tracked.agent = agent.clone();
                tracked.statuses = statuses;
            }
            None => {
                state.agents.insert(
                    input.instance_id,
                    TrackedAgent {
                        agent: agent.clone(),
                        statuses,
                        persisted: RowSet::default(),
                    },
                );
            }
        }
        Ok(agent)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn get(&self, instance_id: &InstanceId) -> ConvoyResult<AgentView> {
        self.read_through(instance_id).await?;
        self.lock()?
            .agents
            .get(instance_id)
            .map(TrackedAgent::view)
            .ok_or_else(|| ConvoyError::not_found(EntityKind::Agent, instance_id.to_hex()))
    }

    /// Every indexed agent, ordered by instance id.
    pub fn list(&self) -> ConvoyResult<Vec<AgentView>> {
        let state = self.lock()?;
        let mut views: Vec<AgentView> = state.agents.values().map(TrackedAgent::view).collect();
        views.sort_by(|a, b| a.agent.instance_id.cmp(&b.agent.instance_id));
        Ok(views)
    }

    pub fn len(&self) -> ConvoyResult<usize> {
        Ok(self.lock()?.agents.len())
    }

    pub fn is_empty(&self) -> ConvoyResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Distinct agents waiting for the batch writer.
    pub fn pending_len(&self) -> ConvoyResult<usize> {
        Ok(self.lock()?.pending.len())
    }
}

fn persisted_rows(reported: &ReportedStatuses) -> RowSet {
    RowSet {
        pipeline: reported.names(ConfigKind::Pipeline),
        instance: reported.names(ConfigKind::Instance),
    }
}
