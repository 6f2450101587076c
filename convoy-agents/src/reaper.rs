//! Liveness accounting for agents that stopped beating.
//!
//! Every reaper tick walks the index. An agent silent for longer than the
//! eviction window is dropped along with its status rows. Otherwise each
//! whole heartbeat interval elapsed since its current cycle began counts as
//! one failed beat, and enough failed beats take it OFFLINE.

use crate::AgentRegistry;
use chrono::{Duration as ChronoDuration, Utc};
use convoy_core::{ConvoyResult, InstanceId, RunningStatus, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// What one reaper pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub scanned: usize,
    /// Agents charged at least one missed interval.
    pub missed: usize,
    /// Agents that became OFFLINE during this pass.
    pub offline: usize,
    pub evicted: usize,
}

impl AgentRegistry {
    pub fn reap(&self) -> ConvoyResult<ReapStats> {
        self.reap_at(Utc::now())
    }

    /// Charge missed intervals and evict silent agents as of `now`.
    ///
    /// Only memory changes here. Write-backs join the pending map without
    /// regard to its bound and evictions are queued for the next batch.
    pub fn reap_at(&self, now: Timestamp) -> ConvoyResult<ReapStats> {
        let evict_after = self.settings.evict_after_chrono();
        let offline_after = self.settings.offline_after_fail;

        let mut guard = self.lock()?;
        let state = &mut *guard;
        let mut stats = ReapStats {
            scanned: state.agents.len(),
            ..ReapStats::default()
        };

        let mut evicted: Vec<InstanceId> = Vec::new();
        let mut changed = Vec::new();
        for (instance_id, tracked) in state.agents.iter_mut() {
            let agent = &mut tracked.agent;
            if now - agent.latest_heartbeat >= evict_after {
                evicted.push(instance_id.clone());
                continue;
            }
            if agent.interval <= 0 {
                continue;
            }

            let interval_ms = i64::from(agent.interval) * 1000;
            let gap_ms = (now - agent.beat_cycle_time).num_milliseconds();
            if gap_ms <= interval_ms {
                continue;
            }
            let missed = gap_ms / interval_ms;
            let missed_beats = u32::try_from(missed).unwrap_or(u32::MAX);
            agent.fail_beat_count = agent
                .fail_beat_count
                .saturating_add(missed_beats)
                .min(offline_after);
            agent.success_beat_count = 0;
            agent.beat_cycle_time += ChronoDuration::milliseconds(missed.saturating_mul(interval_ms));
            stats.missed += 1;

            if agent.fail_beat_count >= offline_after && agent.running_status != RunningStatus::Offline {
                agent.running_status = RunningStatus::Offline;
                stats.offline += 1;
                tracing::info!(instance_id = %instance_id, fail = agent.fail_beat_count, "Agent offline");
            }
            changed.push(agent.clone());
        }

        for agent in changed {
            state.queue_agent(agent);
        }
        for instance_id in evicted {
            state.pending.remove(&instance_id);
            if let Some(tracked) = state.agents.remove(&instance_id) {
                let rows = tracked.all_rows();
                state.evictions.entry(instance_id.clone()).or_default().extend(rows);
                tracing::info!(
                    instance_id = %instance_id,
                    last_heartbeat = %tracked.agent.latest_heartbeat,
                    "Agent evicted"
                );
            }
            stats.evicted += 1;
        }

        Ok(stats)
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct ReaperMetrics {
    pub cycles: AtomicU64,
    pub missed: AtomicU64,
    pub marked_offline: AtomicU64,
    pub evicted: AtomicU64,
    pub failures: AtomicU64,
}

impl ReaperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReaperSnapshot {
        ReaperSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
            marked_offline: self.marked_offline.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSnapshot {
    pub cycles: u64,
    pub missed: u64,
    pub marked_offline: u64,
    pub evicted: u64,
    pub failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Reap every reap interval until shutdown. Evictions are flushed in the
/// same tick so storage forgets the agent right away.
pub async fn agent_reaper_task(
    registry: Arc<AgentRegistry>,
    metrics: Arc<ReaperMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let period = registry.settings().reap_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = period.as_millis() as u64,
        evict_after_secs = registry.settings().evict_after.as_secs(),
        "Agent reaper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                reap_once(&registry, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        offline = snapshot.marked_offline,
        evicted = snapshot.evicted,
        "Agent reaper stopped"
    );
}

async fn reap_once(registry: &AgentRegistry, metrics: &ReaperMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    let stats = match registry.reap() {
        Ok(stats) => stats,
        Err(e) => {
            metrics.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Agent reap failed");
            return;
        }
    };
    metrics.missed.fetch_add(stats.missed as u64, Ordering::Relaxed);
    metrics.marked_offline.fetch_add(stats.offline as u64, Ordering::Relaxed);
    metrics.evicted.fetch_add(stats.evicted as u64, Ordering::Relaxed);

    if stats.evicted > 0 {
        if let Err(e) = registry.flush_pending().await {
            metrics.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, evicted = stats.evicted, "Eviction write failed, will retry");
        }
    }
    if stats.missed > 0 || stats.evicted > 0 {
        tracing::debug!(
            scanned = stats.scanned,
            missed = stats.missed,
            offline = stats.offline,
            evicted = stats.evicted,
            "Agent reap cycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{beat, settings, status};
    use crate::AgentSettings;
    use convoy_core::{Agent, AgentConfigStatus, ConfigKind};
    use convoy_test_utils::fixtures::{at, at_millis, flaky_store, memory_store};
    use convoy_test_utils::{Store, StoreHandle, Table};
    use std::time::Duration;

    async fn online_agent(registry: &AgentRegistry) {
        for seq in 0..3u64 {
            registry.heartbeat_at(beat("a1", seq), at(seq as i64)).await.unwrap();
        }
    }

    async fn view(registry: &AgentRegistry) -> Agent {
        registry.get(&InstanceId::from("a1")).await.unwrap().agent
    }

    #[tokio::test]
    async fn test_missed_intervals_take_agent_offline() {
        let (_, handle) = memory_store();
        let registry = AgentRegistry::new(handle, settings());
        online_agent(&registry).await;
        assert_eq!(view(&registry).await.running_status, RunningStatus::Online);

        let base = at(2).timestamp_millis();
        let stats = registry.reap_at(at_millis(base + 3_500)).unwrap();
        assert_eq!(stats.missed, 1);
        let agent = view(&registry).await;
        assert_eq!(agent.fail_beat_count, 2);
        assert_eq!(agent.success_beat_count, 0);
        assert_eq!(agent.running_status, RunningStatus::Offline);
        assert_eq!(stats.offline, 1);
    }

    #[tokio::test]
    async fn test_one_missed_interval_per_tick() {
        let (_, handle) = memory_store();
        let registry = AgentRegistry::new(handle, settings());
        online_agent(&registry).await;
        let base = at(2).timestamp_millis();

        registry.reap_at(at_millis(base + 1_500)).unwrap();
        let agent = view(&registry).await;
        assert_eq!(agent.fail_beat_count, 1);
        assert_eq!(agent.running_status, RunningStatus::Online);
        assert_eq!(agent.beat_cycle_time, at(3));

        // Inside the same cycle nothing more is charged.
        let stats = registry.reap_at(at_millis(base + 1_900)).unwrap();
        assert_eq!(stats.missed, 0);

        registry.reap_at(at_millis(base + 2_500)).unwrap();
        assert_eq!(view(&registry).await.running_status, RunningStatus::Offline);
    }

    #[tokio::test]
    async fn test_heartbeat_after_offline_resets_to_init() {
        let (_, handle) = memory_store();
        let registry = AgentRegistry::new(handle, settings());
        online_agent(&registry).await;
        registry.reap_at(at(10)).unwrap();
        assert_eq!(view(&registry).await.running_status, RunningStatus::Offline);

        let agent = registry.heartbeat_at(beat("a1", 3), at(11)).await.unwrap();
        assert_eq!(agent.running_status, RunningStatus::Init);
        assert_eq!(agent.success_beat_count, 1);
        assert_eq!(agent.fail_beat_count, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_is_never_charged() {
        let (_, handle) = memory_store();
        let registry = AgentRegistry::new(handle, settings());
        let mut input = beat("a1", 0);
        input.interval = 0;
        registry.heartbeat_at(input, at(0)).await.unwrap();
        let stats = registry.reap_at(at(600)).unwrap();
        assert_eq!(stats.missed, 0);
        assert_eq!(view(&registry).await.fail_beat_count, 0);
    }

    #[tokio::test]
    async fn test_write_back_bypasses_pending_bound() {
        let (_, handle) = memory_store();
        let registry = AgentRegistry::new(
            handle,
            AgentSettings {
                max_pending: 1,
                ..settings()
            },
        );
        registry.heartbeat_at(beat("a1", 0), at(0)).await.unwrap();
        registry.flush_pending().await.unwrap();
        registry.heartbeat_at(beat("a2", 0), at(0)).await.unwrap();

        registry.reap_at(at(5)).unwrap();
        assert_eq!(registry.pending_len().unwrap(), 2);
    }

    async fn evictable(handle: StoreHandle) -> AgentRegistry {
        let registry = AgentRegistry::new(
            handle,
            AgentSettings {
                evict_after: Duration::from_secs(3600),
                ..settings()
            },
        );
        let mut input = beat("a1", 0);
        input.statuses.pipeline = vec![status("a1", ConfigKind::Pipeline, "nginx", 1)];
        input.statuses.instance = vec![status("a1", ConfigKind::Instance, "cpu", 1)];
        registry.heartbeat_at(input, at(0)).await.unwrap();
        registry.flush_pending().await.unwrap();
        registry
    }

    #[tokio::test]
    async fn test_silent_agent_is_evicted_with_rows() {
        let (store, handle) = memory_store();
        let registry = evictable(handle).await;
        assert_eq!(store.count(Table::Agent), 1);

        let stats = registry.reap_at(at(2 * 3600)).unwrap();
        assert_eq!(stats.evicted, 1);
        assert!(registry.is_empty().unwrap());

        let written = registry.flush_pending().await.unwrap();
        assert_eq!(written.evictions, 1);
        assert_eq!(store.count(Table::Agent), 0);
        assert_eq!(store.count(Table::AgentPipelineConfig), 0);
        assert_eq!(store.count(Table::AgentInstanceConfig), 0);
    }

    #[tokio::test]
    async fn test_failed_eviction_is_retried() {
        let (store, handle) = flaky_store();
        let registry = evictable(handle).await;
        registry.reap_at(at(2 * 3600)).unwrap();

        store.fail_next_batches(1);
        assert!(registry.flush_pending().await.is_err());
        assert_eq!(store.memory().count(Table::Agent), 1);

        registry.flush_pending().await.unwrap();
        assert_eq!(store.memory().count(Table::Agent), 0);
        assert_eq!(store.memory().count(Table::AgentPipelineConfig), 0);
    }

    #[tokio::test]
    async fn test_returning_agent_survives_queued_eviction() {
        let (store, handle) = memory_store();
        let registry = evictable(handle).await;
        registry.reap_at(at(2 * 3600)).unwrap();

        let mut input = beat("a1", 7);
        input.statuses.pipeline = vec![status("a1", ConfigKind::Pipeline, "nginx", 2)];
        let agent = registry.heartbeat_at(input, at(2 * 3600 + 1)).await.unwrap();
        assert_eq!(agent.success_beat_count, 1);

        registry.flush_pending().await.unwrap();
        assert_eq!(store.count(Table::Agent), 1);
        assert_eq!(store.count(Table::AgentPipelineConfig), 1);
        assert_eq!(store.count(Table::AgentInstanceConfig), 0);
        let key = AgentConfigStatus::compose_key(&InstanceId::from("a1"), "nginx");
        let row = store.get(Table::AgentPipelineConfig, &key).await.unwrap().unwrap();
        assert_eq!(row["version"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_flushes_evictions() {
        let (store, handle) = memory_store();
        let registry = AgentRegistry::new(
            handle,
            AgentSettings {
                evict_after: Duration::from_secs(3600),
                ..settings()
            },
        );
        let mut input = beat("a1", 0);
        input.interval = 0;
        let long_ago = Utc::now() - ChronoDuration::hours(2);
        registry.heartbeat_at(input, long_ago).await.unwrap();
        registry.flush_pending().await.unwrap();
        let registry = Arc::new(registry);

        let metrics = Arc::new(ReaperMetrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(agent_reaper_task(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(metrics.snapshot().evicted, 1);
        assert_eq!(store.count(Table::Agent), 0);
    }
}
