//! Batched persistence of agent records.
//!
//! Heartbeats only touch memory. The writer drains the pending map on a
//! tick and turns it into one atomic batch: queued evictions first, then
//! the latest record of every updated agent with its status rows. A failed
//! batch puts its items back unless a newer update arrived meanwhile.

use crate::registry::{PendingWrite, ReportedStatuses, RowSet};
use crate::AgentRegistry;
use convoy_core::{Agent, AgentConfigStatus, ConfigKind, ConvoyResult, InstanceId, StorageResult};
use convoy_storage::{Batch, Table};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// What one flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub agents: usize,
    pub evictions: usize,
}

struct WorkItem {
    agent: Agent,
    statuses: Option<ReportedStatuses>,
    stale: RowSet,
}

fn build_batch(evictions: &HashMap<InstanceId, RowSet>, work: &[WorkItem]) -> StorageResult<Batch> {
    let mut batch = Batch::new();
    for (instance_id, rows) in evictions {
        batch.delete(Table::Agent, instance_id.to_hex());
        for kind in ConfigKind::ALL {
            for name in rows.get(kind) {
                batch.delete(
                    Table::agent_configs(kind),
                    AgentConfigStatus::compose_key(instance_id, name),
                );
            }
        }
    }
    for item in work {
        batch.put_record(&item.agent)?;
        if let Some(statuses) = &item.statuses {
            for kind in ConfigKind::ALL {
                for status in statuses.get(kind) {
                    batch.put_record(status)?;
                }
                for name in item.stale.get(kind) {
                    batch.delete(
                        Table::agent_configs(kind),
                        AgentConfigStatus::compose_key(&item.agent.instance_id, name),
                    );
                }
            }
        }
    }
    Ok(batch)
}

impl AgentRegistry {
    /// Write every queued update and eviction in one batch.
    ///
    /// Flushes are serialized, so batches reach storage in the order their
    /// items were taken.
    pub async fn flush_pending(&self) -> ConvoyResult<WriteStats> {
        let _serial = self.flush_lock.lock().await;

        let (evictions, work) = {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            let evictions = std::mem::take(&mut state.evictions);
            let mut work = Vec::with_capacity(state.pending.len());
            for (instance_id, pending) in std::mem::take(&mut state.pending) {
                let mut stale = RowSet::default();
                if let (Some(current), Some(tracked)) = (&pending.statuses, state.agents.get(&instance_id)) {
                    for kind in ConfigKind::ALL {
                        let reported = current.names(kind);
                        stale
                            .get_mut(kind)
                            .extend(tracked.persisted.get(kind).difference(&reported).cloned());
                    }
                }
                work.push(WorkItem {
                    agent: pending.agent,
                    statuses: pending.statuses,
                    stale,
                });
            }
            (evictions, work)
        };

        if evictions.is_empty() && work.is_empty() {
            return Ok(WriteStats::default());
        }

        let result = match build_batch(&evictions, &work) {
            Ok(mut batch) => self.store.write_batch(&mut batch).await,
            Err(e) => Err(e),
        };

        let mut guard = self.lock()?;
        let state = &mut *guard;
        match result {
            Ok(()) => {
                for item in &work {
                    if let (Some(statuses), Some(tracked)) =
                        (&item.statuses, state.agents.get_mut(&item.agent.instance_id))
                    {
                        for kind in ConfigKind::ALL {
                            *tracked.persisted.get_mut(kind) = statuses.names(kind);
                        }
                    }
                }
                let stats = WriteStats {
                    agents: work.len(),
                    evictions: evictions.len(),
                };
                tracing::debug!(agents = stats.agents, evictions = stats.evictions, "Agent batch written");
                Ok(stats)
            }
            Err(e) => {
                let mut requeued = 0usize;
                for (instance_id, rows) in evictions {
                    state.evictions.entry(instance_id).or_default().extend(rows);
                }
                for item in work {
                    let instance_id = item.agent.instance_id.clone();
                    if !state.agents.contains_key(&instance_id) {
                        continue;
                    }
                    match state.pending.get_mut(&instance_id) {
                        Some(newer) => {
                            if newer.statuses.is_none() {
                                newer.statuses = item.statuses;
                            }
                        }
                        None => {
                            state.pending.insert(
                                instance_id,
                                PendingWrite {
                                    agent: item.agent,
                                    statuses: item.statuses,
                                },
                            );
                            requeued += 1;
                        }
                    }
                }
                tracing::warn!(error = %e, requeued, "Agent batch failed, will retry");
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct WriterMetrics {
    /// Non-empty batches attempted.
    pub batches: AtomicU64,
    pub agents_written: AtomicU64,
    pub evictions_written: AtomicU64,
    pub failures: AtomicU64,
}

impl WriterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WriterSnapshot {
        WriterSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            agents_written: self.agents_written.load(Ordering::Relaxed),
            evictions_written: self.evictions_written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSnapshot {
    pub batches: u64,
    pub agents_written: u64,
    pub evictions_written: u64,
    pub failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Drain pending agent updates every flush interval. On shutdown the queue
/// is drained one last time.
pub async fn agent_batch_writer_task(
    registry: Arc<AgentRegistry>,
    metrics: Arc<WriterMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let period = registry.settings().flush_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_ms = period.as_millis() as u64, "Agent batch writer started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                write_once(&registry, &metrics).await;
            }
        }
    }

    write_once(&registry, &metrics).await;
    let snapshot = metrics.snapshot();
    tracing::info!(
        batches = snapshot.batches,
        agents = snapshot.agents_written,
        evictions = snapshot.evictions_written,
        failures = snapshot.failures,
        "Agent batch writer stopped"
    );
}

async fn write_once(registry: &AgentRegistry, metrics: &WriterMetrics) {
    match registry.flush_pending().await {
        Ok(stats) if stats == WriteStats::default() => {}
        Ok(stats) => {
            metrics.batches.fetch_add(1, Ordering::Relaxed);
            metrics.agents_written.fetch_add(stats.agents as u64, Ordering::Relaxed);
            metrics.evictions_written.fetch_add(stats.evictions as u64, Ordering::Relaxed);
        }
        Err(e) => {
            metrics.batches.fetch_add(1, Ordering::Relaxed);
            metrics.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Agent batch write failed");
        }
    }
}
