//! Periodic reconciliation of the config indices with storage.
//!
//! Each round pushes in-memory entries storage holds at an older version,
//! then pulls the full tables. Pulling is what lets a secondary instance see
//! operator writes and deletes made on the primary.

use crate::Catalog;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct FlusherMetrics {
    pub rounds: AtomicU64,
    pub pushed: AtomicU64,
    pub failures: AtomicU64,
}

impl FlusherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FlusherSnapshot {
        FlusherSnapshot {
            rounds: self.rounds.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlusherSnapshot {
    pub rounds: u64,
    pub pushed: u64,
    pub failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Flush the catalog every `period` until shutdown, then once more.
pub async fn config_flush_task(
    catalog: Arc<Catalog>,
    period: Duration,
    metrics: Arc<FlusherMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; indices were just loaded.
    ticker.tick().await;

    tracing::info!(interval_ms = period.as_millis() as u64, "Config flusher started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                flush_once(&catalog, &metrics).await;
            }
        }
    }

    flush_once(&catalog, &metrics).await;
    let snapshot = metrics.snapshot();
    tracing::info!(
        rounds = snapshot.rounds,
        pushed = snapshot.pushed,
        failures = snapshot.failures,
        "Config flusher stopped"
    );
}

async fn flush_once(catalog: &Catalog, metrics: &FlusherMetrics) {
    metrics.rounds.fetch_add(1, Ordering::Relaxed);
    match catalog.flush().await {
        Ok(stats) => {
            metrics.pushed.fetch_add(stats.pushed as u64, Ordering::Relaxed);
            if stats.pushed > 0 {
                tracing::info!(pushed = stats.pushed, pulled = stats.pulled, "Config indices reconciled");
            } else {
                tracing::trace!(pulled = stats.pulled, "Config indices refreshed");
            }
        }
        Err(e) => {
            metrics.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Config flush failed");
        }
    }
}
