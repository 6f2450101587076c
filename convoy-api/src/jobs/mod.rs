//! Background Jobs for the Convoy server
//!
//! Three long-lived tasks run next to the HTTP server:
//!
//! - agent batch writer: persists queued heartbeats every flush interval
//! - agent reaper: counts missed intervals, marks agents OFFLINE, evicts
//!   agents silent for too long
//! - config flusher: reconciles config and group indices with storage
//!
//! All three share one shutdown signal. On shutdown the writer drains its
//! queue once and the flusher runs one last round.

use crate::config::ServerConfig;
use crate::services::ControlPlane;
use convoy_agents::{agent_batch_writer_task, agent_reaper_task, ReaperMetrics, WriterMetrics};
use convoy_configs::{config_flush_task, FlusherMetrics};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters shared between the jobs and the readiness probe.
#[derive(Debug, Clone, Default)]
pub struct JobMetrics {
    pub writer: Arc<WriterMetrics>,
    pub reaper: Arc<ReaperMetrics>,
    pub flusher: Arc<FlusherMetrics>,
}

/// Handles of the running jobs.
pub struct BackgroundJobs {
    shutdown_tx: watch::Sender<bool>,
    reaper: JoinHandle<()>,
    writer: JoinHandle<()>,
    flusher: JoinHandle<()>,
}

impl BackgroundJobs {
    pub fn spawn(plane: &ControlPlane, config: &ServerConfig, metrics: &JobMetrics) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reaper = tokio::spawn(agent_reaper_task(
            Arc::clone(plane.agents()),
            Arc::clone(&metrics.reaper),
            shutdown_rx.clone(),
        ));
        let writer = tokio::spawn(agent_batch_writer_task(
            Arc::clone(plane.agents()),
            Arc::clone(&metrics.writer),
            shutdown_rx.clone(),
        ));
        let flusher = tokio::spawn(config_flush_task(
            Arc::clone(plane.catalog()),
            config.config_flush_interval(),
            Arc::clone(&metrics.flusher),
            shutdown_rx,
        ));

        tracing::info!("Background jobs started");
        Self {
            shutdown_tx,
            reaper,
            writer,
            flusher,
        }
    }

    /// Signal every job and wait for the reaper, then the writer's final
    /// drain, then the flusher's final round.
    pub async fn shutdown(self) {
        // Send only fails once every receiver is gone, i.e. all jobs exited.
        let _ = self.shutdown_tx.send(true);
        for (name, handle) in [
            ("agent reaper", self.reaper),
            ("agent batch writer", self.writer),
            ("config flusher", self.flusher),
        ] {
            if let Err(e) = handle.await {
                tracing::error!(job = name, error = %e, "Background job ended abnormally");
            }
        }
        tracing::info!("Background jobs stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::{wire, InstanceId};
    use convoy_test_utils::fixtures::memory_store;
    use convoy_test_utils::{Store, Table};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_pending_heartbeats() {
        let (memory, store) = memory_store();
        let config = ServerConfig {
            agent_flush_interval_ms: 60_000,
            ..ServerConfig::default()
        };
        let plane = ControlPlane::bootstrap(store, &config).await.unwrap();
        let metrics = JobMetrics::default();
        let jobs = BackgroundJobs::spawn(&plane, &config, &metrics);
        tokio::time::sleep(Duration::from_millis(10)).await;

        plane
            .heartbeat(wire::HeartbeatRequest {
                instance_id: b"a1".to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plane.agents().pending_len().unwrap(), 1);

        jobs.shutdown().await;
        assert_eq!(plane.agents().pending_len().unwrap(), 0);
        let key = InstanceId::from("a1").to_hex();
        assert!(memory.get(Table::Agent, &key).await.unwrap().is_some());
        assert!(metrics.flusher.snapshot().rounds >= 1);
    }
}
