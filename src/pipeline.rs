//! Wires the sampler and batcher together under one cancellation scope.

use crate::batcher::Batcher;
use crate::core::HostProbe;
use crate::internal_metrics::{self, PipelineStats, StatsSnapshot};
use crate::sampler::Sampler;
use crate::storage::{RetentionSweeper, WriterRegistry};
use crate::task_manager::{shutdown_signalled, TaskManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument, warn};

/// Runtime parameters of a pipeline, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub data_dir: PathBuf,
    pub sample_interval: Duration,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub retention_days: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sample_interval: Duration::from_secs(5),
            flush_interval: Duration::from_secs(5),
            queue_capacity: 1024,
            retention_days: 3,
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Starts sampling and persisting in the background.
    ///
    /// The pipeline stops on its own when `parent_shutdown` flips to `true`,
    /// but callers should still call [`PipelineHandle::stop`] to wait for the
    /// final flush and release file handles.
    #[instrument(skip_all, fields(data_dir = %settings.data_dir.display()))]
    pub fn start(
        settings: PipelineSettings,
        probe: Arc<dyn HostProbe>,
        parent_shutdown: watch::Receiver<bool>,
    ) -> PipelineHandle {
        internal_metrics::describe();

        if let Err(e) = std::fs::create_dir_all(&settings.data_dir) {
            // Writers retry the creation on every flush.
            warn!(error = %e, "Failed to create data directory");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let task_manager = TaskManager::new(shutdown_rx);

        let registry = Arc::new(WriterRegistry::new(&settings.data_dir));
        let sweeper = Arc::new(RetentionSweeper::new(
            &settings.data_dir,
            settings.retention_days,
        ));
        let stats = Arc::new(PipelineStats::new());
        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity);

        // Relay the parent's signal into this pipeline's own scope.
        {
            let shutdown_tx = shutdown_tx.clone();
            let mut parent = parent_shutdown;
            let mut local = task_manager.shutdown_rx();
            task_manager.spawn("ShutdownRelay", async move {
                // A dropped parent sender is not a shutdown request.
                tokio::select! {
                    true = async { parent.wait_for(|stop| *stop).await.is_ok() } => {
                        info!("Parent shutdown observed, stopping pipeline.");
                        shutdown_tx.send_replace(true);
                    }
                    _ = shutdown_signalled(&mut local) => {}
                }
            });
        }

        let sampler = Sampler::new(probe, settings.sample_interval, queue_tx, stats.clone());
        task_manager.spawn("Sampler", sampler.run(task_manager.shutdown_rx()));

        let batcher = Batcher::new(
            queue_rx,
            settings.flush_interval,
            registry.clone(),
            sweeper,
            stats.clone(),
        );
        task_manager.spawn("Batcher", batcher.run(task_manager.shutdown_rx()));

        info!(
            sample_interval = ?settings.sample_interval,
            flush_interval = ?settings.flush_interval,
            queue_capacity = settings.queue_capacity,
            retention_days = settings.retention_days,
            "Pipeline started."
        );

        PipelineHandle {
            shutdown_tx,
            task_manager,
            registry,
            stats,
        }
    }
}

/// Owns a running pipeline. Dropping the handle without calling
/// [`stop`](Self::stop) cancels the tasks but does not wait for the final
/// flush.
pub struct PipelineHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    task_manager: TaskManager,
    registry: Arc<WriterRegistry>,
    stats: Arc<PipelineStats>,
}

impl PipelineHandle {
    /// Signals cancellation, waits for the sampler to stop and the batcher to
    /// finish its final flush, then closes every writer.
    pub async fn stop(self) {
        info!("Stopping pipeline...");
        self.shutdown_tx.send_replace(true);

        let panicked = self.task_manager.join_all().await;
        if !panicked.is_empty() {
            error!(tasks = ?panicked, "Pipeline tasks panicked during shutdown");
        }

        for e in self.registry.close_all() {
            warn!(error = %e, "Failed to close writer");
        }
        info!(stats = ?self.stats.snapshot(), "Pipeline stopped.");
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn data_dir(&self) -> &Path {
        self.registry.data_dir()
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
