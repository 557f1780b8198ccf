//! The periodic producer side of the pipeline.

use crate::core::{AcquisitionError, HostProbe, Sample};
use crate::internal_metrics::PipelineStats;
use crate::task_manager::shutdown_signalled;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Gathers one `Sample` per tick and offers it to the bounded queue.
///
/// Offers never wait: when the queue is full the new sample is dropped, so a
/// slow consumer can never stall sampling.
pub struct Sampler {
    probe: Arc<dyn HostProbe>,
    interval: Duration,
    queue: mpsc::Sender<Sample>,
    stats: Arc<PipelineStats>,
}

impl Sampler {
    pub fn new(
        probe: Arc<dyn HostProbe>,
        interval: Duration,
        queue: mpsc::Sender<Sample>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            probe,
            interval,
            queue,
            stats,
        }
    }

    /// Reads every subsystem once, in order. Any failure discards the whole
    /// tick: a sample is either complete or not produced at all.
    pub async fn gather(probe: &dyn HostProbe) -> Result<Sample, AcquisitionError> {
        let timestamp = Local::now();
        Ok(Sample {
            timestamp,
            cpu: probe.cpu().await?,
            memory: probe.memory().await?,
            disk: probe.disk().await?,
            gpus: probe.gpus().await?,
        })
    }

    /// Runs until shutdown is signalled. Returning drops the queue sender,
    /// which tells the batcher no more samples will arrive.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, "Sampler started.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown_rx) => {
                    info!("Sampler received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let sample = match Self::gather(self.probe.as_ref()).await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(error = %e, "Metrics collection failed, discarding tick");
                    self.stats.record_acquisition_failure();
                    continue;
                }
            };

            match self.queue.try_send(sample) {
                Ok(()) => {
                    debug!("Sample enqueued");
                    self.stats.record_enqueued();
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Sample queue full, discarding sample");
                    self.stats.record_dropped();
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Sample queue closed, sampler stopping");
                    break;
                }
            }
        }
        info!("Sampler finished.");
    }
}
