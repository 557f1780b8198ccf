//! The draining consumer side of the pipeline.

use crate::core::{Record, Sample};
use crate::internal_metrics::{PipelineStats, FLUSH_DURATION, QUEUE_DEPTH};
use crate::storage::{RetentionSweeper, WriterRegistry};
use crate::task_manager::shutdown_signalled;
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval_at;
use tracing::{debug, error, info, instrument, warn};

/// Accumulates samples and persists them on a fixed flush interval.
///
/// On shutdown the batcher keeps receiving until the sampler has closed the
/// queue, then performs one final flush, so nothing accepted by the queue is
/// lost on a graceful stop.
pub struct Batcher {
    queue: mpsc::Receiver<Sample>,
    flush_interval: Duration,
    registry: Arc<WriterRegistry>,
    sweeper: Arc<RetentionSweeper>,
    stats: Arc<PipelineStats>,
}

impl Batcher {
    pub fn new(
        queue: mpsc::Receiver<Sample>,
        flush_interval: Duration,
        registry: Arc<WriterRegistry>,
        sweeper: Arc<RetentionSweeper>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            queue,
            flush_interval,
            registry,
            sweeper,
            stats,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(
            tokio::time::Instant::now() + self.flush_interval,
            self.flush_interval,
        );
        let mut batch: Vec<Sample> = Vec::new();
        info!(interval = ?self.flush_interval, "Batcher started.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown_rx) => {
                    info!("Batcher received shutdown signal, draining queue.");
                    while let Some(sample) = self.queue.recv().await {
                        batch.push(sample);
                    }
                    break;
                }
                received = self.queue.recv() => match received {
                    Some(sample) => {
                        batch.push(sample);
                        metrics::gauge!(QUEUE_DEPTH).set(batch.len() as f64);
                    }
                    None => {
                        info!("Sample queue closed.");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(std::mem::take(&mut batch)).await;
                    }
                }
            }
        }

        if !batch.is_empty() {
            info!("Flushing {} pending samples", batch.len());
            self.flush(batch).await;
        }
        info!("Batcher finished.");
    }

    /// Persists a batch off the async runtime and waits for it to complete.
    async fn flush(&self, batch: Vec<Sample>) {
        let registry = self.registry.clone();
        let sweeper = self.sweeper.clone();
        let stats = self.stats.clone();
        let result = tokio::task::spawn_blocking(move || {
            flush_batch(&registry, &sweeper, &stats, &batch)
        })
        .await;
        if let Err(e) = result {
            error!(error = %e, "Flush task failed");
        }
        metrics::gauge!(QUEUE_DEPTH).set(0.0);
    }
}

/// Writes every sample's records, syncs all writers, then sweeps expired
/// files. An empty batch touches nothing.
#[instrument(skip_all, fields(samples = batch.len()))]
pub fn flush_batch(
    registry: &WriterRegistry,
    sweeper: &RetentionSweeper,
    stats: &PipelineStats,
    batch: &[Sample],
) {
    if batch.is_empty() {
        return;
    }
    let started = Instant::now();

    let records: Vec<Record> = batch.iter().flat_map(Sample::records).collect();
    let summary = registry.append_batch(&records);
    for e in registry.flush_all() {
        warn!(error = %e, "Failed to flush writer");
    }
    let report = sweeper.sweep(Local::now());

    stats.record_flush(summary.written, summary.dropped, report.removed.len() as u64);
    metrics::histogram!(FLUSH_DURATION).record(started.elapsed().as_secs_f64());
    debug!(
        written = summary.written,
        dropped = summary.dropped,
        removed = report.removed.len(),
        "Batch flushed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CpuSnapshot, DiskSnapshot, MemSnapshot};
    use crate::storage::{metric_file_path, read_recent};
    use chrono::Days;

    fn sample(clock: f64) -> Sample {
        Sample {
            timestamp: Local::now(),
            cpu: CpuSnapshot {
                frequency_mhz: clock,
                ..Default::default()
            },
            memory: MemSnapshot::default(),
            disk: DiskSnapshot::default(),
            gpus: Vec::new(),
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        registry: Arc<WriterRegistry>,
        sweeper: Arc<RetentionSweeper>,
        stats: Arc<PipelineStats>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                registry: Arc::new(WriterRegistry::new(dir.path())),
                sweeper: Arc::new(RetentionSweeper::new(dir.path(), 3)),
                stats: Arc::new(PipelineStats::new()),
                dir,
            }
        }

        fn batcher(&self, rx: mpsc::Receiver<Sample>, interval: Duration) -> Batcher {
            Batcher::new(
                rx,
                interval,
                self.registry.clone(),
                self.sweeper.clone(),
                self.stats.clone(),
            )
        }

        fn cpu_clocks(&self) -> Vec<f64> {
            read_recent(self.dir.path(), "cpu_clock", Local::now().date_naive(), usize::MAX)
                .map(|records| records.iter().map(|r| r.value).collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_empty_flush_is_a_no_op() {
        let fixture = Fixture::new();
        let stale = metric_file_path(
            fixture.dir.path(),
            "cpu_clock",
            Local::now().date_naive() - Days::new(10),
        );
        std::fs::write(&stale, "").unwrap();

        flush_batch(&fixture.registry, &fixture.sweeper, &fixture.stats, &[]);

        assert_eq!(fixture.registry.open_writers(), 0);
        assert!(stale.exists(), "an empty flush must not sweep");
        assert_eq!(fixture.stats.snapshot().flushes, 0);
    }

    #[test]
    fn test_flush_writes_records_and_sweeps() {
        let fixture = Fixture::new();
        let stale = metric_file_path(
            fixture.dir.path(),
            "cpu_clock",
            Local::now().date_naive() - Days::new(10),
        );
        std::fs::write(&stale, "").unwrap();

        flush_batch(
            &fixture.registry,
            &fixture.sweeper,
            &fixture.stats,
            &[sample(100.0), sample(200.0)],
        );

        assert_eq!(fixture.cpu_clocks(), vec![200.0, 100.0]);
        assert!(!stale.exists());
        let snapshot = fixture.stats.snapshot();
        assert_eq!(snapshot.records_written, 8);
        assert_eq!(snapshot.files_removed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_samples_exactly_once() {
        let fixture = Fixture::new();
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // A flush interval long enough that only the final flush can run.
        let handle = tokio::spawn(fixture.batcher(rx, Duration::from_secs(3600)).run(shutdown_rx));

        tx.send(sample(1.0)).await.unwrap();
        tx.send(sample(2.0)).await.unwrap();
        shutdown_tx.send(true).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(fixture.cpu_clocks(), vec![2.0, 1.0]);
        assert_eq!(fixture.stats.snapshot().flushes, 1);
    }

    #[tokio::test]
    async fn test_samples_are_flushed_on_the_interval() {
        let fixture = Fixture::new();
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(fixture.batcher(rx, Duration::from_millis(50)).run(shutdown_rx));

        tx.send(sample(7.0)).await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while fixture.cpu_clocks().is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(fixture.cpu_clocks(), vec![7.0]);

        shutdown_tx.send(true).unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(fixture.stats.snapshot().flushes, 1);
    }
}
