#![allow(dead_code)]

pub mod scripted_probe;

use chrono::Local;
use healthtrail::storage::read_recent;
use healthtrail::PipelineSettings;
use std::path::Path;
use std::time::Duration;

/// Pipeline settings rooted at `dir` with the given intervals.
pub fn settings(dir: &Path, sample: Duration, flush: Duration) -> PipelineSettings {
    PipelineSettings {
        data_dir: dir.to_path_buf(),
        sample_interval: sample,
        flush_interval: flush,
        queue_capacity: 16,
        retention_days: 3,
    }
}

/// Today's values of `metric`, most recent first. Empty when nothing is on
/// disk yet.
pub fn values_today(dir: &Path, metric: &str) -> Vec<f64> {
    read_recent(dir, metric, Local::now().date_naive(), usize::MAX)
        .map(|records| records.iter().map(|r| r.value).collect())
        .unwrap_or_default()
}

/// Polls `condition` every 20ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
