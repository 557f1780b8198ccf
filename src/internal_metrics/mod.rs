//! # Internal Metrics Module
//!
//! Counters describing the pipeline itself: how many samples were enqueued or
//! dropped, how many records reached disk, how many files the retention sweep
//! removed.
//!
//! ## Components:
//!
//! - **`PipelineStats`**: atomic counters owned by a running pipeline. Always
//!   available, independent of any installed recorder; tests and callers read
//!   them through `StatsSnapshot`.
//!
//! - **`describe`**: registers descriptions for the counters emitted through
//!   the `metrics` facade alongside `PipelineStats`.
//!
//! - **`LoggingRecorder`**: (Defined in `logging_recorder.rs`) a `metrics`
//!   recorder that periodically logs every counter and gauge.

pub mod logging_recorder;

pub use logging_recorder::LoggingRecorder;

use metrics::Unit;
use std::sync::atomic::{AtomicU64, Ordering};

pub const SAMPLES_ENQUEUED: &str = "samples_enqueued_total";
pub const SAMPLES_DROPPED: &str = "samples_dropped_total";
pub const ACQUISITION_FAILURES: &str = "acquisition_failures_total";
pub const RECORDS_WRITTEN: &str = "records_written_total";
pub const RECORDS_DROPPED: &str = "records_dropped_total";
pub const FILES_REMOVED: &str = "retention_files_removed_total";
pub const FLUSH_DURATION: &str = "flush_duration_seconds";
pub const QUEUE_DEPTH: &str = "sample_queue_depth";

/// Registers descriptions for every metric the pipeline emits.
pub fn describe() {
    metrics::describe_counter!(
        SAMPLES_ENQUEUED,
        Unit::Count,
        "Samples accepted by the hand-off queue."
    );
    metrics::describe_counter!(
        SAMPLES_DROPPED,
        Unit::Count,
        "Samples discarded because the hand-off queue was full."
    );
    metrics::describe_counter!(
        ACQUISITION_FAILURES,
        Unit::Count,
        "Sampling ticks discarded because a metric source failed."
    );
    metrics::describe_counter!(RECORDS_WRITTEN, Unit::Count, "Records appended to metric files.");
    metrics::describe_counter!(
        RECORDS_DROPPED,
        Unit::Count,
        "Records lost to writer creation or write failures."
    );
    metrics::describe_counter!(FILES_REMOVED, Unit::Count, "Files deleted by the retention sweep.");
    metrics::describe_histogram!(
        FLUSH_DURATION,
        Unit::Seconds,
        "Time taken to write, sync and sweep one batch."
    );
    metrics::describe_gauge!(
        QUEUE_DEPTH,
        Unit::Count,
        "Samples accumulated by the batcher awaiting the next flush."
    );
}

/// Live counters of a running pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    samples_enqueued: AtomicU64,
    samples_dropped: AtomicU64,
    acquisition_failures: AtomicU64,
    records_written: AtomicU64,
    records_dropped: AtomicU64,
    files_removed: AtomicU64,
    flushes: AtomicU64,
}

/// A point-in-time copy of `PipelineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub samples_enqueued: u64,
    pub samples_dropped: u64,
    pub acquisition_failures: u64,
    pub records_written: u64,
    pub records_dropped: u64,
    pub files_removed: u64,
    pub flushes: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.samples_enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(SAMPLES_ENQUEUED).increment(1);
    }

    pub fn record_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(SAMPLES_DROPPED).increment(1);
    }

    pub fn record_acquisition_failure(&self) {
        self.acquisition_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ACQUISITION_FAILURES).increment(1);
    }

    pub fn record_flush(&self, written: u64, dropped: u64, files_removed: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_written.fetch_add(written, Ordering::Relaxed);
        self.records_dropped.fetch_add(dropped, Ordering::Relaxed);
        self.files_removed.fetch_add(files_removed, Ordering::Relaxed);
        metrics::counter!(RECORDS_WRITTEN).increment(written);
        metrics::counter!(RECORDS_DROPPED).increment(dropped);
        metrics::counter!(FILES_REMOVED).increment(files_removed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_enqueued: self.samples_enqueued.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}
