//! HealthTrail - host health telemetry that lives on disk.
//!
//! This library samples CPU, memory, disk and GPU readings on a fixed cadence,
//! batches them and appends them to per-metric, per-day CSV files, pruning
//! files that fall outside the retention window. A read side answers "how has
//! the host behaved over the last N minutes" straight from those files.

pub mod batcher;
pub mod cli;
pub mod config;
pub mod core;
pub mod internal_metrics;
pub mod pipeline;
pub mod sampler;
pub mod sources;
pub mod storage;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
pub use pipeline::{Pipeline, PipelineHandle, PipelineSettings};
