//! Configuration management for HealthTrail
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer compiled defaults, an optional TOML file, `HEALTHTRAIL_`
//! environment variables and command-line flags, in that order.

use crate::cli::Cli;
use crate::pipeline::PipelineSettings;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application. `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Where and for how long readings are kept.
    pub storage: StorageConfig,
    /// How readings are taken.
    pub sampling: SamplingConfig,
    /// How often accumulated readings reach disk.
    pub batching: BatchingConfig,
    /// Internal pipeline metrics.
    pub metrics: MetricsConfig,
}

/// Configuration for the on-disk history.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory holding the per-metric daily files.
    pub data_dir: PathBuf,
    /// Files dated this many days ago or earlier are deleted.
    pub retention_days: u64,
}

/// Configuration for the sampler.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplingConfig {
    pub interval_seconds: u64,
    /// Capacity of the hand-off queue; samples beyond it are dropped.
    pub queue_capacity: usize,
    /// Mount point of the filesystem whose usage is recorded.
    pub disk_mount: String,
    /// Query `nvidia-smi` for GPU readings.
    pub gpu_enabled: bool,
}

/// Configuration for the batcher.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BatchingConfig {
    pub flush_interval_seconds: u64,
}

/// Configuration for the internal metrics system.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Log metrics to the console periodically.
    pub log_metrics: bool,
    /// The interval in seconds for logging aggregated metrics.
    pub log_aggregation_seconds: u64,
}

impl Config {
    /// Loads the application configuration, layering defaults, the TOML file
    /// named by `cli` (if any), environment variables and CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            // e.g. HEALTHTRAIL_STORAGE__RETENTION_DAYS=7
            .merge(Env::prefixed("HEALTHTRAIL_").split("__"))
            .merge(cli)
            .extract()?;
        Ok(config)
    }

    /// Converts the loaded values into validated pipeline settings.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        if self.sampling.interval_seconds == 0 {
            bail!("sampling.interval_seconds must be greater than zero");
        }
        if self.batching.flush_interval_seconds == 0 {
            bail!("batching.flush_interval_seconds must be greater than zero");
        }
        if self.sampling.queue_capacity == 0 {
            bail!("sampling.queue_capacity must be greater than zero");
        }
        // A zero-day window would sweep the files being written today.
        if self.storage.retention_days == 0 {
            bail!("storage.retention_days must be greater than zero");
        }

        Ok(PipelineSettings {
            data_dir: self.storage.data_dir.clone(),
            sample_interval: Duration::from_secs(self.sampling.interval_seconds),
            flush_interval: Duration::from_secs(self.batching.flush_interval_seconds),
            queue_capacity: self.sampling.queue_capacity,
            retention_days: self.storage.retention_days,
        })
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            storage: StorageConfig {
                data_dir: PathBuf::from("data"),
                retention_days: 3,
            },
            sampling: SamplingConfig {
                interval_seconds: 5,
                queue_capacity: 1024,
                disk_mount: "/".to_string(),
                gpu_enabled: true,
            },
            batching: BatchingConfig {
                flush_interval_seconds: 5,
            },
            metrics: MetricsConfig {
                log_metrics: false,
                log_aggregation_seconds: 60,
            },
        }
    }
}
