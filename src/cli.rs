//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the TOML file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Samples host health metrics and keeps a rolling on-disk history of them.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the per-metric daily files.
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Number of days a file is kept before the sweep deletes it.
    #[arg(long, value_name = "DAYS")]
    pub retention_days: Option<u64>,

    /// Seconds between two samples.
    #[arg(long, value_name = "SECONDS")]
    pub sample_interval: Option<u64>,

    /// Periodically log the pipeline's internal counters.
    #[arg(long)]
    pub log_metrics: bool,

    /// Print the readings of the last MINUTES minutes and exit.
    #[arg(long, value_name = "MINUTES")]
    pub report: Option<usize>,

    /// Restrict the report to a single metric.
    #[arg(long, value_name = "NAME", requires = "report")]
    pub metric: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        let mut storage = Dict::new();
        if let Some(dir) = &self.data_dir {
            storage.insert(
                "data_dir".into(),
                Value::from(dir.to_string_lossy().into_owned()),
            );
        }
        if let Some(days) = self.retention_days {
            storage.insert("retention_days".into(), Value::from(days));
        }
        if !storage.is_empty() {
            dict.insert("storage".into(), Value::from(storage));
        }

        if let Some(seconds) = self.sample_interval {
            let mut sampling = Dict::new();
            sampling.insert("interval_seconds".into(), Value::from(seconds));
            dict.insert("sampling".into(), Value::from(sampling));
        }

        // Only an explicit flag overrides the file; absence leaves it alone.
        if self.log_metrics {
            let mut metrics = Dict::new();
            metrics.insert("log_metrics".into(), Value::from(true));
            dict.insert("metrics".into(), Value::from(metrics));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
