//! Read side of the persisted files.
//!
//! Reads are full scans of one daily file. That is cheap enough because a
//! daily file is bounded by the sampling rate, not by the retention window.
//! Unlike the write path, every failure here is returned to the caller: a
//! report that silently skipped broken data would mislead whoever reads it.

use crate::core::{metric, Record};
use crate::storage::metric_file_path;
use chrono::{Local, NaiveDate};
use std::fmt::Write as _;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("no data recorded for {metric} ({path})")]
    Missing { metric: String, path: PathBuf },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid metric name {0:?}")]
    InvalidMetric(String),
}

/// Returns up to `count` records of `metric` on `day`, most recent first.
pub fn read_recent(
    data_dir: &Path,
    metric: &str,
    day: NaiveDate,
    count: usize,
) -> Result<Vec<Record>, QueryError> {
    if metric.is_empty() || metric.contains(['/', '\\', '.']) {
        return Err(QueryError::InvalidMetric(metric.to_string()));
    }

    let path = metric_file_path(data_dir, metric, day);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(QueryError::Missing {
                metric: metric.to_string(),
                path,
            })
        }
        Err(source) => return Err(QueryError::Open { path, source }),
    };

    let records = csv::Reader::from_reader(file)
        .deserialize::<Record>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| QueryError::Read {
            path: path.clone(),
            source,
        })?;

    Ok(records.into_iter().rev().take(count).collect())
}

/// Renders one record as a line of a health report.
pub fn format_record(record: &Record) -> String {
    format!(
        "Time: {}, Value: {}, Unit: {}",
        record.timestamp_iso,
        record.formatted_value(),
        record.unit
    )
}

/// Answers "how has the host behaved over the last N minutes" from today's
/// files.
#[derive(Debug, Clone)]
pub struct HealthQuery {
    data_dir: PathBuf,
    sample_interval: Duration,
}

impl HealthQuery {
    /// `sample_interval` must match the interval the data was sampled at; it
    /// turns a lookback in minutes into a row count.
    pub fn new(data_dir: impl Into<PathBuf>, sample_interval: Duration) -> Self {
        Self {
            data_dir: data_dir.into(),
            sample_interval,
        }
    }

    pub fn samples_per_minute(&self) -> usize {
        let interval_ms = self.sample_interval.as_millis().max(1);
        (60_000 / interval_ms).max(1) as usize
    }

    /// Records of `metric` covering the last `minutes`, most recent first.
    pub fn recent(&self, metric: &str, minutes: usize) -> Result<Vec<Record>, QueryError> {
        read_recent(
            &self.data_dir,
            metric,
            Local::now().date_naive(),
            minutes.saturating_mul(self.samples_per_minute()),
        )
    }

    /// Plain-text report for one metric, or for the whole recognized set when
    /// `metric` is `None`.
    ///
    /// For the whole set, metrics that have no file today (such as GPU
    /// metrics on a host without a GPU) are left out. A named metric without
    /// data is an error.
    pub fn report(&self, metric: Option<&str>, minutes: usize) -> Result<String, QueryError> {
        let mut out = String::new();
        match metric {
            Some(name) => self.write_section(&mut out, name, minutes)?,
            None => {
                for (name, _) in metric::RECOGNIZED {
                    match self.write_section(&mut out, name, minutes) {
                        Ok(()) | Err(QueryError::Missing { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(out)
    }

    fn write_section(
        &self,
        out: &mut String,
        name: &str,
        minutes: usize,
    ) -> Result<(), QueryError> {
        let records = self.recent(name, minutes)?;
        let unit = records.first().map(|r| r.unit.as_str()).unwrap_or("");
        let _ = writeln!(
            out,
            "{name} over the last {minutes} min \
             ({unit}, one reading every {}s, most recent first):",
            self.sample_interval.as_secs_f64()
        );
        for record in &records {
            let _ = writeln!(out, "{}", format_record(record));
        }
        out.push('\n');
        Ok(())
    }
}
