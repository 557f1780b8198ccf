//! Flat-file persistence for records.
//!
//! Every metric gets one CSV file per local calendar day, named
//! `<metric>_<YYYYMMDD>.csv` inside the data directory. The fixed-width day
//! suffix lets the retention sweep compare days as plain strings.

pub mod query;
pub mod retention;
pub mod writer;

pub use query::{read_recent, HealthQuery, QueryError};
pub use retention::{RetentionSweeper, SweepReport};
pub use writer::{DailyWriter, WriterRegistry};

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `strftime` pattern of the day embedded in file names.
pub const DAY_FORMAT: &str = "%Y%m%d";

/// Extension of every persisted file.
pub const FILE_EXTENSION: &str = "csv";

/// Renders `day` the way it appears in file names.
pub fn day_stamp(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Path of the file holding `metric` for `day`.
pub fn metric_file_path(data_dir: &Path, metric: &str, day: NaiveDate) -> PathBuf {
    data_dir.join(format!("{metric}_{}.{FILE_EXTENSION}", day_stamp(day)))
}

/// Extracts the `YYYYMMDD` suffix of a persisted file name, if it has one.
pub fn embedded_day(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
    let (_, day) = stem.rsplit_once('_')?;
    (day.len() == 8 && day.bytes().all(|b| b.is_ascii_digit())).then_some(day)
}

/// Errors raised while writing records.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record timestamp {0} is out of range")]
    Timestamp(i64),
}
