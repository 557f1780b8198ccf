//! Append-only CSV writers, one live writer per metric.

use crate::core::{Record, CSV_HEADER};
use crate::storage::{metric_file_path, StorageError};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An open, buffered CSV file for one metric on one day.
#[derive(Debug)]
pub struct DailyWriter {
    path: PathBuf,
    day: NaiveDate,
    writer: csv::Writer<File>,
}

impl DailyWriter {
    /// Opens (or creates) the file for `metric` on `day` in append mode.
    ///
    /// The data directory is created if it does not exist yet. The header row
    /// is written only when the file is empty, so reopening today's file after
    /// a restart keeps a single header.
    pub fn open(data_dir: &Path, metric: &str, day: NaiveDate) -> Result<Self, StorageError> {
        let path = metric_file_path(data_dir, metric, day);
        let create_err = |source| StorageError::Create {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(data_dir).map_err(create_err)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(create_err)?;
        let is_empty = file.metadata().map_err(create_err)?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer
                .write_record(CSV_HEADER)
                .map_err(|source| StorageError::Write {
                    path: path.clone(),
                    source,
                })?;
        }

        Ok(Self { path, day, writer })
    }

    /// Buffers one record as a row.
    pub fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        self.writer
            .serialize(record)
            .map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// Pushes buffered rows to the file and syncs its data to disk.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        let flush_err = |source| StorageError::Flush {
            path: self.path.clone(),
            source,
        };
        self.writer.flush().map_err(flush_err)?;
        self.writer.get_ref().sync_data().map_err(flush_err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }
}

/// Outcome of appending a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub written: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    writers: HashMap<String, DailyWriter>,
    current_day: Option<NaiveDate>,
}

/// Owns the live `DailyWriter` of every metric.
///
/// Writers are created lazily on a metric's first record. The target day is
/// derived from each record's own timestamp: when a metric's records move to a
/// new day, its writer is flushed and replaced by one for the new file. All
/// state sits behind a single lock, so the registry can be shared between the
/// flush path and any reader that needs a consistent view.
#[derive(Debug)]
pub struct WriterRegistry {
    data_dir: PathBuf,
    state: Mutex<RegistryState>,
}

impl WriterRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Appends one record to its metric's file for the record's day.
    pub fn append(&self, record: &Record) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.append_locked(&mut state, record)
    }

    /// Appends records in order under one lock acquisition.
    ///
    /// A metric whose writer cannot be opened has its remaining records in
    /// this batch dropped without further attempts; the next batch tries to
    /// open it again. A failed write is logged and the batch continues.
    pub fn append_batch<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> AppendSummary {
        let mut summary = AppendSummary::default();
        let mut unavailable: HashSet<String> = HashSet::new();
        let mut state = self.state.lock();

        for record in records {
            if unavailable.contains(&record.metric_name) {
                summary.dropped += 1;
                continue;
            }
            match self.append_locked(&mut state, record) {
                Ok(()) => summary.written += 1,
                Err(e @ StorageError::Create { .. }) => {
                    warn!(
                        metric = %record.metric_name,
                        error = %e,
                        "Failed to create writer, dropping metric for this batch"
                    );
                    unavailable.insert(record.metric_name.clone());
                    summary.dropped += 1;
                }
                Err(e) => {
                    warn!(metric = %record.metric_name, error = %e, "Failed to append record");
                    summary.dropped += 1;
                }
            }
        }
        summary
    }

    fn append_locked(
        &self,
        state: &mut RegistryState,
        record: &Record,
    ) -> Result<(), StorageError> {
        let day = record
            .day()
            .ok_or(StorageError::Timestamp(record.timestamp_unix))?;
        state.current_day = Some(day);

        let writer = match state.writers.entry(record.metric_name.clone()) {
            Entry::Occupied(entry) if entry.get().day() == day => entry.into_mut(),
            Entry::Occupied(mut entry) => {
                let fresh = DailyWriter::open(&self.data_dir, &record.metric_name, day)?;
                let mut previous = entry.insert(fresh);
                info!(
                    metric = %record.metric_name,
                    from = %previous.day(),
                    to = %day,
                    "Day rolled over, switching writer"
                );
                if let Err(e) = previous.flush() {
                    warn!(error = %e, "Failed to flush writer for previous day");
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                let writer = DailyWriter::open(&self.data_dir, &record.metric_name, day)?;
                debug!(
                    metric = %record.metric_name,
                    path = %writer.path().display(),
                    "Opened writer"
                );
                entry.insert(writer)
            }
        };
        writer.append(record)
    }

    /// Forces every open writer's buffered rows to disk. Returns the errors of
    /// the writers that failed; the others are flushed regardless.
    pub fn flush_all(&self) -> Vec<StorageError> {
        let mut state = self.state.lock();
        state
            .writers
            .values_mut()
            .filter_map(|writer| writer.flush().err())
            .collect()
    }

    /// Flushes and releases every file handle.
    pub fn close_all(&self) -> Vec<StorageError> {
        let mut state = self.state.lock();
        let count = state.writers.len();
        let errors: Vec<_> = state
            .writers
            .drain()
            .filter_map(|(_, mut writer)| writer.flush().err())
            .collect();
        debug!(count, "Closed all writers");
        errors
    }

    /// Number of writers currently open.
    pub fn open_writers(&self) -> usize {
        self.state.lock().writers.len()
    }

    /// Day of the most recently appended record.
    pub fn current_day(&self) -> Option<NaiveDate> {
        self.state.lock().current_day
    }
}
