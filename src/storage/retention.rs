//! Deletes persisted files that fall outside the retention window.

use crate::storage::{day_stamp, embedded_day, FILE_EXTENSION};
use chrono::{DateTime, Days, Local};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files that were deleted.
    pub removed: Vec<PathBuf>,
    /// Files that were due for deletion but could not be removed. They are
    /// picked up again by the next sweep.
    pub failed: Vec<PathBuf>,
}

/// Removes every file whose embedded day is `retention_days` or more days
/// before today.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    data_dir: PathBuf,
    retention_days: u64,
}

impl RetentionSweeper {
    pub fn new(data_dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            retention_days,
        }
    }

    /// The newest day stamp that is deleted when sweeping at `now`, or
    /// `None` when the window reaches past the earliest representable day and
    /// nothing can be old enough.
    pub fn cutoff(&self, now: DateTime<Local>) -> Option<String> {
        now.date_naive()
            .checked_sub_days(Days::new(self.retention_days))
            .map(day_stamp)
    }

    /// Scans the data directory and deletes expired files.
    ///
    /// Day stamps are compared as strings, which is sound because they are
    /// fixed-width and zero-padded. Files without a `_YYYYMMDD.csv` suffix and
    /// subdirectories are left alone. A missing data directory means there is
    /// nothing to sweep. Failures are logged and never abort the sweep.
    pub fn sweep(&self, now: DateTime<Local>) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(cutoff) = self.cutoff(now) else {
            return report;
        };

        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(
                    dir = %self.data_dir.display(),
                    error = %e,
                    "Failed to list data directory for retention sweep"
                );
                return report;
            }
        };

        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.ends_with(FILE_EXTENSION) {
                continue;
            }
            let Some(day) = embedded_day(name) else {
                continue;
            };
            if day > cutoff.as_str() {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed expired file");
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove expired file, will retry next sweep"
                    );
                    report.failed.push(path);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metric_file_path;
    use chrono::TimeZone;

    fn touch(path: &std::path::Path) {
        fs::write(path, "timestamp,time,name,value,unit,source\n").unwrap();
    }

    #[test]
    fn test_cutoff_is_inclusive_of_retention_days() {
        let sweeper = RetentionSweeper::new("data", 3);
        let now = Local.with_ymd_and_hms(2025, 3, 2, 10, 0, 0).unwrap();
        assert_eq!(sweeper.cutoff(now).as_deref(), Some("20250227"));
    }

    #[test]
    fn test_unbounded_retention_never_touches_current_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let current = metric_file_path(dir.path(), "cpu_clock", now.date_naive());
        touch(&current);

        let sweeper = RetentionSweeper::new(dir.path(), u64::MAX);
        assert_eq!(sweeper.cutoff(now), None);

        let report = sweeper.sweep(now);
        assert_eq!(report, SweepReport::default());
        assert!(current.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_removal_is_reported_and_retried() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let expired = metric_file_path(dir.path(), "cpu_clock", now.date_naive() - Days::new(5));
        touch(&expired);

        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
        // Root ignores directory permissions, so the failure cannot be forced.
        if fs::write(dir.path().join("writable"), "").is_ok() {
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let sweeper = RetentionSweeper::new(dir.path(), 3);
        let report = sweeper.sweep(now);
        assert!(report.removed.is_empty());
        assert_eq!(report.failed, vec![expired.clone()]);
        assert!(expired.exists());

        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        let report = sweeper.sweep(now);
        assert_eq!(report.removed, vec![expired.clone()]);
        assert!(report.failed.is_empty());
        assert!(!expired.exists());
    }

    #[test]
    fn test_sweep_removes_files_at_or_before_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let today = now.date_naive();
        let aged = |days: u64| {
            let path = metric_file_path(dir.path(), "cpu_clock", today - Days::new(days));
            touch(&path);
            path
        };
        let four_days = aged(4);
        let three_days = aged(3);
        let two_days = aged(2);
        let current = aged(0);

        let report = RetentionSweeper::new(dir.path(), 3).sweep(now);

        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!four_days.exists());
        assert!(!three_days.exists());
        assert!(two_days.exists());
        assert!(current.exists());
    }

    #[test]
    fn test_sweep_ignores_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("notes.csv"));
        touch(&dir.path().join("cpu_clock_20000101.txt"));
        fs::create_dir(dir.path().join("archive_20000101.csv")).unwrap();

        let report = RetentionSweeper::new(dir.path(), 3).sweep(Local::now());

        assert!(report.removed.is_empty());
        assert!(dir.path().join("notes.csv").exists());
        assert!(dir.path().join("cpu_clock_20000101.txt").exists());
        assert!(dir.path().join("archive_20000101.csv").is_dir());
    }

    #[test]
    fn test_missing_directory_is_nothing_to_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let report = RetentionSweeper::new(dir.path().join("absent"), 3).sweep(Local::now());
        assert_eq!(report, SweepReport::default());
    }
}
