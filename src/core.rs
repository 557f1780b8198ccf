//! Core domain types and service traits for HealthTrail
//!
//! This module defines the snapshot types produced by metric sources, the
//! `Sample` assembled once per sampling tick, the flattened `Record` that is
//! persisted, and the `HostProbe` trait the sampler gathers from.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// The literal written into the `source` column of every record.
pub const RECORD_SOURCE: &str = "system";

/// Column names of every persisted file, in order.
pub const CSV_HEADER: [&str; 6] = ["timestamp", "time", "name", "value", "unit", "source"];

/// A CPU reading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuSnapshot {
    /// Marketing name of the processor, if known.
    pub brand: String,
    /// Current clock frequency in MHz.
    pub frequency_mhz: f64,
    /// Global utilization across all cores (0-100).
    pub usage_percent: f64,
}

/// A physical memory reading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemSnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// A reading for one GPU.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GpuSnapshot {
    /// Index as reported by the driver.
    pub index: u32,
    pub name: String,
    /// Utilization (0-100).
    pub utilization_percent: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub core_clock_mhz: u64,
    pub memory_clock_mhz: u64,
    pub temperature_c: u64,
    pub power_draw_w: f64,
}

/// One point-in-time reading of the whole host.
///
/// Produced once per sampling tick and moved, unchanged, from the sampler to
/// the batcher through the bounded queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub cpu: CpuSnapshot,
    pub memory: MemSnapshot,
    pub disk: DiskSnapshot,
    pub gpus: Vec<GpuSnapshot>,
}

impl Sample {
    /// Flattens the sample into one record per scalar metric.
    ///
    /// The order is fixed: CPU, memory, disk, then every GPU in acquisition
    /// order. The first GPU uses the plain `gpu_*` names, later ones are
    /// prefixed with their position (`gpu1_util`, `gpu2_util`, ...).
    pub fn records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(4 + self.gpus.len() * 6);
        let mut push = |name: &str, value: f64, unit: &str| {
            records.push(Record::new(self.timestamp, name, value, unit));
        };

        push(metric::CPU_CLOCK, self.cpu.frequency_mhz, "MHz");
        push(metric::CPU_USAGE, self.cpu.usage_percent, "%");
        push(metric::MEM_USED, self.memory.used_bytes as f64, "bytes");
        push(metric::DISK_USED, self.disk.used_bytes as f64, "bytes");

        for (position, gpu) in self.gpus.iter().enumerate() {
            let prefix = if position == 0 {
                "gpu".to_string()
            } else {
                format!("gpu{position}")
            };
            push(&format!("{prefix}_util"), gpu.utilization_percent, "%");
            push(&format!("{prefix}_mem_used"), gpu.memory_used_mb as f64, "MB");
            push(&format!("{prefix}_mem_clock"), gpu.memory_clock_mhz as f64, "MHz");
            push(&format!("{prefix}_core_clock"), gpu.core_clock_mhz as f64, "MHz");
            push(&format!("{prefix}_temp"), gpu.temperature_c as f64, "°C");
            push(&format!("{prefix}_power"), gpu.power_draw_w, "W");
        }
        records
    }
}

/// Well-known metric names and their units.
pub mod metric {
    pub const CPU_CLOCK: &str = "cpu_clock";
    pub const CPU_USAGE: &str = "cpu_usage";
    pub const MEM_USED: &str = "mem_used";
    pub const DISK_USED: &str = "disk_used";
    pub const GPU_UTIL: &str = "gpu_util";
    pub const GPU_MEM_USED: &str = "gpu_mem_used";
    pub const GPU_MEM_CLOCK: &str = "gpu_mem_clock";
    pub const GPU_CORE_CLOCK: &str = "gpu_core_clock";
    pub const GPU_TEMP: &str = "gpu_temp";
    pub const GPU_POWER: &str = "gpu_power";

    /// The fixed set answered by a full health report, with units.
    pub const RECOGNIZED: [(&str, &str); 10] = [
        (CPU_CLOCK, "MHz"),
        (CPU_USAGE, "%"),
        (MEM_USED, "bytes"),
        (DISK_USED, "bytes"),
        (GPU_UTIL, "%"),
        (GPU_MEM_USED, "MB"),
        (GPU_MEM_CLOCK, "MHz"),
        (GPU_CORE_CLOCK, "MHz"),
        (GPU_TEMP, "°C"),
        (GPU_POWER, "W"),
    ];

    /// Returns true if `name` is one of the recognized metric names.
    pub fn is_recognized(name: &str) -> bool {
        RECOGNIZED.iter().any(|(known, _)| *known == name)
    }
}

/// The flattened persistence unit: one row in a metric's daily file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Epoch seconds.
    #[serde(rename = "timestamp")]
    pub timestamp_unix: i64,
    /// RFC 3339 rendering of the same instant, local offset.
    #[serde(rename = "time")]
    pub timestamp_iso: String,
    #[serde(rename = "name")]
    pub metric_name: String,
    #[serde(serialize_with = "two_decimals")]
    pub value: f64,
    pub unit: String,
    pub source: String,
}

impl Record {
    pub fn new(timestamp: DateTime<Local>, metric_name: &str, value: f64, unit: &str) -> Self {
        Self {
            timestamp_unix: timestamp.timestamp(),
            timestamp_iso: timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            metric_name: metric_name.to_string(),
            value,
            unit: unit.to_string(),
            source: RECORD_SOURCE.to_string(),
        }
    }

    /// The local calendar day this record belongs to, or `None` if the
    /// timestamp is outside chrono's representable range.
    pub fn day(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp(self.timestamp_unix, 0)
            .map(|utc| utc.with_timezone(&Local).date_naive())
    }

    /// The value as written to disk: fixed point, two decimals.
    pub fn formatted_value(&self) -> String {
        format!("{:.2}", self.value)
    }
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:.2}"))
}

// =============================================================================
// Service Traits
// =============================================================================

/// Failure to read one subsystem of the host.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("{subsystem} probe failed: {message}")]
    Probe {
        subsystem: &'static str,
        message: String,
    },

    #[error("failed to run {command}: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {command} output: {source}")]
    Parse {
        command: &'static str,
        #[source]
        source: csv::Error,
    },
}

impl AcquisitionError {
    pub fn probe(subsystem: &'static str, message: impl Into<String>) -> Self {
        Self::Probe {
            subsystem,
            message: message.into(),
        }
    }
}

/// Reads structured snapshots of the host, one subsystem per call.
///
/// The sampler invokes each method once per tick, in declaration order.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn cpu(&self) -> Result<CpuSnapshot, AcquisitionError>;

    async fn memory(&self) -> Result<MemSnapshot, AcquisitionError>;

    async fn disk(&self) -> Result<DiskSnapshot, AcquisitionError>;

    /// Returns every GPU the host exposes; an empty list is not an error.
    async fn gpus(&self) -> Result<Vec<GpuSnapshot>, AcquisitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_with_gpus(gpus: Vec<GpuSnapshot>) -> Sample {
        Sample {
            timestamp: Local.with_ymd_and_hms(2025, 3, 9, 14, 30, 5).unwrap(),
            cpu: CpuSnapshot {
                brand: "test".to_string(),
                frequency_mhz: 3200.0,
                usage_percent: 12.5,
            },
            memory: MemSnapshot {
                total_bytes: 16_000,
                used_bytes: 8_000,
            },
            disk: DiskSnapshot {
                mount_point: "/".to_string(),
                total_bytes: 500,
                used_bytes: 250,
            },
            gpus,
        }
    }

    #[test]
    fn test_records_without_gpu_follow_fixed_order() {
        let records = sample_with_gpus(vec![]).records();
        let names: Vec<_> = records.iter().map(|r| r.metric_name.as_str()).collect();
        assert_eq!(names, vec!["cpu_clock", "cpu_usage", "mem_used", "disk_used"]);
        assert!(records.iter().all(|r| r.source == "system"));
    }

    #[test]
    fn test_each_gpu_gets_its_own_metric_names() {
        let gpu = GpuSnapshot {
            utilization_percent: 40.0,
            temperature_c: 61,
            ..Default::default()
        };
        let records = sample_with_gpus(vec![gpu.clone(), gpu]).records();
        assert_eq!(records.len(), 4 + 12);
        assert_eq!(records[4].metric_name, "gpu_util");
        assert_eq!(records[8].metric_name, "gpu_temp");
        assert_eq!(records[8].unit, "°C");
        assert_eq!(records[10].metric_name, "gpu1_util");
        assert_eq!(records[15].metric_name, "gpu1_power");
    }

    #[test]
    fn test_record_carries_unix_and_iso_time_of_the_sample() {
        let sample = sample_with_gpus(vec![]);
        let record = &sample.records()[0];
        assert_eq!(record.timestamp_unix, sample.timestamp.timestamp());
        assert_eq!(
            record.timestamp_iso,
            sample.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false)
        );
        assert_eq!(record.day(), Some(sample.timestamp.date_naive()));
    }

    #[test]
    fn test_formatted_value_has_two_decimals() {
        let record = Record::new(Local::now(), metric::CPU_CLOCK, 1500.0, "MHz");
        assert_eq!(record.formatted_value(), "1500.00");
    }
}
