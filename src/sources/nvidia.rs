//! GPU readings from the `nvidia-smi` utility.

use crate::core::{AcquisitionError, GpuSnapshot};
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::{debug, trace};

const NVIDIA_SMI: &str = "nvidia-smi";

const QUERY_FIELDS: &str = "index,name,utilization.gpu,memory.used,memory.total,\
clocks.current.graphics,clocks.current.memory,temperature.gpu,power.draw";

/// Number of columns requested through `QUERY_FIELDS`.
const FIELD_COUNT: usize = 9;

/// Queries NVIDIA GPUs by shelling out to `nvidia-smi`.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    program: String,
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self::new()
    }
}

impl NvidiaSmi {
    pub fn new() -> Self {
        Self {
            program: NVIDIA_SMI.to_string(),
        }
    }

    /// Uses a different executable, e.g. a full path to `nvidia-smi`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs one query. A host without the utility installed has no NVIDIA
    /// GPUs, so a missing executable yields an empty list.
    pub async fn query(&self) -> Result<Vec<GpuSnapshot>, AcquisitionError> {
        let output = Command::new(&self.program)
            .arg(format!("--query-gpu={QUERY_FIELDS}"))
            .arg("--format=csv,noheader,nounits")
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(program = %self.program, "GPU utility not installed, reporting no GPUs");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(AcquisitionError::Command {
                    command: NVIDIA_SMI,
                    source,
                })
            }
        };

        if !output.status.success() {
            return Err(AcquisitionError::probe(
                "gpu",
                format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses `--format=csv,noheader,nounits` output into snapshots.
///
/// Rows with fewer than nine columns are skipped. Numeric columns the driver
/// cannot report (`[N/A]`) read as zero.
pub fn parse_query_output(output: &str) -> Result<Vec<GpuSnapshot>, AcquisitionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(output.as_bytes());

    let mut gpus = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|source| AcquisitionError::Parse {
            command: NVIDIA_SMI,
            source,
        })?;
        if row.len() < FIELD_COUNT {
            debug!(columns = row.len(), "Skipping malformed GPU row");
            continue;
        }

        gpus.push(GpuSnapshot {
            index: number(&row[0]),
            name: row[1].to_string(),
            utilization_percent: number(&row[2]),
            memory_used_mb: number(&row[3]),
            memory_total_mb: number(&row[4]),
            core_clock_mhz: number(&row[5]),
            memory_clock_mhz: number(&row[6]),
            temperature_c: number(&row[7]),
            power_draw_w: number(&row[8]),
        });
    }
    Ok(gpus)
}

fn number<T: std::str::FromStr + Default>(field: &str) -> T {
    field.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_gpus() {
        let output = "0, NVIDIA GeForce RTX 3080, 37, 2048, 10240, 1710, 9501, 64, 220.45\n\
                      1, NVIDIA GeForce RTX 3080, 0, 5, 10240, 210, 405, 35, 18.12\n";
        let gpus = parse_query_output(output).unwrap();
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA GeForce RTX 3080");
        assert_eq!(gpus[0].utilization_percent, 37.0);
        assert_eq!(gpus[0].memory_used_mb, 2048);
        assert_eq!(gpus[0].core_clock_mhz, 1710);
        assert_eq!(gpus[0].memory_clock_mhz, 9501);
        assert_eq!(gpus[0].temperature_c, 64);
        assert_eq!(gpus[0].power_draw_w, 220.45);
        assert_eq!(gpus[1].index, 1);
    }

    #[test]
    fn test_unavailable_fields_read_as_zero() {
        let output = "0, Tesla T4, 12, 300, 15360, 585, 5000, 40, [N/A]\n";
        let gpus = parse_query_output(output).unwrap();
        assert_eq!(gpus[0].power_draw_w, 0.0);
        assert_eq!(gpus[0].temperature_c, 40);
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let output = "0, Broken, 12\n0, Tesla T4, 12, 300, 15360, 585, 5000, 40, 70.0\n";
        let gpus = parse_query_output(output).unwrap();
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].name, "Tesla T4");
    }

    #[test]
    fn test_empty_output_means_no_gpus() {
        assert!(parse_query_output("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_executable_reports_no_gpus() {
        let nvidia = NvidiaSmi::with_program("healthtrail-no-such-gpu-tool");
        assert!(nvidia.query().await.unwrap().is_empty());
    }
}
