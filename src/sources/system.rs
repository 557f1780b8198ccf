//! # Local Host Probe
//!
//! Reads CPU, memory and disk usage through the `sysinfo` crate. The `System`
//! handle is kept between calls so CPU usage is computed against the previous
//! refresh rather than reported as zero every tick.

use crate::core::{AcquisitionError, CpuSnapshot, DiskSnapshot, GpuSnapshot, HostProbe, MemSnapshot};
use crate::sources::NvidiaSmi;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use sysinfo::{Disks, System};

/// A `HostProbe` for the machine this process runs on.
pub struct LocalHostProbe {
    system: Mutex<System>,
    disk_mount: String,
    gpu: Option<NvidiaSmi>,
}

impl LocalHostProbe {
    /// Creates a probe reporting the filesystem mounted at `disk_mount`.
    /// GPU readings come from `gpu` when provided, otherwise the GPU list is
    /// always empty.
    pub fn new(disk_mount: impl Into<String>, gpu: Option<NvidiaSmi>) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            disk_mount: disk_mount.into(),
            gpu,
        }
    }
}

#[async_trait]
impl HostProbe for LocalHostProbe {
    async fn cpu(&self) -> Result<CpuSnapshot, AcquisitionError> {
        let mut system = self.system.lock();
        system.refresh_cpu();
        if system.cpus().is_empty() {
            return Err(AcquisitionError::probe("cpu", "no CPUs reported"));
        }

        // The global entry carries usage only; frequency is per core.
        let frequency_mhz = system
            .cpus()
            .iter()
            .map(|cpu| cpu.frequency())
            .max()
            .unwrap_or_default() as f64;
        Ok(CpuSnapshot {
            brand: system.cpus()[0].brand().to_string(),
            frequency_mhz,
            usage_percent: system.global_cpu_info().cpu_usage() as f64,
        })
    }

    async fn memory(&self) -> Result<MemSnapshot, AcquisitionError> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(AcquisitionError::probe("memory", "total memory reported as zero"));
        }
        Ok(MemSnapshot {
            total_bytes,
            used_bytes: system.used_memory(),
        })
    }

    async fn disk(&self) -> Result<DiskSnapshot, AcquisitionError> {
        let disks = Disks::new_with_refreshed_list();
        let wanted = Path::new(&self.disk_mount);
        let disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == wanted)
            .ok_or_else(|| {
                AcquisitionError::probe(
                    "disk",
                    format!("no filesystem mounted at {}", self.disk_mount),
                )
            })?;

        let total_bytes = disk.total_space();
        Ok(DiskSnapshot {
            mount_point: self.disk_mount.clone(),
            total_bytes,
            used_bytes: total_bytes.saturating_sub(disk.available_space()),
        })
    }

    async fn gpus(&self) -> Result<Vec<GpuSnapshot>, AcquisitionError> {
        match &self.gpu {
            Some(nvidia) => nvidia.query().await,
            None => Ok(Vec::new()),
        }
    }
}
