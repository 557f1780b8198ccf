//! A metric source that replays a fixed script of CPU clock readings.

use async_trait::async_trait;
use healthtrail::{
    AcquisitionError, CpuSnapshot, DiskSnapshot, GpuSnapshot, HostProbe, MemSnapshot,
};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Returns the scripted CPU clocks one per call. Once the script runs out,
/// every CPU read fails, so the sampler stops producing samples.
pub struct ScriptedProbe {
    clocks: Mutex<VecDeque<f64>>,
    gpus: Vec<GpuSnapshot>,
}

impl ScriptedProbe {
    pub fn new(clocks: impl IntoIterator<Item = f64>) -> Self {
        Self {
            clocks: Mutex::new(clocks.into_iter().collect()),
            gpus: Vec::new(),
        }
    }

    pub fn with_gpus(mut self, gpus: Vec<GpuSnapshot>) -> Self {
        self.gpus = gpus;
        self
    }

    pub fn remaining(&self) -> usize {
        self.clocks.lock().len()
    }
}

#[async_trait]
impl HostProbe for ScriptedProbe {
    async fn cpu(&self) -> Result<CpuSnapshot, AcquisitionError> {
        let clock = self
            .clocks
            .lock()
            .pop_front()
            .ok_or_else(|| AcquisitionError::probe("cpu", "script exhausted"))?;
        Ok(CpuSnapshot {
            brand: "Scripted CPU".to_string(),
            frequency_mhz: clock,
            usage_percent: 12.5,
        })
    }

    async fn memory(&self) -> Result<MemSnapshot, AcquisitionError> {
        Ok(MemSnapshot {
            total_bytes: 16 * 1024 * 1024 * 1024,
            used_bytes: 4 * 1024 * 1024 * 1024,
        })
    }

    async fn disk(&self) -> Result<DiskSnapshot, AcquisitionError> {
        Ok(DiskSnapshot {
            mount_point: "/".to_string(),
            total_bytes: 500_000_000_000,
            used_bytes: 125_000_000_000,
        })
    }

    async fn gpus(&self) -> Result<Vec<GpuSnapshot>, AcquisitionError> {
        Ok(self.gpus.clone())
    }
}
