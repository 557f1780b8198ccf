//! Metric sources backed by the local host.
//!
//! `LocalHostProbe` reads CPU, memory and disk through `sysinfo` and delegates
//! GPU readings to `nvidia-smi` when enabled.

pub mod nvidia;
pub mod system;

pub use nvidia::NvidiaSmi;
pub use system::LocalHostProbe;
