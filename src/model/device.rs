//! Compute resource detection and device selection.

use tracing::debug;

use crate::config::Config;
use crate::model::types::Device;

/// Resources that decide the loading plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceProfile {
    /// An accelerator execution provider is usable
    pub accelerator: bool,
    /// Memory the model may use, in MiB, when known
    pub memory_ceiling_mb: Option<u64>,
    /// Logical CPUs
    pub cpus: usize,
}

impl ResourceProfile {
    /// Probe the host, honouring `force_cpu` and `max_memory_mb`.
    pub fn detect(config: &Config) -> Self {
        let accelerator = !config.force_cpu && accelerator_available();
        let memory_ceiling_mb = config.max_memory_mb.or_else(available_memory_mb);
        let profile = Self {
            accelerator,
            memory_ceiling_mb,
            cpus: num_cpus::get(),
        };
        debug!(?profile, force_cpu = config.force_cpu, "Detected compute resources");
        profile
    }
}

/// Accelerator when one is present, CPU otherwise.
pub fn select_device(profile: &ResourceProfile) -> Device {
    if profile.accelerator {
        Device::Accelerator
    } else {
        Device::Cpu
    }
}

#[cfg(feature = "cuda")]
pub fn accelerator_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            debug!(error = %e, "CUDA execution provider probe failed");
            false
        }
    }
}

#[cfg(not(feature = "cuda"))]
pub fn accelerator_available() -> bool {
    false
}

/// `MemAvailable` from `/proc/meminfo`, in MiB.
pub fn available_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}
