//! Ordered model loading strategies.
//!
//! A plan is tried front to back; the first strategy that produces a complete
//! bundle wins.

use serde::Serialize;
use std::fmt;

use crate::model::device::{select_device, ResourceProfile};
use crate::model::types::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Reduced footprint session options
    MemoryEfficient,
    /// Runtime defaults
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Full,
    Half,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadStrategy {
    pub kind: StrategyKind,
    pub device: Device,
    pub precision: Precision,
}

impl LoadStrategy {
    pub const fn new(kind: StrategyKind, device: Device, precision: Precision) -> Self {
        Self {
            kind,
            device,
            precision,
        }
    }

    pub fn low_memory(&self) -> bool {
        self.kind == StrategyKind::MemoryEfficient
    }

    /// Intra-op thread count, `None` keeps the runtime default.
    ///
    /// Memory-efficient sessions get one thread per GiB of ceiling, bounded
    /// by the CPU count.
    pub fn intra_threads(&self, profile: &ResourceProfile) -> Option<usize> {
        if !self.low_memory() {
            return None;
        }
        let cpus = profile.cpus.max(1);
        let threads = match profile.memory_ceiling_mb {
            Some(mb) => ((mb / 1024) as usize).clamp(1, cpus),
            None => cpus,
        };
        Some(threads)
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = match self.precision {
            Precision::Full => "full",
            Precision::Half => "half",
        };
        let kind = match self.kind {
            StrategyKind::MemoryEfficient => "memory-efficient",
            StrategyKind::Simple => "simple",
        };
        write!(f, "{}/{}/{}", self.device, precision, kind)
    }
}

/// Ordered fallback list for the given resources.
pub fn plan(profile: &ResourceProfile) -> Vec<LoadStrategy> {
    use Precision::*;
    use StrategyKind::*;

    let cpu = [
        LoadStrategy::new(MemoryEfficient, Device::Cpu, Full),
        LoadStrategy::new(Simple, Device::Cpu, Full),
    ];

    match select_device(profile) {
        Device::Accelerator => {
            let mut strategies = vec![
                LoadStrategy::new(MemoryEfficient, Device::Accelerator, Half),
                LoadStrategy::new(Simple, Device::Accelerator, Full),
            ];
            strategies.extend(cpu);
            strategies
        }
        Device::Cpu => cpu.to_vec(),
    }
}
