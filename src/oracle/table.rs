//! Table-backed oracle
//!
//! An in-memory stand-in for the runtime's history-based performance
//! models, used by tests, demos and calibration experiments. Cells that
//! were never set report NaN, exactly like an uncalibrated history model.

use super::PerformanceOracle;
use crate::task::{ArchKind, Task};
use crate::MemoryNodeId;
use dashmap::DashMap;

fn model_symbol(task: &Task) -> Option<String> {
    task.codelet.model_symbol.clone()
}

/// Prediction tables keyed by model symbol.
///
/// Lengths and energy are keyed by (symbol, arch, implementation);
/// transfer times by (memory node, symbol). Updates may race with
/// scheduler reads; `DashMap` keeps each cell read consistent.
#[derive(Debug, Default)]
pub struct TableOracle {
    lengths: DashMap<(String, ArchKind, usize), f64>,
    transfers: DashMap<(MemoryNodeId, String), f64>,
    conversions: DashMap<(String, ArchKind, usize), f64>,
    energy: DashMap<(String, ArchKind, usize), f64>,
    speedups: DashMap<ArchKind, f64>,
}

impl TableOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected length for (symbol, arch, impl), in µs.
    pub fn set_length(&self, symbol: &str, arch: ArchKind, impl_index: usize, us: f64) {
        self.lengths.insert((symbol.into(), arch, impl_index), us);
    }

    /// Set the expected transfer time of a task kind's inputs to `node`.
    pub fn set_transfer(&self, node: MemoryNodeId, symbol: &str, us: f64) {
        self.transfers.insert((node, symbol.into()), us);
    }

    /// Set the layout-conversion surcharge for (symbol, arch, impl).
    pub fn set_conversion(&self, symbol: &str, arch: ArchKind, impl_index: usize, us: f64) {
        self.conversions.insert((symbol.into(), arch, impl_index), us);
    }

    /// Set the expected energy for (symbol, arch, impl), in joules.
    pub fn set_energy(&self, symbol: &str, arch: ArchKind, impl_index: usize, joules: f64) {
        self.energy.insert((symbol.into(), arch, impl_index), joules);
    }

    /// Set the relative speedup of an architecture.
    pub fn set_speedup(&self, arch: ArchKind, speedup: f64) {
        assert!(speedup > 0.0, "relative speedup must be strictly positive");
        self.speedups.insert(arch, speedup);
    }

    /// Drop the length cell, reverting it to uncalibrated.
    pub fn clear_length(&self, symbol: &str, arch: ArchKind, impl_index: usize) {
        self.lengths.remove(&(symbol.into(), arch, impl_index));
    }
}

impl PerformanceOracle for TableOracle {
    fn expected_length(&self, task: &Task, arch: ArchKind, impl_index: usize) -> f64 {
        match model_symbol(task) {
            Some(symbol) => self
                .lengths
                .get(&(symbol, arch, impl_index))
                .map(|cell| *cell)
                .unwrap_or(f64::NAN),
            None => f64::NAN,
        }
    }

    fn expected_transfer_time(&self, node: MemoryNodeId, task: &Task) -> f64 {
        match model_symbol(task) {
            Some(symbol) => self
                .transfers
                .get(&(node, symbol))
                .map(|cell| *cell)
                .unwrap_or(f64::NAN),
            None => f64::NAN,
        }
    }

    fn expected_conversion_time(&self, task: &Task, arch: ArchKind, impl_index: usize) -> f64 {
        match model_symbol(task) {
            Some(symbol) => self
                .conversions
                .get(&(symbol, arch, impl_index))
                .map(|cell| *cell)
                .unwrap_or(0.0),
            None => 0.0,
        }
    }

    fn expected_energy(&self, task: &Task, arch: ArchKind, impl_index: usize) -> f64 {
        match model_symbol(task) {
            Some(symbol) => self
                .energy
                .get(&(symbol, arch, impl_index))
                .map(|cell| *cell)
                .unwrap_or(f64::NAN),
            None => f64::NAN,
        }
    }

    fn relative_speedup(&self, arch: ArchKind) -> f64 {
        self.speedups.get(&arch).map(|cell| *cell).unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Codelet, Implementation};
    use std::sync::Arc;

    fn task_with_symbol() -> Task {
        let codelet = Arc::new(Codelet::new(
            "mc_kernel",
            vec![Implementation {
                arch: ArchKind::Cpu,
            }],
            Some("mc_kernel".into()),
        ));
        Task::builder(1, codelet).build()
    }

    #[test]
    fn test_unset_cells_are_nan() {
        let oracle = TableOracle::new();
        let task = task_with_symbol();

        assert!(oracle.expected_length(&task, ArchKind::Cpu, 0).is_nan());
        assert!(oracle.expected_transfer_time(0, &task).is_nan());
        assert!(oracle.expected_energy(&task, ArchKind::Cpu, 0).is_nan());
        assert_eq!(oracle.expected_conversion_time(&task, ArchKind::Cpu, 0), 0.0);
    }

    #[test]
    fn test_set_then_read() {
        // Arrange
        let oracle = TableOracle::new();
        let task = task_with_symbol();

        // Act
        oracle.set_length("mc_kernel", ArchKind::Cpu, 0, 1500.0);
        oracle.set_transfer(2, "mc_kernel", 300.0);
        oracle.set_speedup(ArchKind::Gpu, 10.0);

        // Assert
        assert_eq!(oracle.expected_length(&task, ArchKind::Cpu, 0), 1500.0);
        assert_eq!(oracle.expected_transfer_time(2, &task), 300.0);
        assert_eq!(oracle.relative_speedup(ArchKind::Gpu), 10.0);
        assert_eq!(oracle.relative_speedup(ArchKind::Cpu), 1.0);
    }

    #[test]
    fn test_clear_length_reverts_to_uncalibrated() {
        let oracle = TableOracle::new();
        let task = task_with_symbol();
        oracle.set_length("mc_kernel", ArchKind::Cpu, 0, 10.0);
        oracle.clear_length("mc_kernel", ArchKind::Cpu, 0);
        assert!(oracle.expected_length(&task, ArchKind::Cpu, 0).is_nan());
    }

    #[test]
    fn test_modelless_codelet_is_never_calibrated() {
        let oracle = TableOracle::new();
        let codelet = Arc::new(Codelet::new(
            "anon",
            vec![Implementation {
                arch: ArchKind::Cpu,
            }],
            None,
        ));
        let task = Task::builder(1, codelet).build();
        oracle.set_length("anon", ArchKind::Cpu, 0, 10.0);

        assert!(oracle.expected_length(&task, ArchKind::Cpu, 0).is_nan());
    }
}
