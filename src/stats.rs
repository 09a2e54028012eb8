//! Scheduler telemetry counters
//!
//! Lock-free counters updated on the scheduling hot path. These are
//! statistics only; they tolerate racy increments.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-policy telemetry counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Tasks withdrawn by workers
    total_tasks: AtomicU64,
    /// Withdrawn tasks whose inputs were all resident at pop time
    ready_tasks: AtomicU64,
    /// Tasks scheduled by the greedy fallback (no calibrated model)
    eager_tasks: AtomicU64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pop(&self, all_inputs_ready: bool) {
        self.total_tasks.fetch_add(1, Ordering::Relaxed);
        if all_inputs_ready {
            self.ready_tasks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eager(&self) {
        self.eager_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        let total_tasks = self.total_tasks.load(Ordering::Relaxed);
        let ready_tasks = self.ready_tasks.load(Ordering::Relaxed);
        let eager_tasks = self.eager_tasks.load(Ordering::Relaxed);
        StatsSnapshot {
            total_tasks,
            ready_tasks,
            modelled_tasks: total_tasks.saturating_sub(eager_tasks),
            eager_tasks,
        }
    }
}

/// Point-in-time view of the telemetry counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Tasks withdrawn by workers
    pub total_tasks: u64,
    /// Withdrawn tasks whose inputs were all resident at pop time
    pub ready_tasks: u64,
    /// Tasks placed through a calibrated performance model
    pub modelled_tasks: u64,
    /// Tasks placed by the greedy calibration fallback
    pub eager_tasks: u64,
}

impl StatsSnapshot {
    /// Share of pops that found every input resident, in percent.
    pub fn ready_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        100.0 * self.ready_tasks as f64 / self.total_tasks as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_pop_counts_ready() {
        // Arrange
        let stats = SchedulerStats::new();

        // Act
        stats.record_pop(true);
        stats.record_pop(false);
        stats.record_pop(true);

        // Assert
        let snap = stats.snapshot();
        assert_eq!(snap.total_tasks, 3);
        assert_eq!(snap.ready_tasks, 2);
    }

    #[test]
    fn test_modelled_is_total_minus_eager() {
        let stats = SchedulerStats::new();
        stats.record_pop(true);
        stats.record_pop(true);
        stats.record_eager();

        let snap = stats.snapshot();
        assert_eq!(snap.modelled_tasks, 1);
        assert_eq!(snap.eager_tasks, 1);
    }

    #[test]
    fn test_ready_ratio_empty() {
        let stats = SchedulerStats::new();
        assert_eq!(stats.snapshot().ready_ratio(), 0.0);
    }
}
