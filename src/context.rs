//! Scheduling contexts
//!
//! A context groups workers under one policy instance with a shared
//! priority range and the external collaborators (clock, oracle, optional
//! prefetcher). Contexts are long-lived: created at startup, destroyed at
//! shutdown.

use crate::oracle::PerformanceOracle;
use crate::task::Task;
use crate::timing::{Clock, MonotonicClock};
use crate::worker::WorkerCollection;
use crate::{ContextId, MemoryNodeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Finite, inclusive priority range declared by a context.
///
/// Declaring a range enables the per-priority bucket accounting in the
/// worker queues; without it the queues fall back to linear scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpan {
    pub min: i32,
    pub max: i32,
}

impl PrioritySpan {
    pub fn new(min: i32, max: i32) -> Self {
        assert!(min <= max, "priority span must satisfy min <= max");
        Self { min, max }
    }

    /// Number of priority buckets the span maps onto.
    pub fn bucket_count(&self) -> usize {
        (self.max as i64 - self.min as i64 + 1) as usize
    }

    /// Map a priority into a bucket index in `[0, bucket_count)`.
    ///
    /// Integer arithmetic with a truncated quotient; priorities outside
    /// the declared span clamp into it.
    pub fn normalize(&self, priority: i32) -> usize {
        let buckets = self.bucket_count() as i64;
        if self.max == self.min {
            return 0;
        }
        let scale = (buckets - 1) / (self.max as i64 - self.min as i64);
        let index = scale * (priority as i64 - self.min as i64);
        index.clamp(0, buckets - 1) as usize
    }
}

/// Receives prefetch requests for a committed task's inputs.
pub trait DataPrefetcher: Send + Sync {
    /// Ask the runtime to start moving `task`'s inputs towards `node`.
    fn prefetch(&self, task: &Task, node: MemoryNodeId);
}

/// A named scope grouping workers, a priority range and one policy
/// instance.
pub struct SchedulingContext {
    /// Context identity
    pub id: ContextId,
    /// Attached workers, copy-on-write
    pub workers: WorkerCollection,
    /// Declared priority range; `None` disables bucket accounting
    pub priority_span: Option<PrioritySpan>,
    /// Shared time base
    pub clock: Arc<dyn Clock>,
    /// Performance-model oracle
    pub oracle: Arc<dyn PerformanceOracle>,
    /// Optional prefetch sink
    pub prefetcher: Option<Arc<dyn DataPrefetcher>>,

    submitted: AtomicU64,
}

impl SchedulingContext {
    /// Create a context with the default monotonic clock.
    pub fn new(id: ContextId, oracle: Arc<dyn PerformanceOracle>) -> Self {
        Self::with_clock(id, oracle, Arc::new(MonotonicClock::new()))
    }

    /// Create a context on an explicit clock (tests, simulation).
    pub fn with_clock(
        id: ContextId,
        oracle: Arc<dyn PerformanceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            workers: WorkerCollection::new(),
            priority_span: None,
            clock,
            oracle,
            prefetcher: None,
            submitted: AtomicU64::new(0),
        }
    }

    /// Declare a finite priority range, enabling bucket accounting.
    pub fn with_priority_span(mut self, span: PrioritySpan) -> Self {
        self.priority_span = Some(span);
        self
    }

    /// Attach a prefetch sink.
    pub fn with_prefetcher(mut self, prefetcher: Arc<dyn DataPrefetcher>) -> Self {
        self.prefetcher = Some(prefetcher);
        self
    }

    /// Count a task entering this context.
    pub fn count_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Revert the submission counters after a task was forwarded to a
    /// child context.
    pub fn revert_task_counters(&self) {
        let _ = self
            .submitted
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
    }

    /// Tasks currently accounted to this context.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SchedulingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingContext")
            .field("id", &self.id)
            .field("workers", &self.workers.len())
            .field("priority_span", &self.priority_span)
            .field("submitted", &self.submitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::TableOracle;

    #[test]
    fn test_normalize_is_identity_shift_for_dense_span() {
        // Arrange: span [-2, 2] has 5 buckets and scale 1
        let span = PrioritySpan::new(-2, 2);

        // Act & Assert
        assert_eq!(span.bucket_count(), 5);
        assert_eq!(span.normalize(-2), 0);
        assert_eq!(span.normalize(0), 2);
        assert_eq!(span.normalize(2), 4);
    }

    #[test]
    fn test_normalize_clamps_out_of_span() {
        let span = PrioritySpan::new(0, 3);
        assert_eq!(span.normalize(-5), 0);
        assert_eq!(span.normalize(50), 3);
    }

    #[test]
    fn test_degenerate_span_maps_to_single_bucket() {
        let span = PrioritySpan::new(7, 7);
        assert_eq!(span.bucket_count(), 1);
        assert_eq!(span.normalize(7), 0);
        assert_eq!(span.normalize(-1), 0);
    }

    #[test]
    fn test_submission_counters_revert() {
        let ctx = SchedulingContext::new(0, Arc::new(TableOracle::new()));
        ctx.count_submitted();
        ctx.count_submitted();
        ctx.revert_task_counters();
        assert_eq!(ctx.submitted(), 1);

        // Reverting below zero saturates
        ctx.revert_task_counters();
        ctx.revert_task_counters();
        assert_eq!(ctx.submitted(), 0);
    }
}
