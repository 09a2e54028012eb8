//! Per-worker ready queues with horizon bookkeeping
//!
//! Each attached worker owns one [`WorkerQueue`]: an ordered task sequence
//! plus the worker's *expected horizon*. `exp_start` is the predicted wall
//! time the next pop starts executing, `exp_len` the summed predicted
//! work queued (lengths and residual transfers, including the task in
//! flight), and `exp_end = exp_start + exp_len` is derived.
//!
//! The horizon is kept in atomic cells so the decision engine can read it
//! without taking the queue lock. Those reads are hints and may be stale;
//! every mutating operation re-reads under the lock, which makes horizon
//! updates linearizable per queue.

use crate::context::PrioritySpan;
use crate::task::Task;
use crate::timing::Clock;
use crate::MemoryNodeId;
use crossbeam::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of asking where a task would land if inserted by priority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertHint {
    /// Expected work ahead of the insertion point, µs
    pub exp_len: f64,
    /// Queued tasks ahead of the insertion point
    pub ntasks: usize,
}

struct QueueState {
    tasks: VecDeque<Task>,
    /// exp_len contribution of queued tasks per priority bucket; bucket p
    /// sums tasks whose normalized priority is >= p. Empty when the
    /// context declared no finite priority range.
    exp_len_per_priority: Vec<f64>,
    /// Queued-task count per priority bucket, same indexing.
    ntasks_per_priority: Vec<usize>,
}

/// One worker's ready queue.
pub struct WorkerQueue {
    clock: Arc<dyn Clock>,
    span: Option<PrioritySpan>,
    state: Mutex<QueueState>,
    idle: Condvar,
    exp_start: AtomicCell<f64>,
    exp_len: AtomicCell<f64>,
    exp_end: AtomicCell<f64>,
    ntasks: AtomicUsize,
    nprocessed: AtomicU64,
}

impl WorkerQueue {
    /// Create an empty queue. `span` enables per-priority bucket
    /// accounting.
    pub fn new(clock: Arc<dyn Clock>, span: Option<PrioritySpan>) -> Self {
        let now = clock.now_us();
        let buckets = span.map(|s| s.bucket_count()).unwrap_or(0);
        Self {
            clock,
            span,
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                exp_len_per_priority: vec![0.0; buckets],
                ntasks_per_priority: vec![0; buckets],
            }),
            idle: Condvar::new(),
            exp_start: AtomicCell::new(now),
            exp_len: AtomicCell::new(0.0),
            exp_end: AtomicCell::new(now),
            ntasks: AtomicUsize::new(0),
            nprocessed: AtomicU64::new(0),
        }
    }

    // Lock-free horizon hints, read by the decision engine.

    /// Predicted start of the next pop, µs. Hint; may be stale.
    pub fn exp_start_hint(&self) -> f64 {
        self.exp_start.load()
    }

    /// Predicted queued work, µs. Hint; may be stale.
    pub fn exp_len_hint(&self) -> f64 {
        self.exp_len.load()
    }

    /// Predicted completion of all queued work, µs. Hint; may be stale.
    pub fn exp_end_hint(&self) -> f64 {
        self.exp_end.load()
    }

    /// Queued-task count. Hint; may be stale.
    pub fn ntasks_hint(&self) -> usize {
        self.ntasks.load(Ordering::Relaxed)
    }

    /// Total tasks ever enqueued.
    pub fn nprocessed(&self) -> u64 {
        self.nprocessed.load(Ordering::Relaxed)
    }

    fn bucket_of(&self, priority: i32) -> Option<usize> {
        self.span.map(|span| span.normalize(priority))
    }

    /// exp_start := max(exp_start, now), exp_end := exp_start + exp_len.
    /// Caller holds the state lock.
    fn refresh_locked(&self, _state: &QueueState) {
        let now = self.clock.now_us();
        let start = self.exp_start.load();
        let start = if start.is_nan() { now } else { start.max(now) };
        self.exp_start.store(start);
        self.exp_end.store(start + self.exp_len.load());
    }

    fn add_len_buckets(&self, state: &mut QueueState, priority: i32, delta: f64) {
        if let Some(bucket) = self.bucket_of(priority) {
            for cell in state.exp_len_per_priority[..=bucket].iter_mut() {
                *cell += delta;
            }
        }
    }

    fn sub_len_buckets(&self, state: &mut QueueState, priority: i32, delta: f64) {
        if let Some(bucket) = self.bucket_of(priority) {
            for cell in state.exp_len_per_priority[..=bucket].iter_mut() {
                *cell = (*cell - delta).max(0.0);
            }
        }
    }

    fn enqueue_locked(&self, state: &mut QueueState, task: Task, sorted: bool) {
        if let Some(bucket) = self.bucket_of(task.priority) {
            for cell in state.ntasks_per_priority[..=bucket].iter_mut() {
                *cell += 1;
            }
        }
        if sorted {
            // Stable priority-descending insert: equal priorities keep
            // submission order.
            let position = state
                .tasks
                .iter()
                .position(|queued| queued.priority < task.priority)
                .unwrap_or(state.tasks.len());
            state.tasks.insert(position, task);
        } else {
            state.tasks.push_back(task);
        }
        self.ntasks.fetch_add(1, Ordering::Relaxed);
        self.nprocessed.fetch_add(1, Ordering::Relaxed);
    }

    fn unlink_locked(&self, state: &mut QueueState, position: usize) -> Task {
        let task = state
            .tasks
            .remove(position)
            .expect("unlink position out of range");
        if let Some(bucket) = self.bucket_of(task.priority) {
            for cell in state.ntasks_per_priority[..=bucket].iter_mut() {
                *cell = cell.saturating_sub(1);
            }
        }
        self.ntasks.fetch_sub(1, Ordering::Relaxed);
        task
    }

    /// Append a task without touching the horizon.
    pub fn push_tail(&self, task: Task) {
        let mut state = self.state.lock();
        self.enqueue_locked(&mut state, task, false);
        self.idle.notify_one();
    }

    /// Priority-sorted insert without touching the horizon.
    pub fn push_sorted(&self, task: Task) {
        let mut state = self.state.lock();
        self.enqueue_locked(&mut state, task, true);
        self.idle.notify_one();
    }

    /// Commit a scheduling decision: fold the predicted models into the
    /// horizon and insert the task, in one critical section.
    ///
    /// `predicted_transfer` is clamped against the committed `exp_end`: a
    /// transfer finishing before the queue drains contributes 0, otherwise
    /// only the residual past `exp_end` counts. Returns the resulting
    /// `exp_end`.
    pub fn commit(
        &self,
        mut task: Task,
        predicted: f64,
        predicted_transfer: f64,
        sorted: bool,
    ) -> f64 {
        let mut state = self.state.lock();
        self.refresh_locked(&state);

        let now = self.clock.now_us();
        let mut transfer = predicted_transfer;
        if !transfer.is_nan() {
            let exp_end = self.exp_end.load();
            if now + transfer < exp_end {
                transfer = 0.0;
            } else {
                transfer = (now + transfer) - exp_end;
            }
        }

        let mut len = self.exp_len.load();
        if !transfer.is_nan() {
            len += transfer;
            self.add_len_buckets(&mut state, task.priority, transfer);
        }
        if !predicted.is_nan() {
            len += predicted;
            self.add_len_buckets(&mut state, task.priority, predicted);
        }
        self.exp_len.store(len);
        self.exp_end.store(self.exp_start.load() + len);

        task.set_predictions(predicted, transfer);
        self.enqueue_locked(&mut state, task, sorted);
        self.idle.notify_one();
        self.exp_end.load()
    }

    /// Fold an externally-placed task's models into the horizon without
    /// inserting it. The task was queued by another path (e.g. an explicit
    /// execute-on placement); only the completion estimate moves.
    pub fn notify_external(&self, task: &mut Task, predicted: f64, predicted_transfer: f64) {
        let mut state = self.state.lock();
        self.refresh_locked(&state);

        let now = self.clock.now_us();
        let mut len = self.exp_len.load();

        if !predicted_transfer.is_nan() {
            let exp_end = self.exp_end.load();
            let residual = if now + predicted_transfer < exp_end {
                0.0
            } else {
                (now + predicted_transfer) - exp_end
            };
            len += residual;
            self.add_len_buckets(&mut state, task.priority, residual);
            task.set_predictions(task.predicted(), residual);
        }

        if !predicted.is_nan() {
            len += predicted;
            self.add_len_buckets(&mut state, task.priority, predicted);
            task.set_predictions(predicted, task.predicted_transfer());
        }

        self.exp_len.store(len);
        self.exp_end.store(self.exp_start.load() + len);
    }

    /// Withdraw the head task.
    pub fn pop_front(&self) -> Option<Task> {
        let mut state = self.state.lock();
        self.refresh_locked(&state);
        if state.tasks.is_empty() {
            return None;
        }
        Some(self.unlink_locked(&mut state, 0))
    }

    /// Data-aware head-of-line bypass: among queued tasks whose priority
    /// is at least the head's, withdraw the one with the fewest non-ready
    /// input buffers at `node`. Ties keep the earliest; a fully-ready task
    /// short-circuits the scan.
    pub fn pop_first_ready(&self, node: MemoryNodeId) -> Option<Task> {
        let mut state = self.state.lock();
        self.refresh_locked(&state);

        let head_priority = state.tasks.front()?.priority;
        let mut best: Option<(usize, usize)> = None;
        for (position, task) in state.tasks.iter().enumerate() {
            if task.priority < head_priority {
                continue;
            }
            let non_ready = task.count_non_ready_buffers(node);
            let improves = match best {
                None => true,
                Some((_, best_non_ready)) => non_ready < best_non_ready,
            };
            if improves {
                best = Some((position, non_ready));
                if non_ready == 0 {
                    break;
                }
            }
        }

        let (position, _) = best.expect("head task always qualifies");
        Some(self.unlink_locked(&mut state, position))
    }

    /// Withdraw the whole queue atomically, subtracting every departing
    /// task's committed models from the horizon. Used on worker detach and
    /// rebalance.
    pub fn pop_all(&self) -> Vec<Task> {
        let mut state = self.state.lock();
        self.refresh_locked(&state);

        let drained: Vec<Task> = state.tasks.drain(..).collect();
        self.ntasks.store(0, Ordering::Relaxed);
        for cell in state.ntasks_per_priority.iter_mut() {
            *cell = 0;
        }
        for cell in state.exp_len_per_priority.iter_mut() {
            *cell = 0.0;
        }

        let mut len = self.exp_len.load();
        for task in &drained {
            if !task.predicted().is_nan() {
                len -= task.predicted();
            }
            if !task.predicted_transfer().is_nan() {
                len -= task.predicted_transfer();
            }
        }
        self.exp_len.store(len.max(0.0));
        self.exp_end
            .store(self.exp_start.load() + self.exp_len.load());

        drained
    }

    /// Where would a task of this priority land if inserted respecting
    /// priority order? O(1) through the bucket arrays when the context
    /// declared a finite priority range, linear scan otherwise.
    pub fn sorted_insert_hint(&self, priority: i32) -> InsertHint {
        let state = self.state.lock();
        if let Some(bucket) = self.bucket_of(priority) {
            return InsertHint {
                exp_len: state.exp_len_per_priority[bucket],
                ntasks: state.ntasks_per_priority[bucket],
            };
        }

        let mut exp_len = 0.0;
        let mut ntasks = 0;
        for task in state.tasks.iter().filter(|t| t.priority >= priority) {
            if !task.predicted().is_nan() {
                exp_len += task.predicted();
            }
            if !task.predicted_transfer().is_nan() {
                exp_len += task.predicted_transfer();
            }
            ntasks += 1;
        }
        InsertHint { exp_len, ntasks }
    }

    /// The data transfer finished and the kernel is about to launch: drop
    /// the transfer model from the horizon and shift the compute model
    /// from queued work into the running window.
    pub fn pre_exec(&self, task: &Task) {
        let mut state = self.state.lock();
        self.refresh_locked(&state);

        let mut len = self.exp_len.load();
        let mut start = self.exp_start.load();

        let transfer = task.predicted_transfer();
        if !transfer.is_nan() {
            len -= transfer;
            self.sub_len_buckets(&mut state, task.priority, transfer);
        }

        let model = task.predicted();
        if !model.is_nan() {
            len -= model;
            start += model;
            self.sub_len_buckets(&mut state, task.priority, model);
        }

        if len < 0.0 {
            tracing::warn!(
                task = task.id,
                exp_len = len,
                "expected length underflow, clamping to zero"
            );
            len = 0.0;
        }

        self.exp_start.store(start);
        self.exp_len.store(len);
        self.exp_end.store(start + len);
    }

    /// The kernel finished: restart the horizon at the current time.
    pub fn post_exec(&self) {
        let _state = self.state.lock();
        let now = self.clock.now_us();
        self.exp_start.store(now);
        self.exp_end.store(now + self.exp_len.load());
    }

    /// Refresh the horizon so `exp_start` is never in the past.
    pub fn refresh(&self) {
        let state = self.state.lock();
        self.refresh_locked(&state);
    }

    /// Block until the queue is non-empty or `timeout` elapses. Returns
    /// whether a task is available.
    pub fn wait_for_task(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.tasks.is_empty() {
            return true;
        }
        self.idle.wait_for(&mut state, timeout);
        !state.tasks.is_empty()
    }

    /// Queued-task count and sequence length, read under the lock.
    /// Test support: checks the `ntasks == |sequence|` invariant.
    pub fn counted_len(&self) -> (usize, usize) {
        let state = self.state.lock();
        (self.ntasks.load(Ordering::Relaxed), state.tasks.len())
    }

    /// Priorities currently queued, head to tail.
    pub fn queued_priorities(&self) -> Vec<i32> {
        let state = self.state.lock();
        state.tasks.iter().map(|task| task.priority).collect()
    }

    /// Per-bucket queued-task counts. Empty without a declared span.
    pub fn bucket_counts(&self) -> Vec<usize> {
        let state = self.state.lock();
        state.ntasks_per_priority.clone()
    }

    /// Per-bucket expected-length sums. Empty without a declared span.
    pub fn bucket_lengths(&self) -> Vec<f64> {
        let state = self.state.lock();
        state.exp_len_per_priority.clone()
    }
}

impl std::fmt::Debug for WorkerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerQueue")
            .field("ntasks", &self.ntasks_hint())
            .field("exp_start", &self.exp_start_hint())
            .field("exp_len", &self.exp_len_hint())
            .field("exp_end", &self.exp_end_hint())
            .finish()
    }
}
