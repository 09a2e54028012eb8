//! Deque model
//!
//! DM ranks candidates by raw predicted completion time, with no data or
//! energy terms. Incoming tasks first pass through a policy-wide
//! scheduling window ordered by *heterogeneity ratio* (how much a task
//! gains from running on its best worker versus its worst), so the tasks
//! that benefit most from a good placement get decided first.

use super::{DispatchState, PushOutcome, SchedulingPolicy};
use crate::context::SchedulingContext;
use crate::decision::{compute_predictions, decide_dm};
use crate::error::{SchedResult, SchedulerError};
use crate::fifo::WorkerQueue;
use crate::oracle::PerformanceOracle;
use crate::stats::StatsSnapshot;
use crate::task::Task;
use crate::worker::{Worker, WorkerId};
use parking_lot::Mutex;
use std::sync::Arc;

struct WindowEntry {
    ratio: f64,
    task: Task,
}

/// The deque-model policy.
pub struct DmPolicy {
    state: Option<DispatchState>,
    /// Scheduling window, descending heterogeneity ratio. Guarded by the
    /// policy mutex; never hold it across oracle calls or a queue lock
    /// acquisition inside a decision.
    window: Mutex<Vec<WindowEntry>>,
}

impl DmPolicy {
    pub fn new() -> Self {
        Self {
            state: None,
            window: Mutex::new(Vec::new()),
        }
    }

    fn state(&self) -> &DispatchState {
        self.state.as_ref().expect("policy used before init")
    }

    /// Dispatch one task through the DM decision and commit it.
    fn dispatch(&self, ctx: &SchedulingContext, task: Task) -> SchedResult<PushOutcome> {
        let state = self.state();
        let candidates = state.candidates(ctx);
        let set = compute_predictions(
            &candidates,
            &task,
            ctx.oracle.as_ref(),
            ctx.clock.now_us(),
            false,
        );
        let Some(decision) = decide_dm(&set) else {
            return Err(SchedulerError::NoEligibleWorker {
                context: ctx.id,
                task_id: task.id,
                task: Some(Box::new(task)),
            });
        };
        if decision.forced {
            state.note_forced(&task, &decision, set.calibrating);
        }
        state.commit_decision(ctx, task, &decision, false)
    }
}

impl Default for DmPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for DmPolicy {
    fn name(&self) -> &'static str {
        "dm"
    }

    fn description(&self) -> &'static str {
        "performance model"
    }

    fn init(&mut self, ctx: &SchedulingContext) -> SchedResult<()> {
        self.state = Some(DispatchState::new(ctx)?);
        Ok(())
    }

    fn deinit(&mut self, ctx: &SchedulingContext) {
        if let Some(state) = self.state.take() {
            state.report(ctx, self.name());
            state.clear();
        }
        self.window.lock().clear();
    }

    fn add_workers(&self, ctx: &SchedulingContext, workers: &[WorkerId]) {
        self.state().attach_workers(ctx, workers);
    }

    fn remove_workers(&self, _ctx: &SchedulingContext, workers: &[WorkerId]) {
        self.state().detach_workers(workers);
    }

    /// Insert the task into the ratio-ordered window, then dispatch the
    /// window's head. The ratio is evaluated before the policy mutex is
    /// taken; no oracle call runs under it.
    fn push(&self, ctx: &SchedulingContext, task: Task) -> SchedResult<PushOutcome> {
        ctx.count_submitted();
        let state = self.state();
        let candidates = state.candidates(ctx);
        let ratio = heterogeneity_ratio(&candidates, &task, ctx.oracle.as_ref());

        let head = {
            let mut window = self.window.lock();
            // Stable descending insert: equal ratios keep arrival order.
            let position = window
                .iter()
                .position(|entry| entry.ratio < ratio)
                .unwrap_or(window.len());
            window.insert(position, WindowEntry { ratio, task });
            window.remove(0).task
        };

        self.dispatch(ctx, head)
    }

    fn simulate_push(&self, ctx: &SchedulingContext, task: &mut Task) -> SchedResult<f64> {
        let state = self.state();
        let candidates = state.candidates(ctx);
        let set = compute_predictions(
            &candidates,
            task,
            ctx.oracle.as_ref(),
            ctx.clock.now_us(),
            false,
        );
        let Some(decision) = decide_dm(&set) else {
            return Err(SchedulerError::NoEligibleWorker {
                context: ctx.id,
                task_id: task.id,
                task: None,
            });
        };
        task.set_implementation(decision.impl_index);
        Ok(decision.exp_end)
    }

    fn pop(&self, ctx: &SchedulingContext, worker: WorkerId) -> Option<Task> {
        self.state().pop_task(ctx, worker, false)
    }

    fn pop_every(&self, _ctx: &SchedulingContext, worker: WorkerId) -> Vec<Task> {
        self.state().pop_every_task(worker)
    }

    fn pre_exec_hook(&self, _ctx: &SchedulingContext, task: &Task, worker: WorkerId) {
        self.state().pre_exec(task, worker);
    }

    fn post_exec_hook(&self, _ctx: &SchedulingContext, _task: &Task, worker: WorkerId) {
        self.state().post_exec(worker);
    }

    fn push_task_notify(&self, ctx: &SchedulingContext, task: &mut Task, worker: WorkerId) {
        self.state().notify(ctx, task, worker);
    }

    fn stats(&self) -> StatsSnapshot {
        self.state().stats.snapshot()
    }
}

/// Ratio between a task's worst and best expected execution time across
/// the eligible (worker, implementation) pairs. Lengths are biased by
/// +1 µs so an uncalibrated or zero prediction cannot divide by zero;
/// uncalibrated cells drop out of both passes. 0 when nothing is
/// calibrated anywhere.
fn heterogeneity_ratio(
    candidates: &[(Arc<Worker>, Arc<WorkerQueue>)],
    task: &Task,
    oracle: &dyn PerformanceOracle,
) -> f64 {
    let n_impls = task.codelet.implementations.len();

    let mut max_execution_time = 0.0_f64;
    for (worker, _) in candidates {
        let mask = oracle.can_execute(worker, task);
        for impl_index in (0..n_impls).filter(|i| mask & (1 << i) != 0) {
            let length = 1.0 + oracle.expected_length(task, worker.arch, impl_index);
            if length > max_execution_time {
                max_execution_time = length;
            }
        }
    }

    let mut max_ratio = 0.0_f64;
    for (worker, _) in candidates {
        let mask = oracle.can_execute(worker, task);
        for impl_index in (0..n_impls).filter(|i| mask & (1 << i) != 0) {
            let length = 1.0 + oracle.expected_length(task, worker.arch, impl_index);
            let ratio = max_execution_time / length;
            if ratio > max_ratio {
                max_ratio = ratio;
            }
        }
    }

    max_ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::TableOracle;
    use crate::task::{ArchKind, Codelet, Implementation};
    use crate::timing::{Clock, ManualClock};

    fn rig() -> (
        Arc<ManualClock>,
        TableOracle,
        Vec<(Arc<Worker>, Arc<WorkerQueue>)>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let oracle = TableOracle::new();
        let candidates = vec![
            (
                Arc::new(Worker::new(0, ArchKind::Cpu, 0)),
                Arc::new(WorkerQueue::new(Arc::clone(&clock) as Arc<dyn Clock>, None)),
            ),
            (
                Arc::new(Worker::new(1, ArchKind::Gpu, 1)),
                Arc::new(WorkerQueue::new(Arc::clone(&clock) as Arc<dyn Clock>, None)),
            ),
        ];
        (clock, oracle, candidates)
    }

    fn cpu_gpu_task(id: u64, symbol: &str) -> Task {
        let codelet = Arc::new(Codelet::new(
            symbol,
            vec![
                Implementation {
                    arch: ArchKind::Cpu,
                },
                Implementation {
                    arch: ArchKind::Gpu,
                },
            ],
            Some(symbol.into()),
        ));
        Task::builder(id, codelet).build()
    }

    #[test]
    fn test_heterogeneity_ratio_is_worst_over_best() {
        // Arrange: CPU 99 µs, GPU 19 µs; biased lengths 100 and 20
        let (_clock, oracle, candidates) = rig();
        oracle.set_length("k", ArchKind::Cpu, 0, 99.0);
        oracle.set_length("k", ArchKind::Gpu, 1, 19.0);
        let task = cpu_gpu_task(1, "k");

        // Act
        let ratio = heterogeneity_ratio(&candidates, &task, &oracle);

        // Assert
        assert_eq!(ratio, 5.0);
    }

    #[test]
    fn test_heterogeneity_ratio_uncalibrated_is_zero() {
        let (_clock, oracle, candidates) = rig();
        let task = cpu_gpu_task(1, "k");
        assert_eq!(heterogeneity_ratio(&candidates, &task, &oracle), 0.0);
    }

    #[test]
    fn test_single_candidate_ratio_is_one() {
        let (_clock, oracle, mut candidates) = rig();
        candidates.truncate(1);
        oracle.set_length("k", ArchKind::Cpu, 0, 99.0);
        let task = cpu_gpu_task(1, "k");
        assert_eq!(heterogeneity_ratio(&candidates, &task, &oracle), 1.0);
    }
}
