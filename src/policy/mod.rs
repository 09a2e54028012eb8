//! Scheduling policies
//!
//! The policy facade is the runtime's entry point: `push` runs a decision
//! and commits the task to a worker queue, `pop` hands tasks to worker
//! drivers, and the lifecycle hooks keep the horizons honest as tasks move
//! from queued to transferring to executing to done.
//!
//! Policies are value types obtained from [`create_policy`]; there is no
//! process-global policy state. All coefficients live in the policy
//! instance, initialized from the context's environment.

mod dm;
mod dmda;

pub use dm::DmPolicy;
pub use dmda::{DmdaPolicy, DmdaVariant};

use crate::config::SchedulerConfig;
use crate::context::{PrioritySpan, SchedulingContext};
use crate::decision::Decision;
use crate::error::SchedResult;
use crate::fifo::WorkerQueue;
use crate::stats::{SchedulerStats, StatsSnapshot};
use crate::task::Task;
use crate::worker::{Worker, WorkerId};
use crate::ContextId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of a successful push.
#[derive(Debug)]
pub enum PushOutcome {
    /// The task was committed to a worker's queue.
    Committed {
        worker: WorkerId,
        /// The queue's horizon after the commit, µs
        exp_end: f64,
    },
    /// The chosen worker leads a child context; the task is handed back
    /// for forwarding there. Counted as success.
    Delegated { context: ContextId, task: Task },
}

/// The capability vector every scheduling policy implements.
///
/// `pop`, `pop_every` and the hooks take the worker id explicitly; the
/// worker driver knows who it is. `pop_every` expects the caller to hold
/// no scheduler lock.
pub trait SchedulingPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Initialize per-context state. Must be called before any other
    /// operation.
    fn init(&mut self, ctx: &SchedulingContext) -> SchedResult<()>;

    /// Release per-context state, reporting telemetry.
    fn deinit(&mut self, ctx: &SchedulingContext);

    /// Create queues for newly-attached workers. Idempotent.
    fn add_workers(&self, ctx: &SchedulingContext, workers: &[WorkerId]);

    /// Destroy queues for detached workers.
    fn remove_workers(&self, ctx: &SchedulingContext, workers: &[WorkerId]);

    /// Decide and commit. Returns the committed worker or a delegation;
    /// fails with `NoEligibleWorker` when nobody can run the task.
    fn push(&self, ctx: &SchedulingContext, task: Task) -> SchedResult<PushOutcome>;

    /// Run the decision without committing, returning the predicted
    /// completion time. NaN when the greedy calibration fallback fired.
    fn simulate_push(&self, ctx: &SchedulingContext, task: &mut Task) -> SchedResult<f64>;

    /// Withdraw the next task for `worker`.
    fn pop(&self, ctx: &SchedulingContext, worker: WorkerId) -> Option<Task>;

    /// Withdraw the whole queue of `worker`.
    fn pop_every(&self, ctx: &SchedulingContext, worker: WorkerId) -> Vec<Task>;

    /// Data transfers are done, the kernel is about to start.
    fn pre_exec_hook(&self, ctx: &SchedulingContext, task: &Task, worker: WorkerId);

    /// The kernel finished.
    fn post_exec_hook(&self, ctx: &SchedulingContext, task: &Task, worker: WorkerId);

    /// A task was placed on `worker` by an external path; update the
    /// horizon without making a decision.
    fn push_task_notify(&self, ctx: &SchedulingContext, task: &mut Task, worker: WorkerId);

    /// Telemetry snapshot.
    fn stats(&self) -> StatsSnapshot;
}

/// Instantiate a registered policy by name.
///
/// Known names: `dm`, `dmda`, `dmda-sorted`, `dmda-sorted-decision`.
pub fn create_policy(name: &str) -> Option<Box<dyn SchedulingPolicy>> {
    match name {
        "dm" => Some(Box::new(DmPolicy::new())),
        "dmda" => Some(Box::new(DmdaPolicy::new(DmdaVariant::Plain))),
        "dmda-sorted" => Some(Box::new(DmdaPolicy::new(DmdaVariant::Sorted))),
        "dmda-sorted-decision" => {
            Some(Box::new(DmdaPolicy::new(DmdaVariant::SortedDecision)))
        }
        _ => None,
    }
}

/// Per-context state shared by the deque-model policy family: the worker
/// queue map, coefficients, telemetry and the priority range captured at
/// init.
pub(crate) struct DispatchState {
    pub config: SchedulerConfig,
    pub span: Option<PrioritySpan>,
    queues: DashMap<WorkerId, Arc<WorkerQueue>>,
    pub stats: SchedulerStats,
    calibration_warned: AtomicBool,
}

impl DispatchState {
    pub fn new(ctx: &SchedulingContext) -> SchedResult<Self> {
        let config = SchedulerConfig::from_env();
        config.validate()?;
        Ok(Self {
            config,
            span: ctx.priority_span,
            queues: DashMap::new(),
            stats: SchedulerStats::new(),
            calibration_warned: AtomicBool::new(false),
        })
    }

    pub fn attach_workers(&self, ctx: &SchedulingContext, workers: &[WorkerId]) {
        for &worker in workers {
            self.queues
                .entry(worker)
                .or_insert_with(|| Arc::new(WorkerQueue::new(Arc::clone(&ctx.clock), self.span)));
        }
    }

    pub fn detach_workers(&self, workers: &[WorkerId]) {
        for worker in workers {
            self.queues.remove(worker);
        }
    }

    /// The queue of an attached worker. A missing queue is a caller
    /// contract breach.
    pub fn queue(&self, worker: WorkerId) -> Arc<WorkerQueue> {
        self.queues
            .get(&worker)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_else(|| panic!("worker {} has no queue in this context", worker))
    }

    /// Snapshot the context's workers with their queues, in stable
    /// collection order, for one decision.
    pub fn candidates(&self, ctx: &SchedulingContext) -> Vec<(Arc<Worker>, Arc<WorkerQueue>)> {
        ctx.workers
            .snapshot()
            .iter()
            .map(|worker| (Arc::clone(worker), self.queue(worker.id)))
            .collect()
    }

    /// Commit protocol: record the implementation, delegate if the worker
    /// leads a child context, otherwise prefetch and fold the models into
    /// the chosen queue.
    pub fn commit_decision(
        &self,
        ctx: &SchedulingContext,
        mut task: Task,
        decision: &Decision,
        sorted: bool,
    ) -> SchedResult<PushOutcome> {
        task.set_implementation(decision.impl_index);

        if let Some(child) = decision.worker.child_context {
            ctx.revert_task_counters();
            tracing::debug!(
                task = task.id,
                worker = decision.worker.id,
                child_context = child,
                "delegating task to child context"
            );
            return Ok(PushOutcome::Delegated {
                context: child,
                task,
            });
        }

        if let Some(prefetcher) = &ctx.prefetcher {
            prefetcher.prefetch(&task, decision.worker.memory_node);
        }

        let queue = self.queue(decision.worker.id);
        let exp_end = queue.commit(
            task,
            decision.predicted,
            decision.predicted_transfer,
            sorted,
        );

        Ok(PushOutcome::Committed {
            worker: decision.worker.id,
            exp_end,
        })
    }

    /// Account a greedy-fallback placement, warning once per policy the
    /// first time calibration engages.
    pub fn note_forced(&self, task: &Task, decision: &Decision, calibrating: bool) {
        self.stats.record_eager();
        if calibrating && !self.calibration_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                task = task.id,
                codelet = %task.codelet.name,
                worker = decision.worker.id,
                "performance model not calibrated yet, using greedy placement"
            );
        }
    }

    /// Shared pop path: refresh the horizon, withdraw, count telemetry.
    pub fn pop_task(
        &self,
        ctx: &SchedulingContext,
        worker: WorkerId,
        data_aware: bool,
    ) -> Option<Task> {
        let node = ctx
            .workers
            .get(worker)
            .unwrap_or_else(|| panic!("worker {} does not belong to context {}", worker, ctx.id))
            .memory_node;
        let queue = self.queue(worker);
        let task = if data_aware {
            queue.pop_first_ready(node)
        } else {
            queue.pop_front()
        };
        if let Some(task) = &task {
            self.stats
                .record_pop(task.count_non_ready_buffers(node) == 0);
        }
        task
    }

    pub fn pop_every_task(&self, worker: WorkerId) -> Vec<Task> {
        self.queue(worker).pop_all()
    }

    pub fn pre_exec(&self, task: &Task, worker: WorkerId) {
        self.queue(worker).pre_exec(task);
    }

    pub fn post_exec(&self, worker: WorkerId) {
        self.queue(worker).post_exec();
    }

    pub fn notify(&self, ctx: &SchedulingContext, task: &mut Task, worker: WorkerId) {
        let target = ctx
            .workers
            .get(worker)
            .unwrap_or_else(|| panic!("worker {} does not belong to context {}", worker, ctx.id));
        let impl_index = task.selected_impl().unwrap_or(0);
        let predicted = ctx.oracle.expected_length(task, target.arch, impl_index);
        let predicted_transfer = ctx.oracle.expected_transfer_time(target.memory_node, task);
        self.queue(worker)
            .notify_external(task, predicted, predicted_transfer);
    }

    /// Telemetry summary logged at context teardown.
    pub fn report(&self, ctx: &SchedulingContext, policy: &str) {
        if self.config.silent {
            return;
        }
        let snapshot = self.stats.snapshot();
        tracing::debug!(
            policy,
            context = ctx.id,
            total = snapshot.total_tasks,
            ready = snapshot.ready_tasks,
            ready_pct = snapshot.ready_ratio(),
            modelled = snapshot.modelled_tasks,
            eager = snapshot.eager_tasks,
            "scheduler telemetry at teardown"
        );
        if snapshot.total_tasks > 0 && snapshot.modelled_tasks == 0 {
            tracing::warn!(
                policy,
                context = ctx.id,
                "no task was placed through a calibrated model; check that \
                 performance models are enabled and converging per codelet"
            );
        }
    }

    pub fn clear(&self) {
        self.queues.clear();
    }
}
