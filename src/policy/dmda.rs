//! Deque model with data awareness
//!
//! DMDA scores every (worker, implementation) candidate with the full
//! fitness (completion time, data-transfer penalty, energy, idle-power
//! surcharge) and pops with data-aware head-of-line bypass. The sorted
//! variants keep each queue priority-ordered and can additionally make
//! the decision against the task's insertion point instead of the tail.

use super::{DispatchState, PushOutcome, SchedulingPolicy};
use crate::context::SchedulingContext;
use crate::decision::{compute_predictions, decide_dmda, Decision, PredictionSet};
use crate::error::{SchedResult, SchedulerError};
use crate::stats::StatsSnapshot;
use crate::task::Task;
use crate::worker::WorkerId;

/// Push/decision discipline of a [`DmdaPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmdaVariant {
    /// Tail push, decision against the tail
    Plain,
    /// Priority-sorted push, decision against the tail
    Sorted,
    /// Priority-sorted push, decision against the insertion point
    SortedDecision,
}

impl DmdaVariant {
    fn sorted_push(self) -> bool {
        !matches!(self, DmdaVariant::Plain)
    }

    fn sorted_decision(self) -> bool {
        matches!(self, DmdaVariant::SortedDecision)
    }
}

/// The data-aware deque-model policy.
pub struct DmdaPolicy {
    variant: DmdaVariant,
    state: Option<DispatchState>,
}

impl DmdaPolicy {
    pub fn new(variant: DmdaVariant) -> Self {
        Self {
            variant,
            state: None,
        }
    }

    fn state(&self) -> &DispatchState {
        self.state.as_ref().expect("policy used before init")
    }

    /// Prediction + selection, no commit. `None` means no eligible worker.
    fn decide(&self, ctx: &SchedulingContext, task: &Task) -> Option<(PredictionSet, Decision)> {
        let state = self.state();
        let candidates = state.candidates(ctx);
        let set = compute_predictions(
            &candidates,
            task,
            ctx.oracle.as_ref(),
            ctx.clock.now_us(),
            self.variant.sorted_decision(),
        );
        let decision = decide_dmda(&set, &state.config)?;
        Some((set, decision))
    }
}

impl SchedulingPolicy for DmdaPolicy {
    fn name(&self) -> &'static str {
        match self.variant {
            DmdaVariant::Plain => "dmda",
            DmdaVariant::Sorted => "dmda-sorted",
            DmdaVariant::SortedDecision => "dmda-sorted-decision",
        }
    }

    fn description(&self) -> &'static str {
        "data-aware performance model"
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
    }

    fn add_workers(&self, ctx: &SchedulingContext, workers: &[WorkerId]) {
        self.state().attach_workers(ctx, workers);
    }

    fn remove_workers(&self, _ctx: &SchedulingContext, workers: &[WorkerId]) {
        self.state().detach_workers(workers);
    }

    fn push(&self, ctx: &SchedulingContext, task: Task) -> SchedResult<PushOutcome> {
        ctx.count_submitted();
        let state = self.state();

        let Some((set, decision)) = self.decide(ctx, &task) else {
            return Err(SchedulerError::NoEligibleWorker {
                context: ctx.id,
                task_id: task.id,
                task: Some(Box::new(task)),
            });
        };

        if decision.forced {
            state.note_forced(&task, &decision, set.calibrating);
        }
        state.commit_decision(ctx, task, &decision, self.variant.sorted_push())
    }

    fn simulate_push(&self, ctx: &SchedulingContext, task: &mut Task) -> SchedResult<f64> {
        let Some((_, decision)) = self.decide(ctx, task) else {
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
        self.state().pop_task(ctx, worker, true)
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
