//! Decision engine
//!
//! One prediction pass gathers, for every (eligible worker,
//! implementation) pair, the expected length, data penalty, energy and
//! completion time, reading horizon hints without any lock. The selection
//! pass then picks the candidate minimizing either raw completion time
//! (deque model) or the full fitness (data-aware model). Horizons are
//! reconciled later, under the queue lock, at commit.
//!
//! When any candidate has no calibrated length prediction, the engine
//! falls back to a greedy choice (the worker minimizing
//! `ntasks / relative_speedup`), so uncalibrated (worker, implementation)
//! cells get exercised and the models converge without piling every
//! unknown task onto one worker.

use crate::config::SchedulerConfig;
use crate::fifo::WorkerQueue;
use crate::fitness::{fitness, CandidateCost};
use crate::oracle::PerformanceOracle;
use crate::task::{Task, MAX_IMPLEMENTATIONS};
use crate::worker::Worker;
use std::sync::Arc;

/// Per-implementation estimates for one candidate worker.
#[derive(Debug, Clone, Copy)]
pub struct ImplEstimate {
    /// Expected execution length incl. conversion surcharge, µs
    pub length: f64,
    /// Expected data-transfer cost to the worker's node, µs
    pub penalty: f64,
    /// Expected energy, joules
    pub energy: f64,
    /// The worker's horizon at decision time (excluding this task), µs
    pub horizon: f64,
    /// Expected completion time including the transfer residual past the
    /// horizon, µs; NaN when not evaluated
    pub exp_end: f64,
}

impl Default for ImplEstimate {
    fn default() -> Self {
        Self {
            length: f64::NAN,
            penalty: f64::NAN,
            energy: f64::NAN,
            horizon: f64::NAN,
            exp_end: f64::NAN,
        }
    }
}

/// One eligible worker with its per-implementation estimates.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub worker: Arc<Worker>,
    pub queue: Arc<WorkerQueue>,
    /// Bitmask of executable implementation indices
    pub impl_mask: u32,
    pub impls: [ImplEstimate; MAX_IMPLEMENTATIONS],
}

/// Output of the prediction pass over one worker snapshot.
#[derive(Debug, Clone)]
pub struct PredictionSet {
    /// One row per eligible worker, in snapshot order
    pub rows: Vec<CandidateRow>,
    /// Minimum candidate completion time (includes the task's length)
    pub best_exp_end: f64,
    /// Maximum horizon of already-scheduled work (excludes the task)
    pub max_exp_end: f64,
    /// Greedy (row, implementation) forced when a prediction was missing
    pub forced: Option<(usize, usize)>,
    /// At least one candidate had an uncalibrated length model
    pub calibrating: bool,
}

/// A committed-to-be choice of worker and implementation.
#[derive(Debug, Clone)]
pub struct Decision {
    pub worker: Arc<Worker>,
    pub impl_index: usize,
    /// Length model to fold into the horizon; 0 under the greedy fallback
    pub predicted: f64,
    /// Transfer model to fold into the horizon; 0 under the greedy fallback
    pub predicted_transfer: f64,
    /// Predicted completion time; NaN under the greedy fallback
    pub exp_end: f64,
    /// The greedy calibration fallback made this choice
    pub forced: bool,
}

/// Run the prediction pass for `task` over the snapshot `candidates`.
///
/// `sorted_decision` makes `prev_exp_len` reflect where the task would sit
/// if inserted respecting its priority, instead of the tail.
pub fn compute_predictions(
    candidates: &[(Arc<Worker>, Arc<WorkerQueue>)],
    task: &Task,
    oracle: &dyn PerformanceOracle,
    now: f64,
    sorted_decision: bool,
) -> PredictionSet {
    let n_impls = task.codelet.implementations.len();
    let valid_mask = if n_impls == 0 {
        0
    } else {
        (1u32 << n_impls) - 1
    };

    let mut rows: Vec<CandidateRow> = Vec::new();
    let mut best_exp_end = f64::MAX;
    let mut max_exp_end = 0.0_f64;
    let mut calibrating = false;
    let mut unknown = false;
    let mut greedy: Option<(usize, usize)> = None;
    let mut greedy_end = 0.0_f64;

    for (worker, queue) in candidates {
        let impl_mask = oracle.can_execute(worker, task) & valid_mask;
        if impl_mask == 0 {
            continue;
        }

        let start_hint = queue.exp_start_hint();
        let exp_start = if start_hint.is_nan() {
            now
        } else {
            start_hint.max(now)
        };

        let row_index = rows.len();
        let mut impls = [ImplEstimate::default(); MAX_IMPLEMENTATIONS];

        for impl_index in 0..n_impls {
            if impl_mask & (1 << impl_index) == 0 {
                continue;
            }

            let (prev_exp_len, fifo_ntasks) = if sorted_decision {
                let hint = queue.sorted_insert_hint(task.priority);
                (hint.exp_len, hint.ntasks)
            } else {
                (queue.exp_len_hint(), queue.ntasks_hint())
            };

            let horizon = exp_start + prev_exp_len;
            if horizon > max_exp_end {
                max_exp_end = horizon;
            }

            let mut length = oracle.expected_length(task, worker.arch, impl_index);
            let penalty = oracle.expected_transfer_time(worker.memory_node, task);
            let energy = oracle.expected_energy(task, worker.arch, impl_index);
            let conversion = oracle.expected_conversion_time(task, worker.arch, impl_index);
            if conversion > 0.0 {
                length += conversion;
            }

            impls[impl_index].length = length;
            impls[impl_index].penalty = penalty;
            impls[impl_index].energy = energy;
            impls[impl_index].horizon = horizon;

            // The transfer overlaps with queued work: only the residual
            // past the horizon delays the task. Commit re-derives this
            // under the queue lock; the value here is the matching hint.
            let transfer_residual = if penalty.is_nan() {
                0.0
            } else if now + penalty < horizon {
                0.0
            } else {
                (now + penalty) - horizon
            };

            let ntasks_end = fifo_ntasks as f64 / oracle.relative_speedup(worker.arch);

            // Greedy candidate, always tracked: it is the fallback for
            // tasks with no calibrated model. Once calibration is in
            // progress, only other uncalibrated candidates may steal the
            // slot, and only when less loaded.
            if greedy.is_none()
                || (!calibrating && ntasks_end < greedy_end)
                || (!calibrating && length.is_nan())
                || (calibrating && length.is_nan() && ntasks_end < greedy_end)
            {
                greedy = Some((row_index, impl_index));
                greedy_end = ntasks_end;
            }

            if length.is_nan() {
                calibrating = true;
            }
            if length.is_nan() || length.abs() < f64::EPSILON {
                unknown = true;
            }
            if unknown {
                continue;
            }

            let exp_end = horizon + transfer_residual + length;
            impls[impl_index].exp_end = exp_end;
            if exp_end < best_exp_end {
                best_exp_end = exp_end;
            }
            if impls[impl_index].energy.is_nan() {
                impls[impl_index].energy = 0.0;
            }
        }

        rows.push(CandidateRow {
            worker: Arc::clone(worker),
            queue: Arc::clone(queue),
            impl_mask,
            impls,
        });
    }

    PredictionSet {
        rows,
        best_exp_end,
        max_exp_end,
        forced: if unknown { greedy } else { None },
        calibrating,
    }
}

/// Data-aware selection: argmin of the fitness over the prediction set.
/// First minimum in snapshot order wins. `None` means no eligible worker.
pub fn decide_dmda(set: &PredictionSet, config: &SchedulerConfig) -> Option<Decision> {
    if let Some((row_index, impl_index)) = set.forced {
        return Some(forced_decision(set, row_index, impl_index));
    }

    let mut best: Option<(usize, usize, f64)> = None;
    for (row_index, row) in set.rows.iter().enumerate() {
        for impl_index in 0..MAX_IMPLEMENTATIONS {
            if row.impl_mask & (1 << impl_index) == 0 {
                continue;
            }
            let estimate = row.impls[impl_index];
            let score = fitness(
                config,
                CandidateCost {
                    exp_end: estimate.exp_end,
                    best_exp_end: set.best_exp_end,
                    max_exp_end: set.max_exp_end,
                    data_penalty: estimate.penalty,
                    energy: estimate.energy,
                },
            );
            let improves = match best {
                None => true,
                Some((_, _, best_score)) => score < best_score,
            };
            if improves {
                best = Some((row_index, impl_index, score));
            }
        }
    }

    best.map(|(row_index, impl_index, _)| {
        let row = &set.rows[row_index];
        let estimate = row.impls[impl_index];
        Decision {
            worker: Arc::clone(&row.worker),
            impl_index,
            predicted: estimate.length,
            predicted_transfer: estimate.penalty,
            exp_end: estimate.exp_end,
            forced: false,
        }
    })
}

/// Deque-model selection: argmin of `exp_start + exp_len + length`, no
/// data or energy terms. First minimum in snapshot order wins.
pub fn decide_dm(set: &PredictionSet) -> Option<Decision> {
    if let Some((row_index, impl_index)) = set.forced {
        return Some(forced_decision(set, row_index, impl_index));
    }

    let mut best: Option<(usize, usize, f64)> = None;
    for (row_index, row) in set.rows.iter().enumerate() {
        for impl_index in 0..MAX_IMPLEMENTATIONS {
            if row.impl_mask & (1 << impl_index) == 0 {
                continue;
            }
            let estimate = row.impls[impl_index];
            let exp_end = estimate.horizon + estimate.length;
            let improves = match best {
                None => true,
                Some((_, _, best_end)) => exp_end < best_end,
            };
            if improves {
                best = Some((row_index, impl_index, exp_end));
            }
        }
    }

    best.map(|(row_index, impl_index, exp_end)| {
        let row = &set.rows[row_index];
        let estimate = row.impls[impl_index];
        Decision {
            worker: Arc::clone(&row.worker),
            impl_index,
            predicted: estimate.length,
            predicted_transfer: estimate.penalty,
            exp_end,
            forced: false,
        }
    })
}

fn forced_decision(set: &PredictionSet, row_index: usize, impl_index: usize) -> Decision {
    // Committing zero models keeps the horizon conservative for a task
    // whose true cost nobody can predict yet.
    Decision {
        worker: Arc::clone(&set.rows[row_index].worker),
        impl_index,
        predicted: 0.0,
        predicted_transfer: 0.0,
        exp_end: f64::NAN,
        forced: true,
    }
}
