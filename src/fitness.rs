//! Fitness scoring
//!
//! Collapses a candidate placement's completion-time, data-transfer and
//! energy estimates into one scalar. Lower is better.

use crate::config::SchedulerConfig;

/// Inputs for scoring one (worker, implementation) candidate.
#[derive(Debug, Clone, Copy)]
pub struct CandidateCost {
    /// Predicted completion time of the task on this candidate, µs
    pub exp_end: f64,
    /// Minimum predicted completion time over all candidates, µs
    pub best_exp_end: f64,
    /// Maximum completion time of already-scheduled work, µs
    pub max_exp_end: f64,
    /// Data-transfer cost to the candidate's memory node, µs; NaN is
    /// treated as 0
    pub data_penalty: f64,
    /// Energy estimate, joules; NaN is treated as 0
    pub energy: f64,
}

/// Score one candidate:
///
/// ```text
/// fitness = alpha * (exp_end - best_exp_end)
///         + beta  * data_penalty
///         + gamma * energy
/// ```
///
/// A candidate whose `exp_end` exceeds every already-scheduled horizon
/// extends the critical path and pays for the other workers idling until
/// it finishes: `gamma * idle_power * (exp_end - max_exp_end) / 1e6`.
pub fn fitness(config: &SchedulerConfig, cost: CandidateCost) -> f64 {
    let energy = if cost.energy.is_nan() { 0.0 } else { cost.energy };
    let penalty = if cost.data_penalty.is_nan() {
        0.0
    } else {
        cost.data_penalty
    };
    let mut fitness = config.alpha * (cost.exp_end - cost.best_exp_end)
        + config.beta * penalty
        + config.gamma * energy;

    if cost.exp_end > cost.max_exp_end {
        fitness += config.gamma * config.idle_power * (cost.exp_end - cost.max_exp_end) / 1e6;
    }

    fitness
}
