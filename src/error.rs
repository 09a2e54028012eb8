//! Error types for the scheduler core

use crate::task::{Task, TaskId};
use crate::ContextId;
use thiserror::Error;

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedulerError>;

/// Error types for scheduler operations
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The task's codelet has no implementation any attached worker can
    /// execute. The task is handed back to the caller uncommitted.
    #[error("no worker in context {context} can execute task {task_id}")]
    NoEligibleWorker {
        context: ContextId,
        task_id: TaskId,
        /// The rejected task, handed back so the caller can resubmit it.
        /// `None` when the failing operation did not own the task
        /// (simulation).
        task: Option<Box<Task>>,
    },

    /// Validation error (configuration, task construction)
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}
