//! Tasks and codelets
//!
//! A task is one unit of schedulable work: a codelet (the descriptor of
//! its architecture-specific implementations), the data handles it reads
//! and writes, a priority, and the prediction slots the decision engine
//! fills in at commit time.

use crate::data::{AccessMode, DataHandle};
use crate::{ContextId, MemoryNodeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Task identity.
pub type TaskId = u64;

/// Upper bound on per-codelet implementation variants.
pub const MAX_IMPLEMENTATIONS: usize = 4;

/// Architecture kind of a worker or implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchKind {
    Cpu,
    Gpu,
    Accelerator,
}

impl fmt::Display for ArchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchKind::Cpu => write!(f, "cpu"),
            ArchKind::Gpu => write!(f, "gpu"),
            ArchKind::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// One architecture-specific variant of a codelet.
#[derive(Debug, Clone)]
pub struct Implementation {
    /// Architecture this variant runs on
    pub arch: ArchKind,
}

/// Descriptor of a task kind: its implementation variants and the symbol
/// naming its performance-model table.
#[derive(Debug, Clone)]
pub struct Codelet {
    /// Codelet name, used in diagnostics
    pub name: String,
    /// Implementation variants, at most [`MAX_IMPLEMENTATIONS`]
    pub implementations: Vec<Implementation>,
    /// Performance-model symbol; `None` means never modelled
    pub model_symbol: Option<String>,
}

impl Codelet {
    /// Create a codelet. Panics if more than [`MAX_IMPLEMENTATIONS`]
    /// variants are supplied.
    pub fn new(
        name: impl Into<String>,
        implementations: Vec<Implementation>,
        model_symbol: Option<String>,
    ) -> Self {
        assert!(
            implementations.len() <= MAX_IMPLEMENTATIONS,
            "codelet has more than {} implementations",
            MAX_IMPLEMENTATIONS
        );
        Self {
            name: name.into(),
            implementations,
            model_symbol,
        }
    }
}

/// A data handle attached to a task, with its access mode.
#[derive(Debug, Clone)]
pub struct TaskBuffer {
    /// The handle to access
    pub handle: Arc<dyn DataHandle>,
    /// How the kernel accesses the buffer
    pub mode: AccessMode,
    /// Memory node the buffer must live on, overriding the worker's node
    pub pinned_node: Option<MemoryNodeId>,
}

impl TaskBuffer {
    /// Node this buffer is resolved against when scheduled on a worker
    /// whose memory node is `worker_node`.
    pub fn resolve_node(&self, worker_node: MemoryNodeId) -> MemoryNodeId {
        self.pinned_node.unwrap_or(worker_node)
    }
}

/// One schedulable task.
///
/// The scheduler owns the task from a successful `push` until `pop` hands
/// it back to the worker driver.
#[derive(Debug)]
pub struct Task {
    /// Task identity
    pub id: TaskId,
    /// Scheduling priority; larger runs earlier under sorted policies
    pub priority: i32,
    /// Task-kind descriptor
    pub codelet: Arc<Codelet>,
    /// Data handles accessed by the kernel
    pub buffers: Vec<TaskBuffer>,
    /// Owning scheduling context
    pub context: ContextId,
    /// Size category keying the performance model
    pub size_category: u64,

    selected_impl: Option<usize>,
    predicted: f64,
    predicted_transfer: f64,
}

impl Task {
    /// Start building a task for `codelet`.
    pub fn builder(id: TaskId, codelet: Arc<Codelet>) -> TaskBuilder {
        TaskBuilder::new(id, codelet)
    }

    /// Implementation variant selected by the decision engine.
    pub fn selected_impl(&self) -> Option<usize> {
        self.selected_impl
    }

    /// Record the chosen implementation variant.
    pub fn set_implementation(&mut self, impl_index: usize) {
        assert!(
            impl_index < self.codelet.implementations.len(),
            "implementation {} out of range for codelet {}",
            impl_index,
            self.codelet.name
        );
        self.selected_impl = Some(impl_index);
    }

    /// Predicted execution length committed for this task, µs. NaN until
    /// the task is committed to a worker.
    pub fn predicted(&self) -> f64 {
        self.predicted
    }

    /// Predicted residual transfer cost committed for this task, µs.
    pub fn predicted_transfer(&self) -> f64 {
        self.predicted_transfer
    }

    pub(crate) fn set_predictions(&mut self, predicted: f64, predicted_transfer: f64) {
        self.predicted = predicted;
        self.predicted_transfer = predicted_transfer;
    }

    /// Number of input buffers without a valid replica when resolved
    /// against `worker_node`.
    pub fn count_non_ready_buffers(&self, worker_node: MemoryNodeId) -> usize {
        self.buffers
            .iter()
            .filter(|buffer| {
                let node = buffer.resolve_node(worker_node);
                !buffer.handle.query_status(node).is_valid
            })
            .count()
    }
}

/// Builder for [`Task`].
#[derive(Debug)]
pub struct TaskBuilder {
    id: TaskId,
    priority: i32,
    codelet: Arc<Codelet>,
    buffers: Vec<TaskBuffer>,
    context: ContextId,
    size_category: u64,
}

impl TaskBuilder {
    pub fn new(id: TaskId, codelet: Arc<Codelet>) -> Self {
        Self {
            id,
            priority: 0,
            codelet,
            buffers: Vec::new(),
            context: 0,
            size_category: 0,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    pub fn size_category(mut self, size_category: u64) -> Self {
        self.size_category = size_category;
        self
    }

    pub fn buffer(mut self, handle: Arc<dyn DataHandle>, mode: AccessMode) -> Self {
        self.buffers.push(TaskBuffer {
            handle,
            mode,
            pinned_node: None,
        });
        self
    }

    pub fn pinned_buffer(
        mut self,
        handle: Arc<dyn DataHandle>,
        mode: AccessMode,
        node: MemoryNodeId,
    ) -> Self {
        self.buffers.push(TaskBuffer {
            handle,
            mode,
            pinned_node: Some(node),
        });
        self
    }

    pub fn build(self) -> Task {
        Task {
            id: self.id,
            priority: self.priority,
            codelet: self.codelet,
            buffers: self.buffers,
            context: self.context,
            size_category: self.size_category,
            selected_impl: None,
            predicted: f64::NAN,
            predicted_transfer: f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ResidencyHandle;

    fn cpu_gpu_codelet() -> Arc<Codelet> {
        Arc::new(Codelet::new(
            "test_kernel",
            vec![
                Implementation {
                    arch: ArchKind::Cpu,
                },
                Implementation {
                    arch: ArchKind::Gpu,
                },
            ],
            Some("test_kernel".into()),
        ))
    }

    #[test]
    fn test_builder_defaults() {
        let task = Task::builder(1, cpu_gpu_codelet()).build();
        assert_eq!(task.priority, 0);
        assert!(task.selected_impl().is_none());
        assert!(task.predicted().is_nan());
        assert!(task.predicted_transfer().is_nan());
    }

    #[test]
    fn test_set_implementation() {
        let mut task = Task::builder(1, cpu_gpu_codelet()).build();
        task.set_implementation(1);
        assert_eq!(task.selected_impl(), Some(1));
    }

    #[test]
    #[should_panic]
    fn test_set_implementation_out_of_range_panics() {
        let mut task = Task::builder(1, cpu_gpu_codelet()).build();
        task.set_implementation(2);
    }

    #[test]
    fn test_count_non_ready_buffers() {
        // Arrange: one handle valid on node 0, one valid nowhere
        let resident = Arc::new(ResidencyHandle::new(1, 0));
        let absent = Arc::new(ResidencyHandle::unmaterialized(2));
        let task = Task::builder(1, cpu_gpu_codelet())
            .buffer(resident, AccessMode::Read)
            .buffer(absent, AccessMode::Write)
            .build();

        // Act & Assert
        assert_eq!(task.count_non_ready_buffers(0), 1);
        assert_eq!(task.count_non_ready_buffers(1), 2);
    }

    #[test]
    fn test_pinned_buffer_ignores_worker_node() {
        let resident = Arc::new(ResidencyHandle::new(1, 3));
        let task = Task::builder(1, cpu_gpu_codelet())
            .pinned_buffer(resident, AccessMode::Read, 3)
            .build();

        // Buffer resolves to node 3 regardless of the worker's node.
        assert_eq!(task.count_non_ready_buffers(0), 0);
    }

    #[test]
    #[should_panic]
    fn test_codelet_rejects_too_many_implementations() {
        let impls = (0..MAX_IMPLEMENTATIONS + 1)
            .map(|_| Implementation {
                arch: ArchKind::Cpu,
            })
            .collect();
        Codelet::new("too_many", impls, None);
    }
}
