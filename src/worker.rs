//! Workers and the copy-on-write worker collection
//!
//! A worker is one compute resource with a fixed architecture and memory
//! node. Contexts group workers; decisions iterate a snapshot of the
//! collection so concurrent attach/detach never invalidates an in-flight
//! decision.

use crate::task::ArchKind;
use crate::{ContextId, MemoryNodeId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Worker identity.
pub type WorkerId = usize;

/// One compute resource.
#[derive(Debug, Clone)]
pub struct Worker {
    /// Worker identity
    pub id: WorkerId,
    /// Architecture kind
    pub arch: ArchKind,
    /// Memory node this worker computes from
    pub memory_node: MemoryNodeId,
    /// Set when this worker leads a child scheduling context; pushes that
    /// select it are delegated instead of queued
    pub child_context: Option<ContextId>,
}

impl Worker {
    pub fn new(id: WorkerId, arch: ArchKind, memory_node: MemoryNodeId) -> Self {
        Self {
            id,
            arch,
            memory_node,
            child_context: None,
        }
    }

    /// Mark this worker as master for a child context.
    pub fn leading(mut self, child_context: ContextId) -> Self {
        self.child_context = Some(child_context);
        self
    }
}

/// Copy-on-write collection of a context's workers.
///
/// Iteration order is insertion order and is stable for the lifetime of
/// the context, which makes decision tie-breaks deterministic.
#[derive(Debug, Default)]
pub struct WorkerCollection {
    workers: RwLock<Arc<Vec<Arc<Worker>>>>,
}

impl WorkerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker. Re-adding an id is a no-op.
    pub fn add(&self, worker: Worker) {
        let mut guard = self.workers.write();
        if guard.iter().any(|w| w.id == worker.id) {
            return;
        }
        let mut next = guard.as_ref().clone();
        next.push(Arc::new(worker));
        *guard = Arc::new(next);
    }

    /// Remove a worker by id. Unknown ids are ignored.
    pub fn remove(&self, id: WorkerId) {
        let mut guard = self.workers.write();
        if !guard.iter().any(|w| w.id == id) {
            return;
        }
        let next: Vec<Arc<Worker>> = guard.iter().filter(|w| w.id != id).cloned().collect();
        *guard = Arc::new(next);
    }

    /// Look up a worker by id.
    pub fn get(&self, id: WorkerId) -> Option<Arc<Worker>> {
        self.workers.read().iter().find(|w| w.id == id).cloned()
    }

    /// Number of attached workers.
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot for one decision. The snapshot stays valid while workers
    /// attach or detach concurrently.
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            workers: Arc::clone(&self.workers.read()),
        }
    }
}

/// Immutable view of the worker collection taken at decision start.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    workers: Arc<Vec<Arc<Worker>>>,
}

impl WorkerSnapshot {
    /// Iterate workers eligible to receive direct dispatch. Workers that
    /// lead a child context are still yielded; the commit path turns them
    /// into delegations.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Worker>> {
        self.workers.iter()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
