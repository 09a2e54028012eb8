//! Data-handle interface
//!
//! The scheduler never owns application data. It only queries where a
//! handle's contents are currently valid, to rank queued tasks by how much
//! of their input set is already resident at a worker's memory node.

use crate::MemoryNodeId;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Residency of a data handle at one memory node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStatus {
    /// A replica has been requested at the node
    pub is_requested: bool,
    /// The node holds a valid replica
    pub is_valid: bool,
    /// A transfer towards the node is in flight
    pub is_loading: bool,
}

/// Read-only view of a registered data handle.
///
/// Registration, partitioning and coherence live in the runtime above; the
/// scheduler consumes `is_valid` and nothing else.
pub trait DataHandle: Send + Sync + fmt::Debug {
    /// Stable identity of the handle.
    fn id(&self) -> u64;

    /// Residency of the handle at `node`.
    fn query_status(&self, node: MemoryNodeId) -> BufferStatus;
}

/// How a task accesses one of its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

/// In-memory handle tracking the set of nodes holding a valid replica.
///
/// Used by tests and demos standing in for the runtime's data registry.
#[derive(Debug)]
pub struct ResidencyHandle {
    id: u64,
    valid_nodes: DashSet<MemoryNodeId>,
}

impl ResidencyHandle {
    /// Create a handle valid at `home` only.
    pub fn new(id: u64, home: MemoryNodeId) -> Self {
        let valid_nodes = DashSet::new();
        valid_nodes.insert(home);
        Self { id, valid_nodes }
    }

    /// Create a handle with no valid replica anywhere.
    pub fn unmaterialized(id: u64) -> Self {
        Self {
            id,
            valid_nodes: DashSet::new(),
        }
    }

    /// Mark the replica at `node` valid.
    pub fn validate_on(&self, node: MemoryNodeId) {
        self.valid_nodes.insert(node);
    }

    /// Drop the replica at `node`.
    pub fn invalidate_on(&self, node: MemoryNodeId) {
        self.valid_nodes.remove(&node);
    }
}

impl DataHandle for ResidencyHandle {
    fn id(&self) -> u64 {
        self.id
    }

    fn query_status(&self, node: MemoryNodeId) -> BufferStatus {
        BufferStatus {
            is_requested: false,
            is_valid: self.valid_nodes.contains(&node),
            is_loading: false,
        }
    }
}
