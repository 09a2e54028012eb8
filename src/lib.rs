//! # hetsched
//!
//! Performance-model-driven task scheduler core for heterogeneous
//! multicore runtimes.
//!
//! The crate implements the deque-model policy family: tasks carrying one
//! or more architecture-specific implementations are dispatched across a
//! pool of workers of differing capabilities (CPU cores, GPU devices) by
//! predicting per-candidate execution time, data-transfer cost and
//! energy, scoring each candidate, and committing the task to the winning
//! worker's ready queue while keeping that worker's *expected horizon*
//! consistent.
//!
//! ## Policies
//!
//! - `dm`: deque model, raw predicted completion time, with a
//!   heterogeneity-ordered scheduling window.
//! - `dmda`: deque model with data awareness, full fitness scoring and
//!   data-aware pops.
//! - `dmda-sorted`, `dmda-sorted-decision`: priority-ordered queue
//!   variants.
//!
//! Policies are value types created through [`policy::create_policy`];
//! predictions come from a [`oracle::PerformanceOracle`] the runtime
//! provides. When a prediction is missing the engine falls back to a
//! greedy placement that accelerates model calibration.
//!
//! ```
//! use hetsched::context::SchedulingContext;
//! use hetsched::oracle::TableOracle;
//! use hetsched::policy::{create_policy, SchedulingPolicy};
//! use hetsched::task::{ArchKind, Codelet, Implementation, Task};
//! use hetsched::worker::Worker;
//! use std::sync::Arc;
//!
//! let oracle = Arc::new(TableOracle::new());
//! oracle.set_length("scale", ArchKind::Cpu, 0, 120.0);
//!
//! let ctx = SchedulingContext::new(0, oracle);
//! ctx.workers.add(Worker::new(0, ArchKind::Cpu, 0));
//!
//! let mut policy = create_policy("dmda").unwrap();
//! policy.init(&ctx).unwrap();
//! policy.add_workers(&ctx, &[0]);
//!
//! let codelet = Arc::new(Codelet::new(
//!     "scale",
//!     vec![Implementation { arch: ArchKind::Cpu }],
//!     Some("scale".into()),
//! ));
//! policy.push(&ctx, Task::builder(1, codelet).build()).unwrap();
//! let task = policy.pop(&ctx, 0).expect("one task queued");
//! assert_eq!(task.id, 1);
//! ```

pub mod config;
pub mod context;
pub mod data;
pub mod decision;
pub mod error;
pub mod fifo;
pub mod fitness;
pub mod oracle;
pub mod policy;
pub mod stats;
pub mod task;
pub mod timing;
pub mod worker;

/// Scheduling-context identity.
pub type ContextId = u32;

/// Memory-node identity (host RAM, a device's RAM, ...).
pub type MemoryNodeId = usize;

pub use config::SchedulerConfig;
pub use context::{DataPrefetcher, PrioritySpan, SchedulingContext};
pub use error::{SchedResult, SchedulerError};
pub use policy::{create_policy, PushOutcome, SchedulingPolicy};
pub use task::{ArchKind, Codelet, Implementation, Task, TaskId};
pub use worker::{Worker, WorkerId};
