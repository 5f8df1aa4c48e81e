//! Task orchestration core: store, queues, registry, dispatcher, coordinator.
//!
//! Implements a three-queue task lifecycle over a single task store. The
//! queues (on-target, delegated, back-burner) are derived views over task
//! status, so a task can never be in two queues at once; all status
//! mutations go through a per-record compare-and-swap, so no task is lost
//! or executed twice concurrently; dependency ordering is enforced at
//! dequeue time as a gating predicate rather than extra states.
//!
//! # Main types
//!
//! - [`TaskStore`] — Single source of truth for tasks and workflows, with CAS transitions.
//! - [`QueueManager`] — The three queues as views; dependency-gated dequeue.
//! - [`CapabilityRegistry`] — Executable capabilities, concurrency limits, health.
//! - [`Dispatcher`] — The execution loop: match, supervise, retry, escalate.
//! - [`WorkflowCoordinator`] — Goal decomposition, aggregate status, escalation authority.
//! - [`OrchestratorConfig`] — Tunable retry/timeout/cycle knobs.

/// Tunable knobs for dispatching and coordination.
pub mod config;
/// Workflow coordination: goal submission, status, escalation, cancellation.
pub mod coordinator;
/// The dispatch loop and retry policy.
pub mod dispatcher;
/// Derived queue views and dependency-gated dequeuing.
pub mod queue;
/// Capability registration and concurrency accounting.
pub mod registry;
/// The task and workflow store.
pub mod store;

pub use config::OrchestratorConfig;
pub use coordinator::{WorkflowCoordinator, WorkflowSummary};
pub use dispatcher::Dispatcher;
pub use queue::{QueueCounts, QueueManager};
pub use registry::{CapabilityRegistry, CapabilitySnapshot};
pub use store::{NewTask, TaskStore};
