//! Core types and error definitions for the Maestro orchestration core.
//!
//! This crate provides the foundational types shared across all Maestro
//! crates: the task and workflow domain model, the capability descriptor,
//! the error taxonomy, and the collaborator traits through which the core
//! talks to the outside world (classification, execution, notification).
//!
//! # Main types
//!
//! - [`Task`] — A unit of delegable work moving through the eight-state lifecycle.
//! - [`TaskStatus`] — The task state machine, with transition validation.
//! - [`Workflow`] — A named collection of tasks with a derived aggregate status.
//! - [`Capability`] — An executable skill that can claim tasks matching its tags.
//! - [`MaestroError`] — Unified error enum for all Maestro subsystems.
//! - [`Classifier`], [`Worker`], [`Notifier`] — External collaborator contracts.

/// Capability descriptors and health states.
pub mod capability;
/// External collaborator traits (classifier, worker, notifier, recovery).
pub mod collab;
/// Error taxonomy.
pub mod error;
/// Task domain model and state machine.
pub mod task;
/// Workflow records and aggregate status.
pub mod workflow;

pub use capability::{Capability, Health};
pub use collab::{Classifier, Notifier, RecoveryPolicy, TaskPlan, Worker};
pub use error::{MaestroError, MaestroResult};
pub use task::{FailureCause, QueueCategory, Task, TaskStatus};
pub use workflow::{Workflow, WorkflowStatus};
