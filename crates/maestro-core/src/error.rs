use crate::task::TaskStatus;
use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Top-level error type for the Maestro orchestration core.
///
/// Validation variants are rejected synchronously at the boundary and are
/// never stored on a task. [`MaestroError::StaleTransition`] is an internal
/// coordination signal: callers recover by re-reading and retrying, and it
/// never propagates to a workflow owner.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// The proposed dependency set would create a cycle in the task graph.
    #[error("cyclic dependency involving task {0}")]
    CyclicDependency(Uuid),

    /// A referenced dependency does not exist in the task store.
    #[error("unknown dependency {0}")]
    UnknownDependency(Uuid),

    /// A task listed itself as a dependency.
    #[error("task {0} cannot depend on itself")]
    SelfDependency(Uuid),

    /// A classification result named a status outside the three queues.
    #[error("invalid queue category: {0}")]
    InvalidCategory(String),

    /// Compare-and-swap failure: the task's status changed under the caller.
    #[error("stale transition on task {task}: expected {expected}, found {actual}")]
    StaleTransition {
        /// The task whose status moved under the caller.
        task: Uuid,
        /// The status the caller expected to transition from.
        expected: TaskStatus,
        /// The status actually found in the store.
        actual: TaskStatus,
    },

    /// The requested edge is not part of the task state machine.
    #[error("invalid transition on task {task}: {from} -> {to}")]
    InvalidTransition {
        /// The task being transitioned.
        task: Uuid,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// No task with the given id exists.
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// No workflow with the given id exists.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    /// No capability with the given id is registered.
    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    /// A decomposition plan failed validation (empty, or an index that
    /// does not refer to an earlier entry).
    #[error("invalid decomposition plan: {0}")]
    InvalidPlan(String),

    /// The external classifier is unreachable or refused the request.
    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// A worker invocation returned an error.
    #[error("worker error: {0}")]
    Worker(String),

    /// An error in configuration parsing or validation.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaestroError {
    /// True for compare-and-swap conflicts that callers should absorb by
    /// re-reading and retrying rather than surfacing.
    pub fn is_stale(&self) -> bool {
        matches!(self, MaestroError::StaleTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_transition_display() {
        let id = Uuid::new_v4();
        let err = MaestroError::StaleTransition {
            task: id,
            expected: TaskStatus::OnTarget,
            actual: TaskStatus::InProgress,
        };
        let msg = err.to_string();
        assert!(msg.contains("on_target"));
        assert!(msg.contains("in_progress"));
        assert!(err.is_stale());
    }

    #[test]
    fn test_validation_errors_not_stale() {
        let id = Uuid::new_v4();
        assert!(!MaestroError::CyclicDependency(id).is_stale());
        assert!(!MaestroError::UnknownDependency(id).is_stale());
    }
}
