use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task.
///
/// The initial state is [`TaskStatus::Pending`]; [`TaskStatus::Completed`]
/// and [`TaskStatus::Escalated`] are terminal. All transitions go through
/// [`TaskStatus::can_transition`], which encodes the full state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet classified into a queue.
    Pending,
    /// Ready queue: to be dispatched as soon as dependencies clear.
    OnTarget,
    /// Delegation queue: waiting on human or re-classification input.
    Delegated,
    /// Deferred queue: parked until re-evaluation promotes it.
    BackBurner,
    /// Claimed by a capability and currently executing.
    InProgress,
    /// Finished successfully (terminal).
    Completed,
    /// Last attempt failed; eligible for retry or escalation.
    Failed,
    /// Terminal failure requiring external intervention, or cancelled.
    Escalated,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Escalated)
    }

    /// Whether the edge `self -> to` is part of the task state machine.
    ///
    /// Two edges beyond the core lifecycle are admitted explicitly: any
    /// non-terminal state other than `InProgress` may be deprioritized to
    /// `BackBurner`, and the same set may be moved to `Escalated` by
    /// workflow cancellation. An `InProgress` task is never yanked; it
    /// finishes (or times out) and resolves through `Completed`/`Failed`.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (*self, to) {
            (Pending, OnTarget) | (Pending, Delegated) | (Pending, BackBurner) => true,
            (OnTarget, InProgress) => true,
            (Delegated, OnTarget) | (Delegated, BackBurner) => true,
            (BackBurner, OnTarget) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            (Failed, OnTarget) | (Failed, Escalated) => true,
            // Crash recovery: a claimed task may be returned to the ready queue.
            (InProgress, OnTarget) => true,
            // Explicit deprioritization.
            (OnTarget, BackBurner) | (Failed, BackBurner) => true,
            // Cancellation: non-terminal, not currently executing.
            (Pending, Escalated)
            | (OnTarget, Escalated)
            | (Delegated, Escalated)
            | (BackBurner, Escalated) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::OnTarget => "on_target",
            TaskStatus::Delegated => "delegated",
            TaskStatus::BackBurner => "back_burner",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Escalated => "escalated",
        };
        write!(f, "{s}")
    }
}

/// The three queue tracks a classified task can land in.
///
/// Classification moves a task out of [`TaskStatus::Pending`] into exactly
/// one of these; the queues themselves are derived views over task status,
/// never independent lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCategory {
    /// Work on this as soon as possible.
    OnTarget,
    /// Hand off to a human or another deciding party first.
    Delegated,
    /// Defer: blocked, low value right now, or waiting on resources.
    BackBurner,
}

impl QueueCategory {
    /// The task status corresponding to this queue.
    pub fn status(&self) -> TaskStatus {
        match self {
            QueueCategory::OnTarget => TaskStatus::OnTarget,
            QueueCategory::Delegated => TaskStatus::Delegated,
            QueueCategory::BackBurner => TaskStatus::BackBurner,
        }
    }
}

impl std::str::FromStr for QueueCategory {
    type Err = crate::error::MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_target" => Ok(QueueCategory::OnTarget),
            "delegated" => Ok(QueueCategory::Delegated),
            "back_burner" => Ok(QueueCategory::BackBurner),
            other => Err(crate::error::MaestroError::InvalidCategory(
                other.to_string(),
            )),
        }
    }
}

/// Why the last execution attempt of a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The worker returned an error.
    Error(String),
    /// The worker exceeded the configured deadline and was abandoned.
    Timeout,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Error(msg) => write!(f, "error: {msg}"),
            FailureCause::Timeout => write!(f, "timeout"),
        }
    }
}

/// A unit of delegable work owned by a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique, immutable identifier.
    pub id: Uuid,
    /// Opaque payload interpreted by the classifier and the worker.
    pub description: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Task ids that must reach `Completed` before this task may run.
    pub dependencies: Vec<Uuid>,
    /// Tags a capability must cover to claim this task.
    pub capability_tags: Vec<String>,
    /// Capability that most recently claimed this task.
    pub assigned_to: Option<String>,
    /// Scheduling priority; higher dispatches first.
    pub priority: i64,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Cause of the most recent failure, kept for diagnosis.
    pub last_failure: Option<FailureCause>,
    /// Retry backoff gate: not dispatched before this instant.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    /// The workflow that owns this task.
    pub workflow_id: Uuid,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new `Pending` task owned by the given workflow.
    pub fn new(description: impl Into<String>, workflow_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            capability_tags: Vec::new(),
            assigned_to: None,
            priority: 0,
            retry_count: 0,
            last_failure: None,
            not_before: None,
            workflow_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Set the capability tags a worker must cover.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.capability_tags = tags.into_iter().collect();
        self
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the backoff gate allows dispatching at `now`.
    pub fn dispatchable_at(&self, now: DateTime<Utc>) -> bool {
        match self.not_before {
            Some(gate) => gate <= now,
            None => true,
        }
    }
}
