use crate::error::MaestroResult;
use crate::task::{QueueCategory, Task};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of a goal decomposition, before ids are assigned.
///
/// `depends_on` holds indices into the plan itself; each index must refer
/// to an earlier entry. The coordinator remaps them to concrete task ids
/// at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Description handed to workers verbatim.
    pub description: String,
    /// Indices of earlier plan entries this task depends on.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// Which queue the task should start in once classified.
    pub category: QueueCategory,
    /// Tags a capability must cover to execute this task.
    #[serde(default)]
    pub capability_tags: Vec<String>,
    /// Scheduling priority; higher dispatches first.
    #[serde(default)]
    pub priority: i64,
}

impl TaskPlan {
    /// Create an on-target plan entry with no dependencies.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            depends_on: Vec::new(),
            category: QueueCategory::OnTarget,
            capability_tags: Vec::new(),
            priority: 0,
        }
    }

    /// Set the dependency indices.
    pub fn depends_on(mut self, indices: Vec<usize>) -> Self {
        self.depends_on = indices;
        self
    }

    /// Set the starting queue category.
    pub fn in_category(mut self, category: QueueCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the required capability tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.capability_tags = tags;
        self
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// External classification capability.
///
/// Implementations typically wrap an LLM, but the core depends only on
/// this contract.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Decompose a goal into an ordered task plan.
    ///
    /// Fails with [`crate::MaestroError::ClassificationUnavailable`] when
    /// the backing service cannot answer; the coordinator retries with
    /// backoff and never fabricates tasks.
    async fn decompose(&self, goal: &str) -> MaestroResult<Vec<TaskPlan>>;

    /// Recommend a queue category for a single task description,
    /// used for re-classification.
    async fn recommend(&self, description: &str) -> MaestroResult<QueueCategory>;
}

/// A capability executor. One implementation per registered capability.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute the task and return its result payload.
    ///
    /// The dispatcher imposes the deadline externally; implementations
    /// must release any resources they hold when cancelled.
    async fn execute(&self, task: &Task) -> MaestroResult<String>;
}

/// Fire-and-forget notification sink for human-in-the-loop moments
/// (delegations, escalations). Failures are logged by callers, never fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify an external party about a task.
    async fn notify(&self, task_id: Uuid, reason: &str);
}

/// Owner-supplied policy consulted when a task escalates.
#[async_trait]
pub trait RecoveryPolicy: Send + Sync {
    /// Return a replacement plan for the escalated task, or `None` to let
    /// the owning workflow fail.
    async fn recover(&self, task: &Task) -> Option<TaskPlan>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_builder() {
        let plan = TaskPlan::new("Edit draft into final")
            .depends_on(vec![0, 1])
            .in_category(QueueCategory::BackBurner)
            .with_tags(vec!["content".into()])
            .with_priority(5);
        assert_eq!(plan.depends_on, vec![0, 1]);
        assert_eq!(plan.category, QueueCategory::BackBurner);
        assert_eq!(plan.priority, 5);
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let plan: TaskPlan = serde_json::from_str(
            r#"{"description": "Research background", "category": "on_target"}"#,
        )
        .unwrap();
        assert!(plan.depends_on.is_empty());
        assert!(plan.capability_tags.is_empty());
        assert_eq!(plan.priority, 0);
    }
}
