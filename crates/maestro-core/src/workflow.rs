use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate status of a workflow, always recomputed from member tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// At least one member task has work left.
    Running,
    /// Every member task reached `Completed`.
    Completed,
    /// The workflow was cancelled, or a member escalated without recovery.
    Failed,
}

/// A named collection of related tasks submitted as one goal.
///
/// The workflow record owns only membership and recovery bookkeeping; its
/// aggregate status is never stored, preventing drift against the task
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: Uuid,
    /// The goal text this workflow was decomposed from.
    pub goal: String,
    /// Member task ids, in decomposition order.
    pub task_ids: Vec<Uuid>,
    /// Escalated members that a recovery policy replaced; these no longer
    /// count against the aggregate status.
    #[serde(default)]
    pub recovered: Vec<Uuid>,
    /// Set by cancellation; a cancelled workflow always reports `Failed`.
    #[serde(default)]
    pub cancelled: bool,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Create an empty workflow for the given goal.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            task_ids: Vec::new(),
            recovered: Vec::new(),
            cancelled: false,
            created_at: Utc::now(),
        }
    }

    /// Append a member task.
    pub fn add_task(&mut self, task_id: Uuid) {
        self.task_ids.push(task_id);
    }

    /// Whether an escalated member has been replaced by a recovery policy.
    pub fn is_recovered(&self, task_id: Uuid) -> bool {
        self.recovered.contains(&task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_membership() {
        let mut wf = Workflow::new("Launch the spring campaign");
        assert!(wf.task_ids.is_empty());
        let t = Uuid::new_v4();
        wf.add_task(t);
        assert_eq!(wf.task_ids, vec![t]);
        assert!(!wf.cancelled);
    }

    #[test]
    fn test_recovered_lookup() {
        let mut wf = Workflow::new("goal");
        let t = Uuid::new_v4();
        assert!(!wf.is_recovered(t));
        wf.recovered.push(t);
        assert!(wf.is_recovered(t));
    }
}
