use crate::store::TaskStore;
use chrono::Utc;
use maestro_core::{MaestroResult, QueueCategory, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-status task counts, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Tasks awaiting classification.
    pub pending: usize,
    /// Ready queue.
    pub on_target: usize,
    /// Delegation queue.
    pub delegated: usize,
    /// Deferred queue.
    pub back_burner: usize,
    /// Currently executing.
    pub in_progress: usize,
    /// Finished successfully.
    pub completed: usize,
    /// Awaiting retry or escalation.
    pub failed: usize,
    /// Terminal failures and cancellations.
    pub escalated: usize,
}

/// Maintains the three named queues as views over [`TaskStore`] state.
///
/// There are no queue data structures here: membership in a queue *is* the
/// task's status, so a task can never be in two queues at once and the
/// queues can never drift from the store.
pub struct QueueManager {
    store: Arc<TaskStore>,
}

impl QueueManager {
    /// Create a queue manager over the given store.
    pub fn new(store: Arc<TaskStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    /// Move a freshly created task from `Pending` into its classified queue.
    pub async fn classify(&self, task_id: Uuid, category: QueueCategory) -> MaestroResult<()> {
        self.store
            .update_status(task_id, TaskStatus::Pending, category.status())
            .await?;
        debug!(task_id = %task_id, category = ?category, "task classified");
        Ok(())
    }

    /// Dequeue the highest-priority ready task a capability can execute.
    ///
    /// Scans `OnTarget` tasks in (priority desc, created asc) order,
    /// skipping any whose dependencies are not all `Completed`, whose
    /// backoff gate has not elapsed, or whose tags the capability does not
    /// cover, and atomically claims the first match via compare-and-swap.
    /// A lost race simply moves the scan to the next candidate, so under
    /// concurrent callers each ready task is yielded to exactly one of
    /// them.
    pub async fn dequeue_ready(&self, capability_tags: &[String]) -> Option<Task> {
        let now = Utc::now();
        let candidates = self.store.list_by_status(TaskStatus::OnTarget).await;

        for task in candidates {
            if !task.dispatchable_at(now) {
                continue;
            }
            if !task
                .capability_tags
                .iter()
                .all(|tag| capability_tags.contains(tag))
            {
                continue;
            }
            match self.store.deps_completed(task.id).await {
                Ok(true) => {}
                _ => continue,
            }
            match self
                .store
                .update_status(task.id, TaskStatus::OnTarget, TaskStatus::InProgress)
                .await
            {
                Ok(()) => {
                    // Re-read: the claim is ours, but fields may have moved
                    // between the scan and the swap.
                    return self.store.get(task.id).await.ok();
                }
                Err(e) if e.is_stale() => continue, // another caller won this task
                Err(_) => continue,
            }
        }
        None
    }

    /// Return a failed or crashed task to the ready queue.
    ///
    /// Guarded by the same compare-and-swap discipline as dequeuing:
    /// `Failed -> OnTarget` for retries, `InProgress -> OnTarget` for
    /// worker crash recovery.
    pub async fn requeue(&self, task_id: Uuid) -> MaestroResult<()> {
        let task = self.store.get(task_id).await?;
        let from = match task.status {
            TaskStatus::Failed => TaskStatus::Failed,
            _ => TaskStatus::InProgress,
        };
        self.store
            .update_status(task_id, from, TaskStatus::OnTarget)
            .await?;
        info!(task_id = %task_id, %from, "task requeued");
        Ok(())
    }

    /// Explicitly move a task to the back burner.
    pub async fn deprioritize(&self, task_id: Uuid) -> MaestroResult<()> {
        let task = self.store.get(task_id).await?;
        self.store
            .update_status(task_id, task.status, TaskStatus::BackBurner)
            .await
    }

    /// Resolve a delegated task: back to the ready queue, or deferred
    /// indefinitely to the back burner.
    pub async fn resolve_delegation(&self, task_id: Uuid, defer: bool) -> MaestroResult<()> {
        let to = if defer {
            TaskStatus::BackBurner
        } else {
            TaskStatus::OnTarget
        };
        self.store
            .update_status(task_id, TaskStatus::Delegated, to)
            .await
    }

    /// Periodic back-burner sweep: promote deferred tasks whose
    /// dependencies have all completed. Returns how many were promoted.
    ///
    /// Lost races are absorbed; a task promoted by someone else mid-sweep
    /// is simply skipped.
    pub async fn sweep_back_burner(&self) -> usize {
        let parked = self.store.list_by_status(TaskStatus::BackBurner).await;
        let mut promoted = 0;
        for task in parked {
            if !matches!(self.store.deps_completed(task.id).await, Ok(true)) {
                continue;
            }
            if self
                .store
                .update_status(task.id, TaskStatus::BackBurner, TaskStatus::OnTarget)
                .await
                .is_ok()
            {
                debug!(task_id = %task.id, "back-burner task promoted");
                promoted += 1;
            }
        }
        promoted
    }

    /// Per-status counts across the whole store.
    pub async fn counts(&self) -> QueueCounts {
        QueueCounts {
            pending: self.store.list_by_status(TaskStatus::Pending).await.len(),
            on_target: self.store.list_by_status(TaskStatus::OnTarget).await.len(),
            delegated: self.store.list_by_status(TaskStatus::Delegated).await.len(),
            back_burner: self
                .store
                .list_by_status(TaskStatus::BackBurner)
                .await
                .len(),
            in_progress: self
                .store
                .list_by_status(TaskStatus::InProgress)
                .await
                .len(),
            completed: self.store.list_by_status(TaskStatus::Completed).await.len(),
            failed: self.store.list_by_status(TaskStatus::Failed).await.len(),
            escalated: self.store.list_by_status(TaskStatus::Escalated).await.len(),
        }
    }
}
