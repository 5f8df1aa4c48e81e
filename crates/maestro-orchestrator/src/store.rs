use chrono::{DateTime, Utc};
use maestro_core::{
    FailureCause, MaestroError, MaestroResult, Task, TaskStatus, Workflow,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Parameters for creating a task in the store.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Opaque description handed to the classifier and workers.
    pub description: String,
    /// Ids of tasks that must complete before this one may run.
    pub dependencies: Vec<Uuid>,
    /// Tags a capability must cover to claim the task.
    pub capability_tags: Vec<String>,
    /// Scheduling priority; higher dispatches first.
    pub priority: i64,
    /// The owning workflow.
    pub workflow_id: Uuid,
}

struct StoreInner {
    tasks: HashMap<Uuid, Task>,
    workflows: HashMap<Uuid, Workflow>,
}

impl StoreInner {
    /// DFS cycle check over the dependency graph, with `extra` standing in
    /// for the edges of a task about to be inserted.
    fn would_cycle(&self, candidate: Uuid, extra: &[Uuid]) -> bool {
        // 1 = in progress, 2 = done
        let mut visited: HashMap<Uuid, u8> = HashMap::new();
        visited.insert(candidate, 1);
        for dep in extra {
            if self.dfs_cycle(*dep, candidate, &mut visited) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(&self, id: Uuid, candidate: Uuid, visited: &mut HashMap<Uuid, u8>) -> bool {
        if id == candidate {
            return true;
        }
        match visited.get(&id) {
            Some(1) => return true, // back edge
            Some(2) => return false,
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.tasks.get(&id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(*dep, candidate, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }
}

/// Durable record of every task and workflow; the single source of truth
/// for queue membership.
///
/// All mutations of a task's status go through [`TaskStore::update_status`],
/// a compare-and-swap that holds the write lock across check and apply.
/// The three queues are views over this store (see
/// [`crate::queue::QueueManager`]); a task can never be in two queues at
/// once because its membership *is* its status.
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(StoreInner {
                tasks: HashMap::new(),
                workflows: HashMap::new(),
            }),
        })
    }

    // --- Task operations ---

    /// Create a task in `Pending` status.
    ///
    /// Rejects `SelfDependency`, `UnknownDependency`, and
    /// `CyclicDependency` synchronously; nothing is stored on failure.
    pub async fn create_task(&self, new: NewTask) -> MaestroResult<Uuid> {
        let mut inner = self.inner.write().await;

        if !inner.workflows.contains_key(&new.workflow_id) {
            return Err(MaestroError::WorkflowNotFound(new.workflow_id));
        }

        let mut deps = new.dependencies;
        deps.sort_unstable();
        deps.dedup();

        let task = Task::new(new.description, new.workflow_id)
            .with_dependencies(deps)
            .with_tags(new.capability_tags)
            .with_priority(new.priority);
        let id = task.id;

        for dep in &task.dependencies {
            if *dep == id {
                return Err(MaestroError::SelfDependency(id));
            }
            if !inner.tasks.contains_key(dep) {
                return Err(MaestroError::UnknownDependency(*dep));
            }
        }
        if inner.would_cycle(id, &task.dependencies) {
            return Err(MaestroError::CyclicDependency(id));
        }

        inner.tasks.insert(id, task);
        if let Some(wf) = inner.workflows.get_mut(&new.workflow_id) {
            wf.add_task(id);
        }
        debug!(task_id = %id, "task created");
        Ok(id)
    }

    /// Fetch a task by id.
    pub async fn get(&self, id: Uuid) -> MaestroResult<Task> {
        let inner = self.inner.read().await;
        inner
            .tasks
            .get(&id)
            .cloned()
            .ok_or(MaestroError::TaskNotFound(id))
    }

    /// Compare-and-swap status transition.
    ///
    /// Fails with `StaleTransition` when the task's current status is not
    /// `from` (another caller won the race), and `InvalidTransition` when
    /// the edge is not part of the state machine. The write lock is held
    /// across check and apply, so under concurrent callers exactly one
    /// succeeds for a given `from`.
    pub async fn update_status(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    ) -> MaestroResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(MaestroError::TaskNotFound(id))?;
        if task.status != from {
            return Err(MaestroError::StaleTransition {
                task: id,
                expected: from,
                actual: task.status,
            });
        }
        if !from.can_transition(to) {
            return Err(MaestroError::InvalidTransition { task: id, from, to });
        }
        task.status = to;
        task.updated_at = Utc::now();
        debug!(task_id = %id, %from, %to, "status transition");
        Ok(())
    }

    /// All tasks in the given status, ordered by priority descending then
    /// creation time ascending (FIFO fairness within a priority band).
    pub async fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        tasks
    }

    /// Whether every dependency of the task has reached `Completed`.
    pub async fn deps_completed(&self, id: Uuid) -> MaestroResult<bool> {
        let inner = self.inner.read().await;
        let task = inner.tasks.get(&id).ok_or(MaestroError::TaskNotFound(id))?;
        Ok(task.dependencies.iter().all(|dep| {
            inner
                .tasks
                .get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        }))
    }

    /// Re-prioritize a task.
    pub async fn update_priority(&self, id: Uuid, priority: i64) -> MaestroResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(MaestroError::TaskNotFound(id))?;
        task.priority = priority;
        task.updated_at = Utc::now();
        Ok(())
    }

    /// Record which capability claimed the task.
    pub async fn assign(&self, id: Uuid, capability_id: &str) -> MaestroResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(MaestroError::TaskNotFound(id))?;
        task.assigned_to = Some(capability_id.to_string());
        Ok(())
    }

    /// Record a failure cause and bump the retry counter.
    ///
    /// Returns the new retry count so the caller can apply the retry
    /// policy without a second read.
    pub async fn record_failure(&self, id: Uuid, cause: FailureCause) -> MaestroResult<u32> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(MaestroError::TaskNotFound(id))?;
        task.last_failure = Some(cause);
        task.retry_count += 1;
        task.updated_at = Utc::now();
        Ok(task.retry_count)
    }

    /// Set the backoff gate: the task is not dispatched before `when`.
    pub async fn set_not_before(&self, id: Uuid, when: DateTime<Utc>) -> MaestroResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(MaestroError::TaskNotFound(id))?;
        task.not_before = Some(when);
        Ok(())
    }

    /// Move a non-terminal, non-executing task to `Escalated` as part of
    /// workflow cancellation. Returns `false` when the task was left alone
    /// (terminal, or currently `InProgress`).
    pub async fn cancel_task(&self, id: Uuid) -> MaestroResult<bool> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(MaestroError::TaskNotFound(id))?;
        if !task.status.can_transition(TaskStatus::Escalated) {
            return Ok(false);
        }
        let from = task.status;
        task.status = TaskStatus::Escalated;
        task.updated_at = Utc::now();
        debug!(task_id = %id, %from, "task cancelled");
        Ok(true)
    }

    // --- Workflow operations ---

    /// Create an empty workflow for the given goal.
    pub async fn create_workflow(&self, goal: &str) -> Uuid {
        let mut inner = self.inner.write().await;
        let wf = Workflow::new(goal);
        let id = wf.id;
        inner.workflows.insert(id, wf);
        id
    }

    /// Fetch a workflow record by id.
    pub async fn workflow(&self, id: Uuid) -> MaestroResult<Workflow> {
        let inner = self.inner.read().await;
        inner
            .workflows
            .get(&id)
            .cloned()
            .ok_or(MaestroError::WorkflowNotFound(id))
    }

    /// All member tasks of a workflow, in decomposition order.
    pub async fn workflow_tasks(&self, id: Uuid) -> MaestroResult<Vec<Task>> {
        let inner = self.inner.read().await;
        let wf = inner
            .workflows
            .get(&id)
            .ok_or(MaestroError::WorkflowNotFound(id))?;
        Ok(wf
            .task_ids
            .iter()
            .filter_map(|tid| inner.tasks.get(tid).cloned())
            .collect())
    }

    /// Record that an escalated member was replaced by a recovery policy.
    pub async fn mark_recovered(&self, workflow_id: Uuid, task_id: Uuid) -> MaestroResult<()> {
        let mut inner = self.inner.write().await;
        let wf = inner
            .workflows
            .get_mut(&workflow_id)
            .ok_or(MaestroError::WorkflowNotFound(workflow_id))?;
        if !wf.recovered.contains(&task_id) {
            wf.recovered.push(task_id);
        }
        Ok(())
    }

    /// Mark a workflow cancelled. Member task transitions are driven by
    /// the coordinator, not here.
    pub async fn mark_cancelled(&self, workflow_id: Uuid) -> MaestroResult<()> {
        let mut inner = self.inner.write().await;
        let wf = inner
            .workflows
            .get_mut(&workflow_id)
            .ok_or(MaestroError::WorkflowNotFound(workflow_id))?;
        wf.cancelled = true;
        Ok(())
    }
}
