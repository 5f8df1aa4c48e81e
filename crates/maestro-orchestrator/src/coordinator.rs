use crate::config::OrchestratorConfig;
use crate::queue::QueueManager;
use crate::store::{NewTask, TaskStore};
use maestro_core::{
    Classifier, MaestroError, MaestroResult, Notifier, QueueCategory, RecoveryPolicy, TaskStatus,
    WorkflowStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-workflow status and queue counts, for owner-facing reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// The derived aggregate status.
    pub status: WorkflowStatus,
    /// Total member tasks.
    pub total: usize,
    /// Members per lifecycle status, in state-machine order.
    pub pending: usize,
    /// Ready queue members.
    pub on_target: usize,
    /// Delegation queue members.
    pub delegated: usize,
    /// Deferred members.
    pub back_burner: usize,
    /// Currently executing members.
    pub in_progress: usize,
    /// Successfully finished members.
    pub completed: usize,
    /// Members awaiting retry.
    pub failed: usize,
    /// Terminal failures (including cancellations).
    pub escalated: usize,
}

/// Top-level driver: turns goals into workflows, watches their progress,
/// and owns the escalation path.
pub struct WorkflowCoordinator {
    store: Arc<TaskStore>,
    queue: Arc<QueueManager>,
    classifier: Arc<dyn Classifier>,
    recovery: Option<Arc<dyn RecoveryPolicy>>,
    notifier: Option<Arc<dyn Notifier>>,
    escalations: Mutex<Option<mpsc::UnboundedReceiver<Uuid>>>,
    config: OrchestratorConfig,
}

impl WorkflowCoordinator {
    /// Create a coordinator over the shared store and queue views.
    pub fn new(
        store: Arc<TaskStore>,
        queue: Arc<QueueManager>,
        classifier: Arc<dyn Classifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            classifier,
            recovery: None,
            notifier: None,
            escalations: Mutex::new(None),
            config,
        }
    }

    /// Attach an owner-supplied recovery policy for escalated tasks.
    pub fn with_recovery(mut self, recovery: Arc<dyn RecoveryPolicy>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Attach a notifier for delegation and escalation events.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach the receiver half of the dispatcher's escalation channel.
    pub fn with_escalation_receiver(mut self, receiver: mpsc::UnboundedReceiver<Uuid>) -> Self {
        self.escalations = Mutex::new(Some(receiver));
        self
    }

    /// Decompose a goal into tasks and admit them into the queues.
    ///
    /// The classifier is retried with backoff on
    /// [`MaestroError::ClassificationUnavailable`]; tasks are never
    /// fabricated locally. Each plan entry's index-based dependencies are
    /// remapped to the concrete ids created for earlier entries, which
    /// makes cycles through the remapping impossible by construction.
    pub async fn submit_goal(&self, goal: &str) -> MaestroResult<Uuid> {
        let plan = self.decompose_with_retry(goal).await?;
        if plan.is_empty() {
            return Err(MaestroError::InvalidPlan("empty decomposition".into()));
        }
        for (i, entry) in plan.iter().enumerate() {
            for &dep in &entry.depends_on {
                if dep >= i {
                    return Err(MaestroError::InvalidPlan(format!(
                        "entry {i} depends on {dep}, which is not an earlier entry"
                    )));
                }
            }
        }

        let workflow_id = self.store.create_workflow(goal).await;
        let mut ids: Vec<Uuid> = Vec::with_capacity(plan.len());
        for entry in &plan {
            let dependencies = entry.depends_on.iter().map(|&i| ids[i]).collect();
            let task_id = self
                .store
                .create_task(NewTask {
                    description: entry.description.clone(),
                    dependencies,
                    capability_tags: entry.capability_tags.clone(),
                    priority: entry.priority,
                    workflow_id,
                })
                .await?;
            self.queue.classify(task_id, entry.category).await?;
            if entry.category == QueueCategory::Delegated {
                self.notify(task_id, "delegated: awaiting input").await;
            }
            ids.push(task_id);
        }

        info!(
            workflow_id = %workflow_id,
            tasks = ids.len(),
            goal = %goal,
            "goal submitted"
        );
        Ok(workflow_id)
    }

    async fn decompose_with_retry(
        &self,
        goal: &str,
    ) -> MaestroResult<Vec<maestro_core::TaskPlan>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.classifier.decompose(goal).await {
                Ok(plan) => return Ok(plan),
                Err(MaestroError::ClassificationUnavailable(reason))
                    if attempt < self.config.decompose_max_attempts =>
                {
                    warn!(attempt, %reason, "classifier unavailable, backing off");
                    tokio::time::sleep(self.config.decompose_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Aggregate status of a workflow, recomputed from member tasks on
    /// every call; never stored.
    pub async fn workflow_status(&self, workflow_id: Uuid) -> MaestroResult<WorkflowStatus> {
        let workflow = self.store.workflow(workflow_id).await?;
        if workflow.cancelled {
            return Ok(WorkflowStatus::Failed);
        }
        let tasks = self.store.workflow_tasks(workflow_id).await?;
        let mut all_completed = true;
        for task in &tasks {
            if workflow.is_recovered(task.id) {
                continue;
            }
            match task.status {
                TaskStatus::Escalated => return Ok(WorkflowStatus::Failed),
                TaskStatus::Completed => {}
                _ => all_completed = false,
            }
        }
        if all_completed {
            Ok(WorkflowStatus::Completed)
        } else {
            Ok(WorkflowStatus::Running)
        }
    }

    /// Handle a task that reached `Escalated`.
    ///
    /// When a recovery policy supplies a replacement, the replacement joins
    /// the same workflow (inheriting the escalated task's dependency set)
    /// and the escalated member stops counting against the aggregate
    /// status. Otherwise the workflow derives `Failed`.
    pub async fn on_escalation(&self, task_id: Uuid) -> MaestroResult<()> {
        let task = self.store.get(task_id).await?;
        if task.status != TaskStatus::Escalated {
            return Ok(());
        }
        let Some(recovery) = &self.recovery else {
            error!(
                task_id = %task_id,
                workflow_id = %task.workflow_id,
                last_failure = ?task.last_failure,
                "task escalated, no recovery policy; workflow will report failed"
            );
            return Ok(());
        };
        match recovery.recover(&task).await {
            Some(plan) => {
                let replacement_id = self
                    .store
                    .create_task(NewTask {
                        description: plan.description.clone(),
                        dependencies: task.dependencies.clone(),
                        capability_tags: plan.capability_tags.clone(),
                        priority: plan.priority,
                        workflow_id: task.workflow_id,
                    })
                    .await?;
                self.queue.classify(replacement_id, plan.category).await?;
                self.store
                    .mark_recovered(task.workflow_id, task_id)
                    .await?;
                info!(
                    task_id = %task_id,
                    replacement_id = %replacement_id,
                    workflow_id = %task.workflow_id,
                    "escalated task replaced by recovery policy"
                );
                Ok(())
            }
            None => {
                warn!(
                    task_id = %task_id,
                    workflow_id = %task.workflow_id,
                    "recovery policy declined; workflow will report failed"
                );
                self.notify(task_id, "escalation: recovery declined").await;
                Ok(())
            }
        }
    }

    /// Drain pending escalation events from the dispatcher and handle
    /// each. Returns how many were processed.
    pub async fn process_escalations(&self) -> MaestroResult<usize> {
        let mut receiver = self.escalations.lock().await;
        let Some(rx) = receiver.as_mut() else {
            return Ok(0);
        };
        let mut processed = 0;
        while let Ok(task_id) = rx.try_recv() {
            self.on_escalation(task_id).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Cancel a workflow.
    ///
    /// Every non-terminal member that is not currently executing moves to
    /// `Escalated` without its worker ever being invoked. In-flight
    /// members finish naturally, but the workflow reports `Failed` from
    /// this point on and their results are discarded.
    pub async fn cancel_workflow(&self, workflow_id: Uuid) -> MaestroResult<()> {
        self.store.mark_cancelled(workflow_id).await?;
        let tasks = self.store.workflow_tasks(workflow_id).await?;
        let mut cancelled = 0;
        for task in &tasks {
            if self.store.cancel_task(task.id).await? {
                cancelled += 1;
            }
        }
        info!(
            workflow_id = %workflow_id,
            cancelled,
            left_running = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::InProgress)
                .count(),
            "workflow cancelled"
        );
        Ok(())
    }

    /// Status plus per-queue member counts for a workflow.
    pub async fn summary(&self, workflow_id: Uuid) -> MaestroResult<WorkflowSummary> {
        let status = self.workflow_status(workflow_id).await?;
        let tasks = self.store.workflow_tasks(workflow_id).await?;
        let count =
            |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
        Ok(WorkflowSummary {
            status,
            total: tasks.len(),
            pending: count(TaskStatus::Pending),
            on_target: count(TaskStatus::OnTarget),
            delegated: count(TaskStatus::Delegated),
            back_burner: count(TaskStatus::BackBurner),
            in_progress: count(TaskStatus::InProgress),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            escalated: count(TaskStatus::Escalated),
        })
    }

    async fn notify(&self, task_id: Uuid, reason: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(task_id, reason).await;
        }
    }
}
