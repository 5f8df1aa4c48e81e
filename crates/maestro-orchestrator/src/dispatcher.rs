use crate::config::OrchestratorConfig;
use crate::queue::QueueManager;
use crate::registry::CapabilityRegistry;
use crate::store::TaskStore;
use chrono::Utc;
use maestro_core::{Capability, FailureCause, Notifier, TaskStatus, Worker};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The execution loop: matches ready tasks to capable workers, supervises
/// invocations, and applies the retry policy.
///
/// Each cycle sweeps the back burner, then walks the registered
/// capabilities draining as much capacity as each has available. Worker
/// invocations run off the scheduling path on their own tokio tasks, under
/// a supervising [`tokio::time::timeout`]; a worker that never returns is
/// failed with a distinguished [`FailureCause::Timeout`] and its capacity
/// slot is force-released.
pub struct Dispatcher {
    store: Arc<TaskStore>,
    queue: Arc<QueueManager>,
    registry: Arc<CapabilityRegistry>,
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
    notifier: Option<Arc<dyn Notifier>>,
    escalations: Option<mpsc::UnboundedSender<Uuid>>,
    config: OrchestratorConfig,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher over the shared store, queue views, and registry.
    pub fn new(
        store: Arc<TaskStore>,
        queue: Arc<QueueManager>,
        registry: Arc<CapabilityRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            workers: RwLock::new(HashMap::new()),
            notifier: None,
            escalations: None,
            config,
            inflight: Mutex::new(Vec::new()),
        }
    }

    /// Attach a notifier for escalation events.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach the sender half of an escalation channel; the workflow
    /// coordinator drains the receiver.
    pub fn with_escalation_sender(mut self, sender: mpsc::UnboundedSender<Uuid>) -> Self {
        self.escalations = Some(sender);
        self
    }

    /// Register a capability together with the worker that executes its
    /// tasks.
    pub async fn register_worker(&self, capability: Capability, worker: Arc<dyn Worker>) {
        let id = capability.id.clone();
        self.registry.register(capability).await;
        self.workers.write().await.insert(id, worker);
    }

    /// Run one dispatch cycle. Returns the number of tasks handed to
    /// workers.
    ///
    /// For each capability with available capacity, capacity is acquired
    /// *before* dequeuing; on an empty dequeue the slot is released
    /// immediately so no task is ever held against idle capacity.
    pub async fn run_cycle(&self) -> usize {
        let promoted = self.queue.sweep_back_burner().await;
        if promoted > 0 {
            debug!(promoted, "back-burner sweep promoted tasks");
        }

        let mut dispatched = 0;
        for snap in self.registry.snapshot().await {
            let capability = snap.capability;
            let worker = {
                let workers = self.workers.read().await;
                workers.get(&capability.id).cloned()
            };
            let Some(worker) = worker else {
                continue;
            };

            // Drain as much capacity as this capability has free.
            loop {
                if !self.registry.try_acquire(&capability.id).await {
                    break;
                }
                let Some(task) = self.queue.dequeue_ready(&capability.tags).await else {
                    // Nothing ready: give the slot back, hold no task.
                    self.registry.release(&capability.id).await;
                    break;
                };
                if let Err(e) = self.store.assign(task.id, &capability.id).await {
                    debug!(task_id = %task.id, error = %e, "assign after dequeue failed");
                }
                info!(
                    task_id = %task.id,
                    capability = %capability.id,
                    priority = task.priority,
                    attempt = task.retry_count + 1,
                    "task dispatched"
                );
                let handle = self.supervise(task.id, capability.id.clone(), Arc::clone(&worker));
                self.inflight.lock().await.push(handle);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Spawn the supervised worker invocation for a claimed task.
    fn supervise(
        &self,
        task_id: Uuid,
        capability_id: String,
        worker: Arc<dyn Worker>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let notifier = self.notifier.clone();
        let escalations = self.escalations.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let task = match store.get(task_id).await {
                Ok(t) => t,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "claimed task vanished");
                    registry.release(&capability_id).await;
                    return;
                }
            };

            let outcome =
                tokio::time::timeout(config.worker_timeout(), worker.execute(&task)).await;

            // Capacity is paired with the invocation, not with success:
            // released on every path, including timeout.
            registry.release(&capability_id).await;

            match outcome {
                Ok(Ok(result)) => {
                    match store
                        .update_status(task_id, TaskStatus::InProgress, TaskStatus::Completed)
                        .await
                    {
                        Ok(()) => {
                            info!(
                                task_id = %task_id,
                                capability = %capability_id,
                                result_len = result.len(),
                                "task completed"
                            );
                        }
                        Err(e) => debug!(task_id = %task_id, error = %e, "completion lost race"),
                    }
                }
                Ok(Err(e)) => {
                    Self::handle_failure(
                        &store,
                        notifier.as_ref(),
                        escalations.as_ref(),
                        &config,
                        task_id,
                        FailureCause::Error(e.to_string()),
                    )
                    .await;
                }
                Err(_) => {
                    warn!(
                        task_id = %task_id,
                        capability = %capability_id,
                        timeout_ms = config.worker_timeout_ms,
                        "worker deadline exceeded"
                    );
                    Self::handle_failure(
                        &store,
                        notifier.as_ref(),
                        escalations.as_ref(),
                        &config,
                        task_id,
                        FailureCause::Timeout,
                    )
                    .await;
                }
            }
        })
    }

    /// Apply the retry policy after a failed invocation: requeue with
    /// exponential backoff while budget remains, escalate once exhausted.
    async fn handle_failure(
        store: &Arc<TaskStore>,
        notifier: Option<&Arc<dyn Notifier>>,
        escalations: Option<&mpsc::UnboundedSender<Uuid>>,
        config: &OrchestratorConfig,
        task_id: Uuid,
        cause: FailureCause,
    ) {
        let retry_count = match store.record_failure(task_id, cause.clone()).await {
            Ok(n) => n,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "failed to record failure");
                return;
            }
        };
        if let Err(e) = store
            .update_status(task_id, TaskStatus::InProgress, TaskStatus::Failed)
            .await
        {
            debug!(task_id = %task_id, error = %e, "failure transition lost race");
            return;
        }
        warn!(task_id = %task_id, %cause, retry_count, "task failed");

        if retry_count < config.max_retries {
            let gate = Utc::now() + config.retry_backoff_for(retry_count);
            if let Err(e) = store.set_not_before(task_id, gate).await {
                debug!(task_id = %task_id, error = %e, "backoff gate not set");
            }
            match store
                .update_status(task_id, TaskStatus::Failed, TaskStatus::OnTarget)
                .await
            {
                Ok(()) => {
                    info!(task_id = %task_id, retry_count, "task requeued for retry");
                }
                Err(e) => debug!(task_id = %task_id, error = %e, "retry requeue lost race"),
            }
        } else {
            match store
                .update_status(task_id, TaskStatus::Failed, TaskStatus::Escalated)
                .await
            {
                Ok(()) => {
                    error!(task_id = %task_id, retry_count, "retry budget exhausted, escalating");
                    if let Some(notifier) = notifier {
                        notifier
                            .notify(task_id, &format!("escalated after {retry_count} attempts"))
                            .await;
                    }
                    if let Some(tx) = escalations {
                        // Coordinator may be gone during shutdown; that is fine.
                        let _ = tx.send(task_id);
                    }
                }
                Err(e) => debug!(task_id = %task_id, error = %e, "escalation lost race"),
            }
        }
    }

    /// Await every in-flight worker invocation spawned so far. Used by
    /// tests and orderly shutdown.
    pub async fn drain(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut inflight = self.inflight.lock().await;
            inflight.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker supervision task panicked");
            }
        }
    }

    /// Start the periodic dispatch loop on a background task.
    ///
    /// Returns the [`JoinHandle`] so the caller can abort it on shutdown.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dispatcher.config.cycle_interval());
            loop {
                interval.tick().await;
                dispatcher.run_cycle().await;
            }
        })
    }
}
