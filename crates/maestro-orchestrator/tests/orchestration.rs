#![allow(clippy::unwrap_used)]
//! End-to-end orchestration tests.
//!
//! Wires the store, queues, registry, dispatcher, and coordinator together
//! with mock classifiers and workers, and verifies the scheduler-level
//! guarantees: dependency gating, single-winner dequeue, timeout handling,
//! retry exhaustion, escalation recovery, and cancellation.

use async_trait::async_trait;
use maestro_core::{
    Capability, Classifier, MaestroError, MaestroResult, Notifier, QueueCategory, RecoveryPolicy,
    Task, TaskPlan, TaskStatus, Worker, WorkflowStatus,
};
use maestro_orchestrator::{
    CapabilityRegistry, Dispatcher, OrchestratorConfig, QueueManager, TaskStore,
    WorkflowCoordinator,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// Classifier returning a caller-supplied plan.
struct FixedPlan(Vec<TaskPlan>);

#[async_trait]
impl Classifier for FixedPlan {
    async fn decompose(&self, _goal: &str) -> MaestroResult<Vec<TaskPlan>> {
        Ok(self.0.clone())
    }
    async fn recommend(&self, _description: &str) -> MaestroResult<QueueCategory> {
        Ok(QueueCategory::OnTarget)
    }
}

/// Worker that records execution order and asserts the dependency
/// invariant at the moment of execution.
struct TrackingWorker {
    store: Arc<TaskStore>,
    executed: Arc<Mutex<Vec<Uuid>>>,
}

#[async_trait]
impl Worker for TrackingWorker {
    async fn execute(&self, task: &Task) -> MaestroResult<String> {
        // A task must never run before all of its dependencies completed.
        for dep in &task.dependencies {
            let dep_task = self.store.get(*dep).await?;
            assert_eq!(
                dep_task.status,
                TaskStatus::Completed,
                "task {} ran before dependency {} completed",
                task.id,
                dep
            );
        }
        self.executed.lock().unwrap().push(task.id);
        Ok(format!("done: {}", task.description))
    }
}

/// Worker that never finishes within any reasonable deadline.
struct StuckWorker;

#[async_trait]
impl Worker for StuckWorker {
    async fn execute(&self, _task: &Task) -> MaestroResult<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("unreachable".into())
    }
}

/// Worker that always errors, counting invocations.
struct FailingWorker {
    calls: AtomicU32,
}

#[async_trait]
impl Worker for FailingWorker {
    async fn execute(&self, _task: &Task) -> MaestroResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MaestroError::Worker("synthetic failure".into()))
    }
}

/// Notifier that records every notification.
#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, task_id: Uuid, reason: &str) {
        self.notices.lock().unwrap().push((task_id, reason.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<TaskStore>,
    queue: Arc<QueueManager>,
    dispatcher: Arc<Dispatcher>,
    coordinator: WorkflowCoordinator,
    notifier: Arc<RecordingNotifier>,
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry_backoff_ms: 0,
        decompose_backoff_ms: 1,
        worker_timeout_ms: 10_000,
        ..Default::default()
    }
}

fn harness(plan: Vec<TaskPlan>, config: OrchestratorConfig) -> Harness {
    let store = TaskStore::new();
    let queue = QueueManager::new(Arc::clone(&store));
    let registry = CapabilityRegistry::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let (tx, rx) = mpsc::unbounded_channel();

    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&registry),
            config.clone(),
        )
        .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
        .with_escalation_sender(tx),
    );
    let coordinator = WorkflowCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::new(FixedPlan(plan)),
        config,
    )
    .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
    .with_escalation_receiver(rx);

    Harness {
        store,
        queue,
        dispatcher,
        coordinator,
        notifier,
    }
}

/// Run dispatch cycles until no progress is made and nothing is in flight.
async fn run_to_quiescence(h: &Harness) {
    loop {
        let dispatched = h.dispatcher.run_cycle().await;
        h.dispatcher.drain().await;
        if dispatched == 0 {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario: diamond dependencies — C waits for both A and B
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dependency_gating_three_tasks() {
    let plan = vec![
        TaskPlan::new("A: research"),
        TaskPlan::new("B: gather assets"),
        TaskPlan::new("C: assemble").depends_on(vec![0, 1]),
    ];
    let h = harness(plan, fast_config());

    let executed = Arc::new(Mutex::new(Vec::new()));
    h.dispatcher
        .register_worker(
            Capability::new("generalist", vec![], 1),
            Arc::new(TrackingWorker {
                store: Arc::clone(&h.store),
                executed: Arc::clone(&executed),
            }),
        )
        .await;

    let wf = h.coordinator.submit_goal("three step goal").await.unwrap();
    run_to_quiescence(&h).await;

    assert_eq!(
        h.coordinator.workflow_status(wf).await.unwrap(),
        WorkflowStatus::Completed
    );

    let tasks = h.store.workflow_tasks(wf).await.unwrap();
    let order = executed.lock().unwrap().clone();
    assert_eq!(order.len(), 3);
    // C (the dependent task) must have run last; the worker itself asserts
    // its dependencies were Completed at execution time.
    assert_eq!(order[2], tasks[2].id);
}

// ---------------------------------------------------------------------------
// Scenario: worker timeout — Failed with Timeout cause, capacity released,
// task requeued for attempt 2
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_timeout_fails_and_requeues() {
    let plan = vec![TaskPlan::new("slow render")];
    let config = OrchestratorConfig {
        worker_timeout_ms: 20,
        retry_backoff_ms: 0,
        ..Default::default()
    };
    let h = harness(plan, config);

    h.dispatcher
        .register_worker(Capability::new("render", vec![], 1), Arc::new(StuckWorker))
        .await;

    let wf = h.coordinator.submit_goal("render goal").await.unwrap();

    assert_eq!(h.dispatcher.run_cycle().await, 1);
    h.dispatcher.drain().await;

    let task = &h.store.workflow_tasks(wf).await.unwrap()[0];
    assert_eq!(
        task.last_failure,
        Some(maestro_core::FailureCause::Timeout)
    );
    assert_eq!(task.retry_count, 1);
    // Requeued: back in OnTarget for attempt 2.
    assert_eq!(task.status, TaskStatus::OnTarget);

    // Capacity was force-released: the next cycle can dispatch again.
    assert_eq!(h.dispatcher.run_cycle().await, 1);
    h.dispatcher.drain().await;
    let task = &h.store.workflow_tasks(wf).await.unwrap()[0];
    assert_eq!(task.retry_count, 2);
}

// ---------------------------------------------------------------------------
// Scenario: retry budget exhausted — escalation, workflow Failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_retry_exhaustion_escalates_and_fails_workflow() {
    let plan = vec![TaskPlan::new("doomed step")];
    let h = harness(plan, fast_config());

    let worker = Arc::new(FailingWorker {
        calls: AtomicU32::new(0),
    });
    h.dispatcher
        .register_worker(
            Capability::new("flaky", vec![], 1),
            Arc::clone(&worker) as Arc<dyn Worker>,
        )
        .await;

    let wf = h.coordinator.submit_goal("doomed goal").await.unwrap();
    run_to_quiescence(&h).await;

    // Default budget: 3 attempts, then escalation.
    assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
    let task = &h.store.workflow_tasks(wf).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Escalated);

    // Coordinator observes the escalation; with no recovery policy the
    // workflow reports Failed.
    assert_eq!(h.coordinator.process_escalations().await.unwrap(), 1);
    assert_eq!(
        h.coordinator.workflow_status(wf).await.unwrap(),
        WorkflowStatus::Failed
    );

    // The notifier heard about it.
    let notices = h.notifier.notices.lock().unwrap();
    assert!(notices.iter().any(|(id, msg)| *id == task.id && msg.contains("escalated")));
}

// ---------------------------------------------------------------------------
// Scenario: escalation recovery — replacement task completes the workflow
// ---------------------------------------------------------------------------

struct ReplacementPolicy;

#[async_trait]
impl RecoveryPolicy for ReplacementPolicy {
    async fn recover(&self, task: &Task) -> Option<TaskPlan> {
        // Route the replacement away from the capability that failed.
        Some(
            TaskPlan::new(format!("fallback for: {}", task.description))
                .with_tags(vec!["general".into()]),
        )
    }
}

#[tokio::test]
async fn test_recovery_policy_completes_workflow() {
    let plan = vec![TaskPlan::new("fragile step").with_tags(vec!["fragile".into()])];
    let mut h = harness(plan, fast_config());
    h.coordinator = h.coordinator.with_recovery(Arc::new(ReplacementPolicy));

    // The fragile capability always fails; the generalist handles the
    // untagged replacement.
    h.dispatcher
        .register_worker(
            Capability::new("fragile-cap", vec!["fragile".into()], 1),
            Arc::new(FailingWorker {
                calls: AtomicU32::new(0),
            }),
        )
        .await;
    let executed = Arc::new(Mutex::new(Vec::new()));
    h.dispatcher
        .register_worker(
            Capability::new("generalist", vec!["general".into()], 1),
            Arc::new(TrackingWorker {
                store: Arc::clone(&h.store),
                executed: Arc::clone(&executed),
            }),
        )
        .await;

    let wf = h.coordinator.submit_goal("fragile goal").await.unwrap();
    run_to_quiescence(&h).await;
    assert_eq!(h.coordinator.process_escalations().await.unwrap(), 1);
    run_to_quiescence(&h).await;

    assert_eq!(
        h.coordinator.workflow_status(wf).await.unwrap(),
        WorkflowStatus::Completed
    );
    let summary = h.coordinator.summary(wf).await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.escalated, 1);
}

// ---------------------------------------------------------------------------
// Scenario: cancellation — idle members escalate, in-flight one finishes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancellation_with_in_flight_task() {
    let plan = vec![
        TaskPlan::new("long running").with_tags(vec!["slow".into()]),
        TaskPlan::new("queued behind"),
        TaskPlan::new("also queued").in_category(QueueCategory::BackBurner),
    ];
    let config = OrchestratorConfig {
        worker_timeout_ms: 60_000,
        retry_backoff_ms: 0,
        ..Default::default()
    };
    let h = harness(plan, config);

    // Only the slow capability is registered, so members 2 and 3 stay queued.
    h.dispatcher
        .register_worker(
            Capability::new("slow-cap", vec!["slow".into()], 1),
            Arc::new(StuckWorker),
        )
        .await;

    let wf = h.coordinator.submit_goal("cancel me").await.unwrap();
    assert_eq!(h.dispatcher.run_cycle().await, 1);

    h.coordinator.cancel_workflow(wf).await.unwrap();

    let tasks = h.store.workflow_tasks(wf).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::InProgress);
    assert_eq!(tasks[1].status, TaskStatus::Escalated);
    assert_eq!(tasks[2].status, TaskStatus::Escalated);
    assert_eq!(
        h.coordinator.workflow_status(wf).await.unwrap(),
        WorkflowStatus::Failed
    );
}

// ---------------------------------------------------------------------------
// Scenario: multiple capabilities share the load, no task runs twice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_parallel_capabilities_single_execution_each() {
    let plan: Vec<TaskPlan> = (0..12).map(|i| TaskPlan::new(format!("task {i}"))).collect();
    let h = harness(plan, fast_config());

    let executed = Arc::new(Mutex::new(Vec::new()));
    for name in ["alpha", "beta", "gamma"] {
        h.dispatcher
            .register_worker(
                Capability::new(name, vec![], 2),
                Arc::new(TrackingWorker {
                    store: Arc::clone(&h.store),
                    executed: Arc::clone(&executed),
                }),
            )
            .await;
    }

    let wf = h.coordinator.submit_goal("wide goal").await.unwrap();
    run_to_quiescence(&h).await;

    assert_eq!(
        h.coordinator.workflow_status(wf).await.unwrap(),
        WorkflowStatus::Completed
    );
    let mut order = executed.lock().unwrap().clone();
    assert_eq!(order.len(), 12);
    order.sort_unstable();
    order.dedup();
    assert_eq!(order.len(), 12, "a task was executed more than once");

    let counts = h.queue.counts().await;
    assert_eq!(counts.completed, 12);
    assert_eq!(counts.in_progress, 0);
}

// ---------------------------------------------------------------------------
// Scenario: priority order within a cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_higher_priority_dispatches_first() {
    let plan = vec![
        TaskPlan::new("routine").with_priority(0),
        TaskPlan::new("urgent").with_priority(10),
    ];
    let h = harness(plan, fast_config());

    let executed = Arc::new(Mutex::new(Vec::new()));
    h.dispatcher
        .register_worker(
            Capability::new("solo", vec![], 1),
            Arc::new(TrackingWorker {
                store: Arc::clone(&h.store),
                executed: Arc::clone(&executed),
            }),
        )
        .await;

    let wf = h.coordinator.submit_goal("mixed priorities").await.unwrap();
    run_to_quiescence(&h).await;

    let tasks = h.store.workflow_tasks(wf).await.unwrap();
    let order = executed.lock().unwrap().clone();
    assert_eq!(order[0], tasks[1].id, "urgent task should dispatch first");
    assert_eq!(order[1], tasks[0].id);
}
