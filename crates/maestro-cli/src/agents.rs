//! Built-in demo agents: a keyword classifier and two workers.
//!
//! These exist so the binary is useful out of the box; production
//! deployments replace them with implementations backed by real models
//! and services.

use async_trait::async_trait;
use maestro_core::{Classifier, MaestroResult, QueueCategory, Task, TaskPlan, Worker};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Heuristic goal decomposition.
///
/// Every goal becomes a research step, a drafting step, and an editing
/// step chained by dependencies. Goals that mention approval gain a
/// delegated sign-off task; goals that mention "someday" or "backlog"
/// start on the back burner instead of the ready queue.
pub struct KeywordClassifier;

impl KeywordClassifier {
    fn category_for(description: &str) -> QueueCategory {
        let lower = description.to_lowercase();
        if lower.contains("approval") || lower.contains("sign-off") || lower.contains("review by") {
            QueueCategory::Delegated
        } else if lower.contains("someday") || lower.contains("backlog") {
            QueueCategory::BackBurner
        } else {
            QueueCategory::OnTarget
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn decompose(&self, goal: &str) -> MaestroResult<Vec<TaskPlan>> {
        // Only deferral applies to the whole chain; approval language adds
        // a sign-off step rather than delegating the work itself.
        let base = if Self::category_for(goal) == QueueCategory::BackBurner {
            QueueCategory::BackBurner
        } else {
            QueueCategory::OnTarget
        };
        let mut plan = vec![
            TaskPlan::new(format!("Research: {goal}"))
                .with_tags(vec!["research".into()])
                .with_priority(1)
                .in_category(base),
            TaskPlan::new(format!("Draft: {goal}"))
                .depends_on(vec![0])
                .with_tags(vec!["content".into()])
                .in_category(base),
            TaskPlan::new(format!("Edit: {goal}"))
                .depends_on(vec![1])
                .with_tags(vec!["content".into()])
                .in_category(base),
        ];
        if goal.to_lowercase().contains("approval") {
            plan.push(
                TaskPlan::new(format!("Await sign-off: {goal}"))
                    .depends_on(vec![2])
                    .in_category(QueueCategory::Delegated),
            );
        }
        Ok(plan)
    }

    async fn recommend(&self, description: &str) -> MaestroResult<QueueCategory> {
        Ok(Self::category_for(description))
    }
}

/// Simulated research agent. Pretends to gather sources for a beat.
pub struct ResearchAgent;

#[async_trait]
impl Worker for ResearchAgent {
    async fn execute(&self, task: &Task) -> MaestroResult<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!(
            "research notes ({} sources) for: {}",
            3,
            task.description
        ))
    }
}

/// Simulated content agent. Pretends to write and polish copy.
pub struct ContentAgent;

#[async_trait]
impl Worker for ContentAgent {
    async fn execute(&self, task: &Task) -> MaestroResult<String> {
        tokio::time::sleep(Duration::from_millis(80)).await;
        Ok(format!("draft copy for: {}", task.description))
    }
}

/// Notifier that reports delegations and escalations on the log stream.
pub struct LogNotifier;

#[async_trait]
impl maestro_core::Notifier for LogNotifier {
    async fn notify(&self, task_id: Uuid, reason: &str) {
        info!(task_id = %task_id, reason, "notification");
    }
}
