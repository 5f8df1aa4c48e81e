//! Maestro command line: run content-generation goals through the
//! orchestration core with the built-in demo agents.

mod agents;

use agents::{ContentAgent, KeywordClassifier, LogNotifier, ResearchAgent};
use clap::{Parser, Subcommand};
use maestro_core::{Capability, Classifier, Notifier, TaskStatus, Worker, WorkflowStatus};
use maestro_orchestrator::{
    CapabilityRegistry, Dispatcher, OrchestratorConfig, QueueManager, TaskStore,
    WorkflowCoordinator,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro — autonomous task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a goal and print the plan without executing it
    Plan {
        /// The goal to decompose
        #[arg(long)]
        goal: String,
    },
    /// Run a goal to completion and print the workflow summary
    Run {
        /// The goal to execute
        #[arg(long)]
        goal: String,
        /// Auto-resolve delegated tasks back into the ready queue
        #[arg(long)]
        approve: bool,
        /// Give up after this many dispatch cycles
        #[arg(long, default_value_t = 400)]
        max_cycles: u32,
    },
    /// Print the configured capabilities
    Capabilities,
}

#[derive(Deserialize)]
struct MaestroConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    #[serde(default = "default_capabilities")]
    capabilities: Vec<CapabilityConfig>,
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            capabilities: default_capabilities(),
        }
    }
}

#[derive(Deserialize)]
struct CapabilityConfig {
    id: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_max_concurrent")]
    max_concurrent: u32,
}

fn default_capabilities() -> Vec<CapabilityConfig> {
    vec![
        CapabilityConfig {
            id: "researcher".into(),
            tags: vec!["research".into()],
            max_concurrent: 2,
        },
        CapabilityConfig {
            id: "writer".into(),
            tags: vec!["content".into()],
            max_concurrent: 2,
        },
        CapabilityConfig {
            id: "generalist".into(),
            tags: vec![],
            max_concurrent: 1,
        },
    ]
}

fn default_max_concurrent() -> u32 {
    2
}

/// Pick the demo worker for a capability by its tag profile.
fn worker_for(capability: &CapabilityConfig) -> Arc<dyn Worker> {
    if capability.tags.iter().any(|t| t == "research") {
        Arc::new(ResearchAgent)
    } else {
        Arc::new(ContentAgent)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config: MaestroConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(raw) => toml::from_str(&raw).map_err(|e| {
            anyhow::anyhow!("Failed to parse config '{}': {}", cli.config.display(), e)
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %cli.config.display(), "no config file, using defaults");
            MaestroConfig::default()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                cli.config.display(),
                e
            ))
        }
    };

    match cli.command {
        Commands::Plan { goal } => {
            let plan = KeywordClassifier.decompose(&goal).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Capabilities => {
            for cap in &config.capabilities {
                println!(
                    "{}  tags={:?}  max_concurrent={}",
                    cap.id, cap.tags, cap.max_concurrent
                );
            }
        }
        Commands::Run {
            goal,
            approve,
            max_cycles,
        } => {
            run_goal(config, &goal, approve, max_cycles).await?;
        }
    }

    Ok(())
}

/// Wire the full stack, submit the goal, and drive dispatch cycles until
/// the workflow reaches a terminal status or the cycle budget runs out.
async fn run_goal(
    config: MaestroConfig,
    goal: &str,
    approve: bool,
    max_cycles: u32,
) -> anyhow::Result<()> {
    let store = TaskStore::new();
    let queue = QueueManager::new(Arc::clone(&store));
    let registry = CapabilityRegistry::new();
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let (tx, rx) = mpsc::unbounded_channel();

    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::clone(&registry),
        config.orchestrator.clone(),
    )
    .with_notifier(Arc::clone(&notifier))
    .with_escalation_sender(tx);

    for cap in &config.capabilities {
        let worker = worker_for(cap);
        dispatcher
            .register_worker(
                Capability::new(cap.id.clone(), cap.tags.clone(), cap.max_concurrent),
                worker,
            )
            .await;
        info!(capability = %cap.id, tags = ?cap.tags, "capability registered");
    }

    let coordinator = WorkflowCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::new(KeywordClassifier),
        config.orchestrator.clone(),
    )
    .with_notifier(notifier)
    .with_escalation_receiver(rx);

    let workflow_id = coordinator.submit_goal(goal).await?;
    info!(workflow_id = %workflow_id, goal, "workflow started");

    let mut status = WorkflowStatus::Running;
    for cycle in 0..max_cycles {
        dispatcher.run_cycle().await;
        tokio::time::sleep(config.orchestrator.cycle_interval()).await;
        coordinator.process_escalations().await?;

        if approve {
            for task in store.workflow_tasks(workflow_id).await? {
                if task.status == TaskStatus::Delegated {
                    queue.resolve_delegation(task.id, false).await?;
                    info!(task_id = %task.id, "delegation auto-approved");
                }
            }
        }

        status = coordinator.workflow_status(workflow_id).await?;
        if status != WorkflowStatus::Running {
            info!(cycle, status = ?status, "workflow reached terminal status");
            break;
        }
    }
    dispatcher.drain().await;

    let summary = coordinator.summary(workflow_id).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if status == WorkflowStatus::Running {
        anyhow::bail!("workflow still running after {max_cycles} cycles");
    }
    Ok(())
}
