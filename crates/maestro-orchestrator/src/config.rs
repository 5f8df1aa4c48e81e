use serde::Deserialize;
use std::time::Duration;

/// Tunable knobs for the dispatcher and the workflow coordinator.
///
/// All fields are defaulted so a toml section can set only what it needs.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Failed attempts before a task escalates.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for a single worker invocation.
    #[serde(default = "default_worker_timeout_ms")]
    pub worker_timeout_ms: u64,
    /// Base retry backoff; doubles per failed attempt. Defaults to one
    /// scheduling cycle, the backoff floor.
    #[serde(default = "default_cycle_interval_ms")]
    pub retry_backoff_ms: u64,
    /// Interval between dispatch cycles.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Attempts to reach the classifier before giving up on a goal.
    #[serde(default = "default_decompose_max_attempts")]
    pub decompose_max_attempts: u32,
    /// Pause between classifier attempts.
    #[serde(default = "default_decompose_backoff_ms")]
    pub decompose_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_worker_timeout_ms() -> u64 {
    30_000
}
fn default_cycle_interval_ms() -> u64 {
    250
}
fn default_decompose_max_attempts() -> u32 {
    5
}
fn default_decompose_backoff_ms() -> u64 {
    1_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            worker_timeout_ms: default_worker_timeout_ms(),
            retry_backoff_ms: default_cycle_interval_ms(),
            cycle_interval_ms: default_cycle_interval_ms(),
            decompose_max_attempts: default_decompose_max_attempts(),
            decompose_backoff_ms: default_decompose_backoff_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Worker invocation deadline.
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    /// Interval between dispatch cycles.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// Pause between classifier attempts.
    pub fn decompose_backoff(&self) -> Duration {
        Duration::from_millis(self.decompose_backoff_ms)
    }

    /// Exponential backoff before retry attempt `retry_count` runs:
    /// base * 2^(retry_count - 1), floored at the base (one cycle).
    pub fn retry_backoff_for(&self, retry_count: u32) -> chrono::Duration {
        let factor = 1u64 << retry_count.saturating_sub(1).min(16);
        chrono::Duration::milliseconds((self.retry_backoff_ms.saturating_mul(factor)) as i64)
    }
}
