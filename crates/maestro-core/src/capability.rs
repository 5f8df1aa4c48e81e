use serde::{Deserialize, Serialize};

/// Health state of a capability, as reported by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// Accepting work.
    Healthy,
    /// Alive but impaired; not offered new work.
    Degraded,
    /// Not reachable.
    Unavailable,
}

/// An executable skill (agent or tool) that can claim and complete tasks
/// matching its tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Unique capability identifier.
    pub id: String,
    /// Skill tags matched against task requirements.
    pub tags: Vec<String>,
    /// Maximum number of concurrent executions.
    pub max_concurrent: u32,
    /// Current health, updated by [`crate::collab`] heartbeats.
    pub health: Health,
}

impl Capability {
    /// Create a healthy capability with the given tags and concurrency limit.
    pub fn new(id: impl Into<String>, tags: Vec<String>, max_concurrent: u32) -> Self {
        Self {
            id: id.into(),
            tags,
            max_concurrent,
            health: Health::Healthy,
        }
    }

    /// Whether this capability covers every tag a task requires.
    ///
    /// A task with no tags can be claimed by any capability.
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers_subset() {
        let cap = Capability::new(
            "content-writer",
            vec!["content".into(), "copywriting".into()],
            2,
        );
        assert!(cap.covers(&["content".into()]));
        assert!(cap.covers(&["content".into(), "copywriting".into()]));
        assert!(!cap.covers(&["research".into()]));
    }

    #[test]
    fn test_untagged_task_matches_anything() {
        let cap = Capability::new("generalist", vec![], 1);
        assert!(cap.covers(&[]));
        assert!(!cap.covers(&["video".into()]));
    }

    #[test]
    fn test_new_is_healthy() {
        let cap = Capability::new("researcher", vec!["research".into()], 4);
        assert_eq!(cap.health, Health::Healthy);
        assert_eq!(cap.max_concurrent, 4);
    }
}
