use maestro_core::{Capability, Health, MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A registered capability plus its live concurrency counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    /// The capability descriptor as registered (health included).
    pub capability: Capability,
    /// How many executions this capability currently has in flight.
    pub in_flight: u32,
}

struct Slot {
    capability: Capability,
    in_flight: u32,
}

/// Holds the set of executable capabilities, their declared skills,
/// concurrency limits, and health state.
///
/// The registry exclusively owns the live in-flight counters; acquisition
/// and release are atomic under the registry lock, so a counter can never
/// exceed its capability's configured limit.
pub struct CapabilityRegistry {
    slots: RwLock<HashMap<String, Slot>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Register (or re-register) a capability. Re-registration replaces the
    /// descriptor but preserves the in-flight count.
    pub async fn register(&self, capability: Capability) {
        let mut slots = self.slots.write().await;
        let id = capability.id.clone();
        match slots.get_mut(&id) {
            Some(slot) => slot.capability = capability,
            None => {
                slots.insert(
                    id.clone(),
                    Slot {
                        capability,
                        in_flight: 0,
                    },
                );
            }
        }
        debug!(capability = %id, "capability registered");
    }

    /// Update a capability's health from a heartbeat.
    pub async fn heartbeat(&self, capability_id: &str, health: Health) -> MaestroResult<()> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(capability_id)
            .ok_or_else(|| MaestroError::CapabilityNotFound(capability_id.to_string()))?;
        slot.capability.health = health;
        Ok(())
    }

    /// Atomically reserve one execution slot.
    ///
    /// Returns `true` and increments the in-flight count iff the capability
    /// is registered, `Healthy`, and under its concurrency limit.
    pub async fn try_acquire(&self, capability_id: &str) -> bool {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(capability_id) else {
            return false;
        };
        if slot.capability.health != Health::Healthy {
            return false;
        }
        if slot.in_flight >= slot.capability.max_concurrent {
            return false;
        }
        slot.in_flight += 1;
        true
    }

    /// Release one execution slot.
    ///
    /// A release without a matching acquire is logged and otherwise
    /// ignored, so a double-release bug in the dispatcher can never drive
    /// the counter negative.
    pub async fn release(&self, capability_id: &str) {
        let mut slots = self.slots.write().await;
        match slots.get_mut(capability_id) {
            Some(slot) if slot.in_flight > 0 => slot.in_flight -= 1,
            Some(_) => {
                warn!(capability = %capability_id, "release without matching acquire");
            }
            None => {
                warn!(capability = %capability_id, "release for unknown capability");
            }
        }
    }

    /// The descriptor for a single capability.
    pub async fn get(&self, capability_id: &str) -> Option<Capability> {
        let slots = self.slots.read().await;
        slots.get(capability_id).map(|s| s.capability.clone())
    }

    /// Snapshot of every registered capability and its in-flight count.
    pub async fn snapshot(&self) -> Vec<CapabilitySnapshot> {
        let slots = self.slots.read().await;
        let mut all: Vec<CapabilitySnapshot> = slots
            .values()
            .map(|s| CapabilitySnapshot {
                capability: s.capability.clone(),
                in_flight: s.in_flight,
            })
            .collect();
        all.sort_by(|a, b| a.capability.id.cmp(&b.capability.id));
        all
    }
}
