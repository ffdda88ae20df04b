use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::FleetError;
use crate::lifecycle::WorkerInstance;
use crate::types::{InstanceSnapshot, WorkerId};

/// Tracks live workers. Registration is best-effort from the coordinator's side.
pub trait HealthMonitor: Send + Sync {
    fn register_instance(&self, instance: &WorkerInstance) -> Result<(), FleetError>;
}

/// In-process [`HealthMonitor`] keeping the latest snapshot per worker.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    tracked: RwLock<HashMap<WorkerId, InstanceSnapshot>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracked(&self, identifier: &str) -> bool {
        self.tracked
            .read()
            .map(|tracked| tracked.contains_key(identifier))
            .unwrap_or(false)
    }

    pub fn tracked(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots: Vec<InstanceSnapshot> = self
            .tracked
            .read()
            .map(|tracked| tracked.values().cloned().collect())
            .unwrap_or_default();
        snapshots.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        snapshots
    }

    pub fn unregister(&self, identifier: &str) -> Option<InstanceSnapshot> {
        self.tracked
            .write()
            .ok()
            .and_then(|mut tracked| tracked.remove(identifier))
    }
}

impl HealthMonitor for HealthRegistry {
    fn register_instance(&self, instance: &WorkerInstance) -> Result<(), FleetError> {
        let mut tracked = self
            .tracked
            .write()
            .map_err(|_| FleetError::integration("health registry lock poisoned"))?;
        tracked.insert(instance.identifier.clone(), instance.snapshot());
        Ok(())
    }
}
