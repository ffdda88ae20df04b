pub mod instance;

pub use instance::{InstanceSnapshot, WorkerSpec};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type WorkerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Initializing, // Resources provisioned, agent not launched yet
    Running,
    Stopped,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkerStatus::Initializing => "INITIALIZING",
            WorkerStatus::Running => "RUNNING",
            WorkerStatus::Stopped => "STOPPED",
            WorkerStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown worker status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for WorkerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIALIZING" => Ok(WorkerStatus::Initializing),
            "RUNNING" => Ok(WorkerStatus::Running),
            "STOPPED" => Ok(WorkerStatus::Stopped),
            "ERROR" => Ok(WorkerStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
