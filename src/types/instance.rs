use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{WorkerId, WorkerStatus};

/// Caller-supplied fields for a new worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Defaults to the worker identifier.
    pub branch_name: Option<String>,
    /// Defaults to `fleet-<identifier>`.
    pub session_name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl WorkerSpec {
    pub fn with_branch(mut self, branch_name: impl Into<String>) -> Self {
        self.branch_name = Some(branch_name.into());
        self
    }

    pub fn with_session(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = Some(session_name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn branch_for(&self, identifier: &str) -> String {
        self.branch_name
            .clone()
            .unwrap_or_else(|| identifier.to_string())
    }

    pub fn session_for(&self, identifier: &str) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("fleet-{identifier}"))
    }
}

/// Flattened, read-only view of a worker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub identifier: WorkerId,
    pub status: WorkerStatus,
    pub workspace_path: PathBuf,
    pub branch_name: String,
    pub session_name: String,
    pub process_id: Option<u32>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, Value>,
}
