use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::FleetError;

/// Creates and removes the isolated workspace (git worktree) a worker runs in.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    async fn provision(&self, identifier: &str, branch_name: &str) -> Result<PathBuf, FleetError>;

    /// Must tolerate a workspace that is already gone.
    async fn release(&self, workspace_path: &Path) -> Result<(), FleetError>;
}

/// Drives the persistent terminal session hosting a worker's agent process.
#[async_trait]
pub trait SessionMultiplexer: Send + Sync {
    async fn open(&self, session_name: &str, working_dir: &Path) -> Result<(), FleetError>;

    /// Launches the agent inside the session and reports its process id.
    async fn launch(&self, session_name: &str) -> Result<u32, FleetError>;

    async fn interrupt(&self, session_name: &str) -> Result<(), FleetError>;

    /// Must tolerate a session that is already gone.
    async fn close(&self, session_name: &str) -> Result<(), FleetError>;
}

#[derive(Clone)]
pub struct WorkerResources {
    pub workspace: Arc<dyn WorkspaceProvisioner>,
    pub sessions: Arc<dyn SessionMultiplexer>,
}

impl WorkerResources {
    pub fn new(
        workspace: Arc<dyn WorkspaceProvisioner>,
        sessions: Arc<dyn SessionMultiplexer>,
    ) -> Self {
        Self {
            workspace,
            sessions,
        }
    }
}
