use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::FleetError;
use crate::lifecycle::provisioning::WorkerResources;
use crate::lifecycle::state_machine::{LifecycleEvent, WorkerStateMachine};
use crate::storage::{InstanceRecord, NewInstanceRecord};
use crate::types::{InstanceSnapshot, WorkerId, WorkerSpec, WorkerStatus};

/// One managed agent process together with its workspace and terminal session.
///
/// The public fields mirror the persisted record. Callers holding a live instance (a
/// health-check poll, for example) may overwrite `status`, `process_id` and
/// `last_activity` before pushing it back through
/// [`Coordinator::sync_worker_to_store`](crate::engine::Coordinator::sync_worker_to_store).
pub struct WorkerInstance {
    pub identifier: WorkerId,
    pub status: WorkerStatus,
    pub workspace_path: PathBuf,
    pub branch_name: String,
    pub session_name: String,
    pub process_id: Option<u32>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, Value>,
    resources: WorkerResources,
    workspace_ready: bool,
    session_ready: bool,
}

impl WorkerInstance {
    pub fn new(identifier: impl Into<WorkerId>, spec: &WorkerSpec, resources: WorkerResources) -> Self {
        let identifier = identifier.into();
        let now = Utc::now();
        Self {
            branch_name: spec.branch_for(&identifier),
            session_name: spec.session_for(&identifier),
            identifier,
            status: WorkerStatus::Initializing,
            workspace_path: PathBuf::new(),
            process_id: None,
            last_activity: now,
            created_at: now,
            metadata: spec.metadata.clone(),
            resources,
            workspace_ready: false,
            session_ready: false,
        }
    }

    /// Rebuilds an instance from its persisted record. The workspace and session are
    /// assumed to exist, so `cleanup` releases both.
    pub fn from_record(record: InstanceRecord, resources: WorkerResources) -> Self {
        Self {
            identifier: record.identifier,
            status: record.status,
            workspace_path: record.workspace_path,
            branch_name: record.branch_name,
            session_name: record.session_name,
            process_id: record.process_id,
            last_activity: record.last_activity,
            created_at: record.created_at,
            metadata: record.metadata,
            resources,
            workspace_ready: true,
            session_ready: true,
        }
    }

    pub fn to_new_record(&self) -> NewInstanceRecord {
        NewInstanceRecord {
            identifier: self.identifier.clone(),
            workspace_path: self.workspace_path.clone(),
            branch_name: self.branch_name.clone(),
            session_name: self.session_name.clone(),
            process_id: self.process_id,
            last_activity: self.last_activity,
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }

    /// Provisions the workspace, then opens the terminal session in it. Status stays
    /// `INITIALIZING`.
    pub async fn initialize(&mut self) -> Result<(), FleetError> {
        if !self.workspace_ready {
            self.workspace_path = self
                .resources
                .workspace
                .provision(&self.identifier, &self.branch_name)
                .await
                .map_err(|e| e.with_context("identifier", &self.identifier))?;
            self.workspace_ready = true;
        }

        if !self.session_ready {
            self.resources
                .sessions
                .open(&self.session_name, &self.workspace_path)
                .await
                .map_err(|e| e.with_context("identifier", &self.identifier))?;
            self.session_ready = true;
        }

        log::debug!(
            "worker {} provisioned at {}",
            self.identifier,
            self.workspace_path.display()
        );
        self.touch();
        Ok(())
    }

    pub async fn start(&mut self) -> Result<u32, FleetError> {
        if !self.session_ready {
            return Err(FleetError::worker("worker has not been initialized")
                .with_context("identifier", &self.identifier));
        }
        WorkerStateMachine::next(self.status, LifecycleEvent::Started)
            .map_err(|e| e.with_context("identifier", &self.identifier))?;

        let pid = match self.resources.sessions.launch(&self.session_name).await {
            Ok(pid) => pid,
            Err(e) => {
                WorkerStateMachine::transition(self, LifecycleEvent::Failed)?;
                return Err(e.with_context("identifier", &self.identifier));
            }
        };

        WorkerStateMachine::transition(self, LifecycleEvent::Started)?;
        self.process_id = Some(pid);
        self.touch();
        Ok(pid)
    }

    pub async fn stop(&mut self) -> Result<(), FleetError> {
        if self.session_ready && self.process_id.is_some() {
            self.resources
                .sessions
                .interrupt(&self.session_name)
                .await
                .map_err(|e| e.with_context("identifier", &self.identifier))?;
        }

        WorkerStateMachine::transition(self, LifecycleEvent::Stopped)?;
        self.process_id = None;
        self.touch();
        Ok(())
    }

    /// Releases the session and the workspace. Safe to repeat, after `stop`, and on a
    /// partially initialized instance. Both releases are attempted; the first failure
    /// is returned.
    pub async fn cleanup(&mut self) -> Result<(), FleetError> {
        let mut first_error: Option<FleetError> = None;

        if self.session_ready {
            match self.resources.sessions.close(&self.session_name).await {
                Ok(()) => {
                    self.session_ready = false;
                    self.process_id = None;
                }
                Err(e) => {
                    log::warn!("failed to close session for {}: {}", self.identifier, e);
                    first_error.get_or_insert(e.with_context("identifier", &self.identifier));
                }
            }
        }

        if self.workspace_ready {
            match self.resources.workspace.release(&self.workspace_path).await {
                Ok(()) => self.workspace_ready = false,
                Err(e) => {
                    log::warn!("failed to release workspace for {}: {}", self.identifier, e);
                    first_error.get_or_insert(e.with_context("identifier", &self.identifier));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkerStatus::Running
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            identifier: self.identifier.clone(),
            status: self.status,
            workspace_path: self.workspace_path.clone(),
            branch_name: self.branch_name.clone(),
            session_name: self.session_name.clone(),
            process_id: self.process_id,
            last_activity: self.last_activity,
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for WorkerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInstance")
            .field("identifier", &self.identifier)
            .field("status", &self.status)
            .field("workspace_path", &self.workspace_path)
            .field("branch_name", &self.branch_name)
            .field("session_name", &self.session_name)
            .field("last_activity", &self.last_activity)
            .field("workspace_ready", &self.workspace_ready)
            .field("session_ready", &self.session_ready)
            .finish_non_exhaustive()
    }
}
