//! Shared doubles for coordinator integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use fleetkeeper::engine::Coordinator;
use fleetkeeper::error::FleetError;
use fleetkeeper::lifecycle::{
    HealthMonitor, SessionMultiplexer, WorkerInstance, WorkerResources, WorkspaceProvisioner,
};
use fleetkeeper::storage::{
    InstanceRecord, InstanceRecordStore, NewInstanceRecord, RecordId, RecordUpdate,
    SessionFactory, SqlInstanceStore, StoreError, StoreSession,
};
use fleetkeeper::Config;

/// A database file in a temp dir, removed when the guard drops.
pub struct TestDatabase {
    _dir: TempDir,
    pub factory: SessionFactory,
}

impl TestDatabase {
    pub fn new() -> Self {
        Self::with_pool_size(5)
    }

    pub fn with_pool_size(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("fleet.db").display());
        let factory = SessionFactory::new(Config {
            max_connections,
            ..Config::for_database(url)
        });
        Self { _dir: dir, factory }
    }

    pub async fn coordinator(&self, fakes: &Fakes) -> Coordinator {
        let mut coordinator = Coordinator::connect(&self.factory, fakes.resources())
            .await
            .expect("connect");
        coordinator.initialize().await.expect("initialize");
        coordinator
    }

    pub async fn session(&self) -> StoreSession {
        self.factory.create_session().await.expect("session")
    }
}

#[derive(Default)]
pub struct FakeWorkspace {
    pub provisioned: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_release: bool,
}

#[async_trait]
impl WorkspaceProvisioner for FakeWorkspace {
    async fn provision(&self, identifier: &str, _branch: &str) -> Result<PathBuf, FleetError> {
        self.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("/worktrees/{identifier}")))
    }

    async fn release(&self, _path: &Path) -> Result<(), FleetError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(FleetError::workspace("worktree is locked"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSessions {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

#[async_trait]
impl SessionMultiplexer for FakeSessions {
    async fn open(&self, _session: &str, _dir: &Path) -> Result<(), FleetError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn launch(&self, _session: &str) -> Result<u32, FleetError> {
        Ok(31337)
    }

    async fn interrupt(&self, _session: &str) -> Result<(), FleetError> {
        Ok(())
    }

    async fn close(&self, _session: &str) -> Result<(), FleetError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct Fakes {
    pub workspace: Arc<FakeWorkspace>,
    pub sessions: Arc<FakeSessions>,
}

impl Fakes {
    pub fn failing_release() -> Self {
        Self {
            workspace: Arc::new(FakeWorkspace {
                fail_release: true,
                ..FakeWorkspace::default()
            }),
            sessions: Arc::default(),
        }
    }

    pub fn resources(&self) -> WorkerResources {
        WorkerResources::new(self.workspace.clone(), self.sessions.clone())
    }

    pub fn released(&self) -> usize {
        self.workspace.released.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.sessions.closed.load(Ordering::SeqCst)
    }
}

/// Delegates to [`SqlInstanceStore`] but fails the selected operations.
#[derive(Default)]
pub struct FlakyStore {
    pub fail_create: bool,
    pub fail_lookup: bool,
    pub fail_delete: bool,
    pub inner: SqlInstanceStore,
}

pub fn injected(message: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(message.to_string()))
}

#[async_trait]
impl InstanceRecordStore for FlakyStore {
    async fn create(
        &self,
        conn: &mut SqliteConnection,
        record: &NewInstanceRecord,
    ) -> Result<InstanceRecord, StoreError> {
        if self.fail_create {
            return Err(injected("disk I/O error"));
        }
        self.inner.create(conn, record).await
    }

    async fn get_by_identifier(
        &self,
        conn: &mut SqliteConnection,
        identifier: &str,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        if self.fail_lookup {
            return Err(injected("database is locked"));
        }
        self.inner.get_by_identifier(conn, identifier).await
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
        changes: &RecordUpdate,
    ) -> Result<InstanceRecord, StoreError> {
        self.inner.update(conn, record_id, changes).await
    }

    async fn delete(&self, conn: &mut SqliteConnection, record_id: RecordId) -> Result<(), StoreError> {
        if self.fail_delete {
            return Err(injected("constraint failed"));
        }
        self.inner.delete(conn, record_id).await
    }

    async fn list_all(&self, conn: &mut SqliteConnection) -> Result<Vec<InstanceRecord>, StoreError> {
        self.inner.list_all(conn).await
    }
}

pub struct UnreachableMonitor {
    pub attempts: AtomicUsize,
}

impl HealthMonitor for UnreachableMonitor {
    fn register_instance(&self, _instance: &WorkerInstance) -> Result<(), FleetError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(FleetError::integration("health monitor unreachable"))
    }
}

/// Waits for returned pool connections to settle back to idle.
pub async fn wait_for_idle(session: &StoreSession) {
    for _ in 0..100 {
        if session.pool_status().checked_out == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn identifiers(workers: &[WorkerInstance]) -> Vec<String> {
    let mut ids: Vec<String> = workers.iter().map(|w| w.identifier.clone()).collect();
    ids.sort();
    ids
}
