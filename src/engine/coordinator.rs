use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection};
use std::sync::Arc;

use crate::engine::admission::AdmissionControl;
use crate::engine::validation::{check_freshness, validate_identifier};
use crate::error::{CoordinatorError, ErrorHandler};
use crate::lifecycle::{HealthMonitor, WorkerInstance, WorkerResources};
use crate::storage::{
    InstanceRecord, InstanceRecordStore, RecordUpdate, SessionFactory, SqlInstanceStore,
    StoreError, StoreSession,
};
use crate::types::{WorkerSpec, WorkerStatus};

enum SessionHandle {
    /// Created by the coordinator and closed on shutdown.
    Owned(StoreSession),
    /// Supplied by the caller; never closed here.
    Borrowed(StoreSession),
}

impl SessionHandle {
    fn session(&self) -> &StoreSession {
        match self {
            SessionHandle::Owned(s) | SessionHandle::Borrowed(s) => s,
        }
    }
}

/// Drives worker lifecycles against the shared instance store.
///
/// The coordinator keeps no cache of its own: every query reads the store, so
/// coordinators in different processes pointed at the same database agree on the
/// fleet. Creation provisions resources before persisting the record; destruction
/// deletes the record before releasing resources.
pub struct Coordinator {
    session: Option<SessionHandle>,
    store: Arc<dyn InstanceRecordStore>,
    resources: WorkerResources,
    health_monitor: Option<Arc<dyn HealthMonitor>>,
    registration: ErrorHandler<WorkerInstance, ()>,
    admission: AdmissionControl,
    initialized: bool,
}

impl Coordinator {
    /// Opens a new session from `factory`; the coordinator owns and closes it.
    pub async fn connect(
        factory: &SessionFactory,
        resources: WorkerResources,
    ) -> Result<Self, CoordinatorError> {
        factory.config().validate()?;
        let session = factory.create_session().await?;
        let mut coordinator = Self::build(SessionHandle::Owned(session), resources);
        coordinator.admission = AdmissionControl::new(factory.config().pool_high_water_mark);
        Ok(coordinator)
    }

    /// Uses a caller-supplied session, which stays open after [`Coordinator::shutdown`].
    pub fn with_session(session: StoreSession, resources: WorkerResources) -> Self {
        Self::build(SessionHandle::Borrowed(session), resources)
    }

    fn build(session: SessionHandle, resources: WorkerResources) -> Self {
        Self {
            session: Some(session),
            store: Arc::new(SqlInstanceStore::new()),
            resources,
            health_monitor: None,
            registration: ErrorHandler::swallowing(),
            admission: AdmissionControl::default(),
            initialized: false,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn InstanceRecordStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_health_monitor(mut self, monitor: Arc<dyn HealthMonitor>) -> Self {
        self.health_monitor = Some(monitor);
        self
    }

    /// Replaces the handler wrapping health-monitor registration, e.g. to add a
    /// recovery for integration failures. Its outcome never fails a coordinator call.
    pub fn with_registration_handler(mut self, handler: ErrorHandler<WorkerInstance, ()>) -> Self {
        self.registration = handler;
        self
    }

    pub fn with_admission(mut self, admission: AdmissionControl) -> Self {
        self.admission = admission;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn owns_session(&self) -> bool {
        matches!(self.session, Some(SessionHandle::Owned(_)))
    }

    pub fn session(&self) -> Option<&StoreSession> {
        self.session.as_ref().map(SessionHandle::session)
    }

    pub async fn initialize(&mut self) -> Result<(), CoordinatorError> {
        let session = self.require_session()?.clone();
        session.run_migrations().await?;
        self.initialized = true;

        if self.health_monitor.is_some() {
            self.register_running_workers().await;
        }

        log::info!(
            "coordinator initialized ({} session)",
            if self.owns_session() { "owned" } else { "borrowed" }
        );
        Ok(())
    }

    /// Closes the session if this coordinator created it. Further mutating calls fail
    /// and reads come back empty.
    pub async fn shutdown(&mut self) {
        self.initialized = false;
        match self.session.take() {
            Some(SessionHandle::Owned(session)) => {
                session.close().await;
                log::info!("coordinator shut down, owned session closed");
            }
            Some(SessionHandle::Borrowed(_)) => {
                log::info!("coordinator shut down, borrowed session left open");
            }
            None => {}
        }
    }

    pub async fn create_worker(
        &self,
        identifier: &str,
        spec: WorkerSpec,
    ) -> Result<WorkerInstance, CoordinatorError> {
        if !self.initialized {
            return Err(CoordinatorError::not_initialized());
        }
        validate_identifier(identifier)?;

        {
            let mut conn = self.connection().await?;
            if self
                .store
                .get_by_identifier(&mut conn, identifier)
                .await?
                .is_some()
            {
                return Err(CoordinatorError::Conflict(format!(
                    "worker {identifier} already exists"
                )));
            }
        }

        let mut instance = WorkerInstance::new(identifier, &spec, self.resources.clone());
        if let Err(e) = instance.initialize().await {
            log::error!("provisioning failed for {}: {}", identifier, e);
            if let Err(cleanup_error) = instance.cleanup().await {
                log::warn!(
                    "cleanup after failed provisioning of {} also failed: {}",
                    identifier,
                    cleanup_error
                );
            }
            return Err(e.into());
        }

        match self.persist_new(&instance).await {
            Ok(record) => {
                log::info!("created worker {} on branch {}", identifier, record.branch_name);
                Ok(self.hydrate(record))
            }
            Err(StoreError::DuplicateIdentifier(_)) => {
                // Another coordinator persisted this identifier after our check. Its
                // record now points at the same workspace and session, so they stay.
                log::warn!("worker {} was created concurrently elsewhere", identifier);
                Err(CoordinatorError::Conflict(format!(
                    "worker {identifier} already exists"
                )))
            }
            Err(e) => {
                log::error!("persisting worker {} failed: {}", identifier, e);
                if let Err(cleanup_error) = instance.cleanup().await {
                    log::warn!(
                        "cleanup after failed persist of {} also failed: {}",
                        identifier,
                        cleanup_error
                    );
                }
                Err(CoordinatorError::Persistence(e))
            }
        }
    }

    pub async fn get_worker(
        &self,
        identifier: &str,
    ) -> Result<Option<WorkerInstance>, CoordinatorError> {
        if !self.initialized || validate_identifier(identifier).is_err() {
            return Ok(None);
        }

        let mut conn = self.connection().await?;
        let record = self.store.get_by_identifier(&mut conn, identifier).await?;
        drop(conn);

        let Some(record) = record else {
            return Ok(None);
        };
        let instance = self.hydrate(record);
        if instance.is_running() {
            self.register_with_monitor(&instance);
        }
        Ok(Some(instance))
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerInstance>, CoordinatorError> {
        if !self.initialized {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let records = self.store.list_all(&mut conn).await?;
        Ok(records.into_iter().map(|r| self.hydrate(r)).collect())
    }

    /// Deletes the record, then releases the worker's resources. Returns `false` when
    /// there was nothing to delete or the delete itself failed.
    pub async fn destroy_worker(&self, identifier: &str) -> Result<bool, CoordinatorError> {
        if !self.initialized {
            return Err(CoordinatorError::not_initialized());
        }
        if validate_identifier(identifier).is_err() {
            return Ok(false);
        }

        let mut conn = self.connection().await?;
        let Some(record) = self.store.get_by_identifier(&mut conn, identifier).await? else {
            return Ok(false);
        };

        if let Err(e) = self.store.delete(&mut conn, record.id).await {
            log::error!("deleting worker {} failed: {}", identifier, e);
            return Ok(false);
        }
        drop(conn);

        let mut instance = self.hydrate(record);
        if let Err(e) = instance.cleanup().await {
            log::warn!(
                "worker {} removed from store but resource cleanup failed: {}",
                identifier,
                e
            );
        }

        log::info!("destroyed worker {}", identifier);
        Ok(true)
    }

    /// Explicit status transition of a persisted worker. Returns `false` when no record
    /// exists for `identifier`.
    pub async fn update_worker_status(
        &self,
        identifier: &str,
        status: WorkerStatus,
    ) -> Result<bool, CoordinatorError> {
        if !self.initialized {
            return Err(CoordinatorError::not_initialized());
        }
        validate_identifier(identifier)?;
        if status == WorkerStatus::Initializing {
            return Err(CoordinatorError::Validation(
                "INITIALIZING is only valid when a worker is created".into(),
            ));
        }

        let mut tx = self
            .require_session()?
            .pool()
            .begin()
            .await
            .map_err(StoreError::from)?;
        match self.apply_status(&mut tx, identifier, status).await {
            Ok(Some(previous)) => {
                tx.commit().await.map_err(StoreError::from)?;
                log::info!("worker {} status {} -> {}", identifier, previous, status);
                Ok(true)
            }
            Ok(None) => {
                tx.rollback().await.map_err(StoreError::from)?;
                Ok(false)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    log::warn!(
                        "rollback of status update for {} failed: {}",
                        identifier,
                        rollback_error
                    );
                }
                Err(e)
            }
        }
    }

    /// Returns the previous status, or `None` when no record exists.
    async fn apply_status(
        &self,
        conn: &mut SqliteConnection,
        identifier: &str,
        status: WorkerStatus,
    ) -> Result<Option<WorkerStatus>, CoordinatorError> {
        let Some(record) = self.store.get_by_identifier(conn, identifier).await? else {
            return Ok(None);
        };

        let changes = RecordUpdate {
            status: Some(status),
            process_id: (status != WorkerStatus::Running).then_some(None),
            last_activity: Some(Utc::now().max(record.last_activity)),
        };
        self.store.update(conn, record.id, &changes).await?;
        Ok(Some(record.status))
    }

    /// Pushes a live-observed worker state back into the store.
    ///
    /// Never fails loudly: every rejection (bad identifier, pool saturation, unknown
    /// worker, stale observation, store error) is logged and reported as `false`.
    pub async fn sync_worker_to_store(&self, instance: Option<&WorkerInstance>) -> bool {
        let Some(instance) = instance else {
            log::warn!("sync rejected: no worker instance supplied");
            return false;
        };

        match self.reconcile(instance).await {
            Ok(status) => {
                log::info!(
                    "sync completed for {}: stored status now {}",
                    instance.identifier,
                    status
                );
                true
            }
            Err(e) => {
                log::warn!("sync rejected for {:?}: {}", instance.identifier, e);
                false
            }
        }
    }

    async fn reconcile(&self, instance: &WorkerInstance) -> Result<WorkerStatus, CoordinatorError> {
        if !self.initialized {
            return Err(CoordinatorError::not_initialized());
        }
        let session = self.require_session()?;
        validate_identifier(&instance.identifier)?;
        self.admission.admit(session.pool_status())?;

        let mut tx = session.pool().begin().await.map_err(StoreError::from)?;
        match self.apply_observation(&mut tx, instance).await {
            Ok(status) => {
                tx.commit().await.map_err(StoreError::from)?;
                Ok(status)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    log::warn!(
                        "rollback of sync for {} failed: {}",
                        instance.identifier,
                        rollback_error
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply_observation(
        &self,
        conn: &mut SqliteConnection,
        instance: &WorkerInstance,
    ) -> Result<WorkerStatus, CoordinatorError> {
        let record = self
            .store
            .get_by_identifier(conn, &instance.identifier)
            .await?
            .ok_or_else(|| {
                CoordinatorError::Authorization(format!(
                    "worker {} was never created through this store",
                    instance.identifier
                ))
            })?;

        log::info!(
            "sync started for {}: in-memory status {} vs stored {}",
            instance.identifier,
            instance.status,
            record.status
        );

        check_freshness(record.last_activity, instance.last_activity)?;

        let changes = RecordUpdate {
            status: Some(instance.status),
            process_id: Some(instance.process_id),
            last_activity: Some(instance.last_activity),
        };
        let updated = self.store.update(conn, record.id, &changes).await?;
        Ok(updated.status)
    }

    async fn persist_new(&self, instance: &WorkerInstance) -> Result<InstanceRecord, StoreError> {
        let session = self
            .session()
            .ok_or_else(|| StoreError::Database(sqlx::Error::PoolClosed))?;
        let mut conn = session.pool().acquire().await?;
        self.store.create(&mut conn, &instance.to_new_record()).await
    }

    async fn register_running_workers(&self) {
        let records = match self.connection().await {
            Ok(mut conn) => self.store.list_all(&mut conn).await,
            Err(e) => {
                log::warn!("skipping health registration, no connection: {}", e);
                return;
            }
        };

        match records {
            Ok(records) => {
                for record in records
                    .into_iter()
                    .filter(|r| r.status == WorkerStatus::Running)
                {
                    let instance = self.hydrate(record);
                    self.register_with_monitor(&instance);
                }
            }
            Err(e) => log::warn!("skipping health registration, listing failed: {}", e),
        }
    }

    fn register_with_monitor(&self, instance: &WorkerInstance) {
        let Some(monitor) = &self.health_monitor else {
            return;
        };
        if let Err(e) = self
            .registration
            .run(instance, |w| monitor.register_instance(w))
        {
            log::warn!(
                "health monitor registration failed for {}: {}",
                instance.identifier,
                e
            );
        }
    }

    fn hydrate(&self, record: InstanceRecord) -> WorkerInstance {
        WorkerInstance::from_record(record, self.resources.clone())
    }

    fn require_session(&self) -> Result<&StoreSession, CoordinatorError> {
        self.session()
            .ok_or_else(|| CoordinatorError::State("Coordinator has no store session".into()))
    }

    async fn connection(&self) -> Result<PoolConnection<Sqlite>, CoordinatorError> {
        let conn = self
            .require_session()?
            .pool()
            .acquire()
            .await
            .map_err(StoreError::from)?;
        Ok(conn)
    }
}
