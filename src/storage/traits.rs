use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{WorkerId, WorkerStatus};

pub type RecordId = i64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed worker record: {0}")]
    Codec(String),

    #[error("worker record {0} does not exist")]
    MissingRecord(RecordId),

    #[error("worker {0} is already recorded")]
    DuplicateIdentifier(WorkerId),
}

/// Durable counterpart of a worker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: RecordId,
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

/// Fields of a record about to be inserted. New records always start `INITIALIZING`.
#[derive(Debug, Clone)]
pub struct NewInstanceRecord {
    pub identifier: WorkerId,
    pub workspace_path: PathBuf,
    pub branch_name: String,
    pub session_name: String,
    pub process_id: Option<u32>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, Value>,
}

/// Partial update; `None` leaves the column as stored.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<WorkerStatus>,
    pub process_id: Option<Option<u32>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Persistence gateway for worker records.
///
/// Every call takes the connection to run on, so callers decide whether it runs on a
/// pooled connection or inside an open transaction.
#[async_trait]
pub trait InstanceRecordStore: Send + Sync {
    async fn create(
        &self,
        conn: &mut SqliteConnection,
        record: &NewInstanceRecord,
    ) -> Result<InstanceRecord, StoreError>;

    async fn get_by_identifier(
        &self,
        conn: &mut SqliteConnection,
        identifier: &str,
    ) -> Result<Option<InstanceRecord>, StoreError>;

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
        changes: &RecordUpdate,
    ) -> Result<InstanceRecord, StoreError>;

    /// Fails with [`StoreError::MissingRecord`] when no row was removed.
    async fn delete(&self, conn: &mut SqliteConnection, record_id: RecordId)
        -> Result<(), StoreError>;

    async fn list_all(&self, conn: &mut SqliteConnection) -> Result<Vec<InstanceRecord>, StoreError>;
}
