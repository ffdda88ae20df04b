use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::storage::traits::{
    InstanceRecord, InstanceRecordStore, NewInstanceRecord, RecordId, RecordUpdate, StoreError,
};
use crate::types::WorkerStatus;

/// [`InstanceRecordStore`] over the `worker_instances` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlInstanceStore;

impl SqlInstanceStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InstanceRecordStore for SqlInstanceStore {
    async fn create(
        &self,
        conn: &mut SqliteConnection,
        record: &NewInstanceRecord,
    ) -> Result<InstanceRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO worker_instances (
                identifier, status, workspace_path, branch_name, session_name,
                process_id, last_activity, created_at, metadata
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, identifier, status, workspace_path, branch_name, session_name,
                      process_id, last_activity, created_at, metadata
            "#,
        )
        .bind(&record.identifier)
        .bind(WorkerStatus::Initializing.as_str())
        .bind(record.workspace_path.to_string_lossy().into_owned())
        .bind(&record.branch_name)
        .bind(&record.session_name)
        .bind(record.process_id.map(i64::from))
        .bind(record.last_activity)
        .bind(record.created_at)
        .bind(Json(&record.metadata))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateIdentifier(record.identifier.clone())
            }
            other => StoreError::Database(other),
        })?;

        row_to_record(&row)
    }

    async fn get_by_identifier(
        &self,
        conn: &mut SqliteConnection,
        identifier: &str,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, identifier, status, workspace_path, branch_name, session_name,
                   process_id, last_activity, created_at, metadata
            FROM worker_instances
            WHERE identifier = ?
            "#,
        )
        .bind(identifier)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_record(&r)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
        changes: &RecordUpdate,
    ) -> Result<InstanceRecord, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE worker_instances
            SET status = COALESCE(?, status),
                process_id = CASE WHEN ? THEN ? ELSE process_id END,
                last_activity = COALESCE(?, last_activity)
            WHERE id = ?
            RETURNING id, identifier, status, workspace_path, branch_name, session_name,
                      process_id, last_activity, created_at, metadata
            "#,
        )
        .bind(changes.status.as_ref().map(WorkerStatus::as_str))
        .bind(changes.process_id.is_some())
        .bind(changes.process_id.flatten().map(i64::from))
        .bind(changes.last_activity)
        .bind(record_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(r) => row_to_record(&r),
            None => Err(StoreError::MissingRecord(record_id)),
        }
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM worker_instances WHERE id = ?")
            .bind(record_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRecord(record_id));
        }
        Ok(())
    }

    async fn list_all(&self, conn: &mut SqliteConnection) -> Result<Vec<InstanceRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, identifier, status, workspace_path, branch_name, session_name,
                   process_id, last_activity, created_at, metadata
            FROM worker_instances
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(r: &SqliteRow) -> Result<InstanceRecord, StoreError> {
    let status_str: String = r.try_get("status")?;
    let status = status_str
        .parse::<WorkerStatus>()
        .map_err(|e| StoreError::Codec(e.to_string()))?;

    let process_id = match r.try_get::<Option<i64>, _>("process_id")? {
        Some(pid) => Some(
            u32::try_from(pid)
                .map_err(|_| StoreError::Codec(format!("process id {pid} out of range")))?,
        ),
        None => None,
    };

    let workspace_path: String = r.try_get("workspace_path")?;
    let metadata: Json<BTreeMap<String, Value>> = r.try_get("metadata")?;

    Ok(InstanceRecord {
        id: r.try_get("id")?,
        identifier: r.try_get("identifier")?,
        status,
        workspace_path: PathBuf::from(workspace_path),
        branch_name: r.try_get("branch_name")?,
        session_name: r.try_get("session_name")?,
        process_id,
        last_activity: r.try_get("last_activity")?,
        created_at: r.try_get("created_at")?,
        metadata: metadata.0,
    })
}
