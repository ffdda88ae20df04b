use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;
use crate::engine::admission::PoolStatus;
use crate::storage::{StoreError, SCHEMA};

/// Builds store sessions from an explicit [`Config`].
#[derive(Debug, Clone)]
pub struct SessionFactory {
    config: Config,
}

impl SessionFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn create_session(&self) -> Result<StoreSession, StoreError> {
        let options = SqliteConnectOptions::from_str(&self.config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        log::debug!("opened store session for {}", self.config.database_url);
        Ok(StoreSession::from_pool(pool))
    }
}

/// A handle on the shared connection pool. Cloning shares the same pool.
#[derive(Debug, Clone)]
pub struct StoreSession {
    pool: SqlitePool,
}

impl StoreSession {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool_status(&self) -> PoolStatus {
        let open = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(open);
        PoolStatus {
            checked_out: open.saturating_sub(idle),
            size: self.pool.options().get_max_connections(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
