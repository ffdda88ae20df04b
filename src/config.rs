use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::FleetError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub busy_timeout_ms: u64,
    /// Pool utilization (checked-out / size) at which reconciliation is refused.
    pub pool_high_water_mark: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://fleet.db".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 10,
            busy_timeout_ms: 5_000,
            pool_high_water_mark: 0.8,
        }
    }
}

impl Config {
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, FleetError> {
        let defaults = Self::default();
        let config = Self {
            database_url: std::env::var("FLEET_DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_or("FLEET_MAX_CONNECTIONS", defaults.max_connections)?,
            acquire_timeout_secs: env_or(
                "FLEET_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            )?,
            busy_timeout_ms: env_or("FLEET_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms)?,
            pool_high_water_mark: env_or(
                "FLEET_POOL_HIGH_WATER_MARK",
                defaults.pool_high_water_mark,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, FleetError> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| FleetError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FleetError::configuration(format!("cannot read config: {e}"))
                .with_context("path", path.display())
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), FleetError> {
        if self.database_url.trim().is_empty() {
            return Err(FleetError::configuration("database_url must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(FleetError::configuration(
                "max_connections must be at least 1",
            ));
        }
        if !(self.pool_high_water_mark > 0.0 && self.pool_high_water_mark <= 1.0) {
            return Err(FleetError::configuration(
                "pool_high_water_mark must be in (0, 1]",
            )
            .with_context("pool_high_water_mark", self.pool_high_water_mark));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, FleetError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            FleetError::configuration(format!("{key} is not a valid value"))
                .with_context("value", &raw)
        }),
        Err(_) => Ok(default),
    }
}
