pub mod recovery;

pub use recovery::{ErrorHandler, RecoveryFn};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::storage::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Worker,
    Workspace,
    Task,
    Configuration,
    Integration,
    Persistence,
    SessionMultiplexer,
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Worker => "worker",
            ErrorKind::Workspace => "workspace",
            ErrorKind::Task => "task",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Integration => "integration",
            ErrorKind::Persistence => "persistence",
            ErrorKind::SessionMultiplexer => "session-multiplexer",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised by a collaborator or a worker lifecycle call.
///
/// The kind only classifies the failure for log filtering; every kind behaves the
/// same way when propagated or handed to an [`ErrorHandler`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct FleetError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl FleetError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Worker, message)
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Workspace, message)
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Task, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn integration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integration, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, message)
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionMultiplexer, message)
    }
}

/// Errors surfaced by the [`Coordinator`](crate::engine::Coordinator).
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("invalid worker input: {0}")]
    Validation(String),

    #[error("unauthorized worker update: {0}")]
    Authorization(String),

    #[error("conflicting worker state: {0}")]
    Conflict(String),

    #[error("store connection pool saturated: {0}")]
    Saturated(String),

    #[error(transparent)]
    Resource(#[from] FleetError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("{0}")]
    State(String),
}

impl CoordinatorError {
    pub(crate) fn not_initialized() -> Self {
        CoordinatorError::State("Coordinator not initialized; call initialize() first".into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::Resource(e) => e.kind,
            CoordinatorError::Persistence(_) | CoordinatorError::Saturated(_) => {
                ErrorKind::Persistence
            }
            _ => ErrorKind::Worker,
        }
    }
}
