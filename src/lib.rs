pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod storage;
pub mod types;

pub use config::Config;
pub use engine::Coordinator;
pub use error::{CoordinatorError, ErrorKind, FleetError};
pub use types::*;
