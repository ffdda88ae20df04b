pub mod admission;
pub mod coordinator;
pub mod validation;

pub use admission::{AdmissionControl, PoolStatus};
pub use coordinator::Coordinator;
pub use validation::{check_freshness, validate_identifier, MAX_IDENTIFIER_LEN};
