pub mod session;
pub mod sqlite;
pub mod traits;

pub use session::{SessionFactory, StoreSession};
pub use sqlite::SqlInstanceStore;
pub use traits::{
    InstanceRecord, InstanceRecordStore, NewInstanceRecord, RecordId, RecordUpdate, StoreError,
};

pub(crate) const SCHEMA: &str = include_str!("../../migrations/V001__worker_instances.sql");
