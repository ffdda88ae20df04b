pub mod health;
pub mod provisioning;
pub mod state_machine;
pub mod worker;

pub use health::{HealthMonitor, HealthRegistry};
pub use provisioning::{SessionMultiplexer, WorkerResources, WorkspaceProvisioner};
pub use state_machine::{LifecycleEvent, WorkerStateMachine};
pub use worker::WorkerInstance;
