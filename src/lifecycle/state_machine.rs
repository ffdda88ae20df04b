use serde::{Deserialize, Serialize};

use crate::error::FleetError;
use crate::lifecycle::WorkerInstance;
use crate::types::WorkerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Started,
    Stopped,
    Failed,
}

pub struct WorkerStateMachine;

impl WorkerStateMachine {
    pub fn next(status: WorkerStatus, event: LifecycleEvent) -> Result<WorkerStatus, FleetError> {
        let next = match (status, event) {
            (WorkerStatus::Initializing | WorkerStatus::Stopped, LifecycleEvent::Started) => {
                WorkerStatus::Running
            }
            (_, LifecycleEvent::Stopped) => WorkerStatus::Stopped,
            (_, LifecycleEvent::Failed) => WorkerStatus::Error,
            _ => {
                return Err(FleetError::worker(format!(
                    "Invalid state transition from {status} with event {event:?}"
                )));
            }
        };
        Ok(next)
    }

    pub fn transition(
        instance: &mut WorkerInstance,
        event: LifecycleEvent,
    ) -> Result<WorkerStatus, FleetError> {
        let next = Self::next(instance.status, event)
            .map_err(|e| e.with_context("identifier", &instance.identifier))?;
        instance.status = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initializing_to_running() {
        let next = WorkerStateMachine::next(WorkerStatus::Initializing, LifecycleEvent::Started);
        assert_eq!(next.unwrap(), WorkerStatus::Running);
    }

    #[test]
    fn test_restart_after_stop() {
        let next = WorkerStateMachine::next(WorkerStatus::Stopped, LifecycleEvent::Started);
        assert_eq!(next.unwrap(), WorkerStatus::Running);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let next = WorkerStateMachine::next(WorkerStatus::Stopped, LifecycleEvent::Stopped);
        assert_eq!(next.unwrap(), WorkerStatus::Stopped);
    }

    #[test]
    fn test_any_state_can_fail() {
        for status in [
            WorkerStatus::Initializing,
            WorkerStatus::Running,
            WorkerStatus::Stopped,
        ] {
            let next = WorkerStateMachine::next(status, LifecycleEvent::Failed);
            assert_eq!(next.unwrap(), WorkerStatus::Error);
        }
    }

    #[test]
    fn test_invalid_transition() {
        assert!(WorkerStateMachine::next(WorkerStatus::Running, LifecycleEvent::Started).is_err());
        assert!(WorkerStateMachine::next(WorkerStatus::Error, LifecycleEvent::Started).is_err());
    }
}
