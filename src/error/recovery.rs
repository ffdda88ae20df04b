use std::collections::HashMap;

use super::{ErrorKind, FleetError};

pub type RecoveryFn<A, T> = Box<dyn Fn(&A) -> Result<T, FleetError> + Send + Sync>;

/// Runs an operation and routes its failure through a table of recovery functions
/// keyed by [`ErrorKind`].
///
/// A failing recovery is logged and discarded: the caller always sees the original
/// failure, or `None` when propagation is switched off.
pub struct ErrorHandler<A, T> {
    strategies: HashMap<ErrorKind, RecoveryFn<A, T>>,
    propagate: bool,
}

impl<A, T> ErrorHandler<A, T> {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            propagate: true,
        }
    }

    /// A handler that logs failures and yields `None` instead of returning them.
    pub fn swallowing() -> Self {
        Self::new().propagate(false)
    }

    pub fn propagate(mut self, propagate: bool) -> Self {
        self.propagate = propagate;
        self
    }

    pub fn with_recovery<F>(mut self, kind: ErrorKind, recovery: F) -> Self
    where
        F: Fn(&A) -> Result<T, FleetError> + Send + Sync + 'static,
    {
        self.strategies.insert(kind, Box::new(recovery));
        self
    }

    pub fn run<F>(&self, args: &A, operation: F) -> Result<Option<T>, FleetError>
    where
        F: FnOnce(&A) -> Result<T, FleetError>,
    {
        let error = match operation(args) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => e,
        };

        log::warn!(
            "{} failure: {} (context: {:?})",
            error.kind,
            error.message,
            error.context
        );

        if let Some(recovery) = self.strategies.get(&error.kind) {
            match recovery(args) {
                Ok(value) => {
                    log::info!("recovered from {} failure", error.kind);
                    return Ok(Some(value));
                }
                Err(recovery_error) => {
                    log::error!(
                        "recovery for {} failure also failed: {}",
                        error.kind,
                        recovery_error
                    );
                }
            }
        }

        if self.propagate {
            Err(error)
        } else {
            Ok(None)
        }
    }
}

impl<A, T> Default for ErrorHandler<A, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_success_passes_through() {
        let handler: ErrorHandler<u32, u32> = ErrorHandler::new();
        let result = handler.run(&2, |n| Ok(n * 10)).unwrap();
        assert_eq!(result, Some(20));
    }

    #[test]
    fn test_recovery_receives_original_args() {
        let handler = ErrorHandler::new().with_recovery(ErrorKind::Workspace, |n: &u32| Ok(*n + 1));

        let result = handler
            .run(&41, |_| Err(FleetError::workspace("worktree locked")))
            .unwrap();
        assert_eq!(result, Some(42));
    }

    #[test]
    fn test_recovery_only_matches_its_kind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler = ErrorHandler::new().with_recovery(ErrorKind::Workspace, move |_: &()| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = handler
            .run(&(), |_| Err(FleetError::session("no server")))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionMultiplexer);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_recovery_keeps_original_error() {
        let handler: ErrorHandler<(), ()> = ErrorHandler::new()
            .with_recovery(ErrorKind::Persistence, |_| {
                Err(FleetError::persistence("recovery exploded"))
            });

        let err = handler
            .run(&(), |_| Err(FleetError::persistence("disk full")))
            .unwrap_err();
        assert_eq!(err.message, "disk full");
    }

    #[test]
    fn test_swallowing_handler_yields_none() {
        let handler: ErrorHandler<(), ()> = ErrorHandler::swallowing()
            .with_recovery(ErrorKind::Integration, |_| {
                Err(FleetError::integration("still down"))
            });

        let result = handler
            .run(&(), |_| Err(FleetError::integration("monitor down")))
            .unwrap();
        assert!(result.is_none());
    }
}
