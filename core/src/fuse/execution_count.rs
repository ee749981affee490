use super::{Fuse, FuseCore, FuseObserver, validate_count};
use crate::callbacks::SubscriptionId;
use crate::errors::CircuitError;
use crate::lifecycle::Transition;
use crate::{Arguments, FuseStatus};
use parking_lot::Mutex;

/// Trips once a fixed number of calls has gone through
///
/// The call that reaches the limit still passes; every call after it is
/// rejected until the fuse is reset.
#[derive(Debug)]
pub struct ExecutionCountFuse {
    limit: usize,
    count: Mutex<usize>,
    core: FuseCore,
}

impl ExecutionCountFuse {
    pub fn new(limit: usize) -> Result<Self, CircuitError> {
        validate_count("limit", limit)?;

        Ok(Self {
            limit,
            count: Mutex::new(0),
            core: FuseCore::new("execution_count", FuseStatus::Normal),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Calls counted since the last reset
    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}

impl Fuse for ExecutionCountFuse {
    fn kind(&self) -> &'static str {
        self.core.kind()
    }

    fn status(&self) -> FuseStatus {
        self.core.status()
    }

    fn admit(&self, _args: Arguments<'_>) -> Result<(), FuseStatus> {
        let change = {
            let mut count = self.count.lock();
            let status = self.core.status();
            if status.is_tripped() {
                return Err(status);
            }

            *count += 1;
            if *count >= self.limit {
                self.core.apply(Transition::Blow)
            } else {
                None
            }
        };

        self.core.publish(change);
        Ok(())
    }

    fn trip(&self) {
        let change = {
            let mut count = self.count.lock();
            *count = 0;
            self.core.apply(Transition::Trip)
        };
        self.core.publish(change);
    }

    fn reset(&self) {
        let change = {
            let mut count = self.count.lock();
            *count = 0;
            self.core.apply(Transition::Restore)
        };
        self.core.publish(change);
    }

    fn subscribe(&self, observer: FuseObserver) -> SubscriptionId {
        self.core.subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuse::test_support::record_changes;
    use std::any::Any;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_normal_and_passes() {
        let fuse = ExecutionCountFuse::new(3).unwrap();
        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert!(fuse.try_pass(&[]));
    }

    #[test]
    fn test_limit_call_passes_then_trips() {
        let fuse = ExecutionCountFuse::new(3).unwrap();
        let changes = record_changes(&fuse);

        assert!(fuse.try_pass(&[]));
        assert!(fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Normal);

        // Third call reaches the limit but still succeeds
        assert!(fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Tripped);
        assert_eq!(changes.lock().len(), 1);

        assert!(!fuse.try_pass(&[]));
        assert_eq!(fuse.count(), 3);

        fuse.reset();
        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert_eq!(fuse.count(), 0);
        assert!(fuse.try_pass(&[]));
        assert_eq!(changes.lock().len(), 2);
    }

    #[test]
    fn test_manual_trip_clears_count() {
        let fuse = ExecutionCountFuse::new(5).unwrap();
        fuse.try_pass(&[]);
        fuse.try_pass(&[]);

        fuse.trip();
        assert_eq!(fuse.status(), FuseStatus::ManuallyTripped);
        assert_eq!(fuse.count(), 0);
        assert!(!fuse.try_pass(&[]));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let err = ExecutionCountFuse::new(0).unwrap_err();
        assert!(matches!(
            err,
            CircuitError::InvalidConfiguration { field: "limit", .. }
        ));
    }

    #[test]
    fn test_arguments_are_ignored() {
        let fuse = ExecutionCountFuse::new(2).unwrap();
        let user_id = 42u64;
        let path = "/orders";
        let args: [&dyn Any; 2] = [&user_id, &path];

        assert!(fuse.try_pass(&args));
        assert_eq!(fuse.count(), 1);
    }

    #[test]
    fn test_concurrent_calls_count_exactly() {
        let fuse = Arc::new(ExecutionCountFuse::new(1000).unwrap());
        let changes = record_changes(fuse.as_ref());
        let mut handles = vec![];

        for _ in 0..10 {
            let fuse = Arc::clone(&fuse);
            handles.push(thread::spawn(move || {
                let mut passed = 0;
                for _ in 0..150 {
                    if fuse.try_pass(&[]) {
                        passed += 1;
                    }
                }
                passed
            }));
        }

        let passed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(passed, 1000);
        assert_eq!(fuse.status(), FuseStatus::Tripped);
        assert_eq!(changes.lock().len(), 1);
    }
}
