//! Registry mapping monitored operations to the breakers guarding them
//!
//! Call-interception layers sit on top of this: they resolve a call to an
//! [`OperationId`] and an optional [`TargetId`], then ask the registry whether
//! the real call may proceed. The registry is a plain value, so separate
//! registries never see each other's breakers.

use crate::breaker::Breaker;
use crate::errors::{CallError, CircuitError};
use crate::Arguments;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Name of a monitored operation, e.g. `"OrderService::submit"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for OperationId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Identity of the object an instance-bound operation runs on
///
/// Two ids are equal only if they were taken from the same object. The id
/// does not keep the object alive, and an address may be reused once the
/// object is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(usize);

impl TargetId {
    pub fn of<T: ?Sized>(target: &T) -> Self {
        Self(target as *const T as *const () as usize)
    }
}

type MonitorKey = (OperationId, Option<TargetId>);

/// Breakers registered per monitored operation
///
/// Several distinct breakers may guard the same key; one breaker may guard
/// several keys.
#[derive(Default)]
pub struct BreakerRegistry {
    entries: RwLock<HashMap<MonitorKey, Vec<Breaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `breaker` to `operation`, optionally bound to one target
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if this exact breaker already guards the key.
    pub fn register(
        &self,
        breaker: &Breaker,
        target: Option<TargetId>,
        operation: impl Into<OperationId>,
    ) -> Result<(), CircuitError> {
        let operation = operation.into();
        let mut entries = self.entries.write();
        let breakers = entries.entry((operation.clone(), target)).or_default();

        if breakers.contains(breaker) {
            return Err(CircuitError::AlreadyRegistered {
                breaker: breaker.name().to_string(),
                operation: operation.to_string(),
            });
        }

        debug!(
            breaker = breaker.name(),
            operation = %operation,
            bound = target.is_some(),
            "Breaker registered"
        );
        breakers.push(breaker.clone());
        Ok(())
    }

    /// Detach `breaker` from every key it guards
    ///
    /// # Errors
    ///
    /// `NotRegistered` if it guards nothing.
    pub fn unregister(&self, breaker: &Breaker) -> Result<(), CircuitError> {
        let mut entries = self.entries.write();
        let mut removed = 0;

        entries.retain(|_, breakers| {
            let before = breakers.len();
            breakers.retain(|b| b != breaker);
            removed += before - breakers.len();
            !breakers.is_empty()
        });

        if removed == 0 {
            return Err(not_registered(breaker));
        }

        debug!(breaker = breaker.name(), keys = removed, "Breaker unregistered");
        Ok(())
    }

    /// Detach `breaker` from a single key
    ///
    /// # Errors
    ///
    /// `NotRegistered` if it does not guard that key.
    pub fn unregister_from(
        &self,
        breaker: &Breaker,
        target: Option<TargetId>,
        operation: impl Into<OperationId>,
    ) -> Result<(), CircuitError> {
        let key = (operation.into(), target);
        let mut entries = self.entries.write();

        let Some(breakers) = entries.get_mut(&key) else {
            return Err(not_registered(breaker));
        };
        let Some(index) = breakers.iter().position(|b| b == breaker) else {
            return Err(not_registered(breaker));
        };

        breakers.remove(index);
        if breakers.is_empty() {
            entries.remove(&key);
        }

        debug!(breaker = breaker.name(), operation = %key.0, "Breaker unregistered");
        Ok(())
    }

    pub fn is_registered(&self, breaker: &Breaker) -> bool {
        self.entries
            .read()
            .values()
            .any(|breakers| breakers.contains(breaker))
    }

    /// Breakers guarding the key, in registration order
    pub fn breakers_for(&self, target: Option<TargetId>, operation: &OperationId) -> Vec<Breaker> {
        self.entries
            .read()
            .get(&(operation.clone(), target))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of monitored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Gate one real call of `operation`
    ///
    /// Every breaker registered for the key is executed in registration
    /// order; the first rejection is returned and the remaining breakers are
    /// not consulted. Unmonitored operations always pass.
    pub fn intercept(
        &self,
        target: Option<TargetId>,
        operation: &OperationId,
        args: Arguments<'_>,
    ) -> Result<(), CircuitError> {
        // Snapshot so breaker observers may touch the registry
        let breakers = self.breakers_for(target, operation);

        for breaker in &breakers {
            if let Err(e) = breaker.execute(args) {
                debug!(
                    breaker = breaker.name(),
                    operation = %operation,
                    error = %e,
                    "Call intercepted"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run the real operation `f` only if [`BreakerRegistry::intercept`]
    /// admits it
    pub fn call<T, E, F>(
        &self,
        target: Option<TargetId>,
        operation: &OperationId,
        args: Arguments<'_>,
        f: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.intercept(target, operation, args)?;
        f().map_err(CallError::Execution)
    }
}

fn not_registered(breaker: &Breaker) -> CircuitError {
    CircuitError::NotRegistered {
        breaker: breaker.name().to_string(),
    }
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("BreakerRegistry")
            .field("keys", &entries.len())
            .field(
                "breakers",
                &entries.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BreakerStatus, ExecutionCountFuse};
    use std::any::Any;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn breaker(name: &str, limit: usize) -> Breaker {
        Breaker::new(name, ExecutionCountFuse::new(limit).unwrap())
    }

    struct OrderService {
        _id: u32,
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = BreakerRegistry::new();
        let b = breaker("orders", 10);
        let op = OperationId::new("OrderService::submit");

        registry.register(&b, None, op.clone()).unwrap();

        assert!(registry.is_registered(&b));
        assert_eq!(registry.breakers_for(None, &op), vec![b]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_breaker_twice_is_rejected() {
        let registry = BreakerRegistry::new();
        let b = breaker("orders", 10);

        registry.register(&b, None, "submit").unwrap();
        let err = registry.register(&b, None, "submit").unwrap_err();

        assert_eq!(
            err,
            CircuitError::AlreadyRegistered {
                breaker: "orders".into(),
                operation: "submit".into(),
            }
        );
    }

    #[test]
    fn test_distinct_breakers_share_a_key() {
        let registry = BreakerRegistry::new();
        let a = breaker("a", 10);
        let b = breaker("b", 10);

        registry.register(&a, None, "submit").unwrap();
        registry.register(&b, None, "submit").unwrap();

        let op = OperationId::from("submit");
        assert_eq!(registry.breakers_for(None, &op).len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_targets_are_keyed_separately() {
        let registry = BreakerRegistry::new();
        let first = OrderService { _id: 1 };
        let second = OrderService { _id: 2 };
        let b = breaker("orders", 10);
        let op = OperationId::new("submit");

        registry
            .register(&b, Some(TargetId::of(&first)), op.clone())
            .unwrap();

        assert_eq!(registry.breakers_for(Some(TargetId::of(&first)), &op).len(), 1);
        assert!(registry.breakers_for(Some(TargetId::of(&second)), &op).is_empty());
        assert!(registry.breakers_for(None, &op).is_empty());
    }

    #[test]
    fn test_unregister_removes_every_key() {
        let registry = BreakerRegistry::new();
        let b = breaker("orders", 10);

        registry.register(&b, None, "submit").unwrap();
        registry.register(&b, None, "cancel").unwrap();
        registry.unregister(&b).unwrap();

        assert!(!registry.is_registered(&b));
        assert!(registry.is_empty());

        let err = registry.unregister(&b).unwrap_err();
        assert_eq!(
            err,
            CircuitError::NotRegistered {
                breaker: "orders".into()
            }
        );
    }

    #[test]
    fn test_unregister_from_single_key() {
        let registry = BreakerRegistry::new();
        let b = breaker("orders", 10);

        registry.register(&b, None, "submit").unwrap();
        registry.register(&b, None, "cancel").unwrap();
        registry.unregister_from(&b, None, "submit").unwrap();

        assert!(registry.is_registered(&b));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister_from(&b, None, "submit").is_err());
    }

    #[test]
    fn test_intercept_unmonitored_passes() {
        let registry = BreakerRegistry::new();
        let op = OperationId::new("anything");
        assert!(registry.intercept(None, &op, &[]).is_ok());
    }

    #[test]
    fn test_intercept_propagates_first_rejection() {
        let registry = BreakerRegistry::new();
        let off = breaker("off", 10);
        let on = breaker("on", 10);
        let op = OperationId::new("submit");
        off.off();

        registry.register(&off, None, op.clone()).unwrap();
        registry.register(&on, None, op.clone()).unwrap();

        let err = registry.intercept(None, &op, &[]).unwrap_err();
        assert_eq!(
            err,
            CircuitError::BreakerOff {
                breaker: "off".into()
            }
        );
    }

    #[test]
    fn test_call_runs_operation_only_when_admitted() {
        let registry = BreakerRegistry::new();
        let service = OrderService { _id: 7 };
        let target = Some(TargetId::of(&service));
        let b = breaker("orders", 2);
        let op = OperationId::new("submit");
        registry.register(&b, target, op.clone()).unwrap();

        let runs = AtomicUsize::new(0);
        let order_id: u64 = 42;
        let args: [&dyn Any; 1] = [&order_id];
        let submit = || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        };

        assert!(registry.call(target, &op, &args, submit).is_ok());
        assert!(registry.call(target, &op, &args, submit).is_ok());
        assert_eq!(b.status(), BreakerStatus::TrippedOff);

        let result = registry.call(target, &op, &args, submit);
        assert!(matches!(
            result,
            Err(CallError::Rejected(CircuitError::BreakerTrippedOff { .. }))
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_may_touch_registry_during_intercept() {
        let registry = Arc::new(BreakerRegistry::new());
        let b = breaker("orders", 1);
        let op = OperationId::new("submit");
        registry.register(&b, None, op.clone()).unwrap();

        let weak = Arc::downgrade(&registry);
        b.subscribe(move |tripped| {
            if let Some(registry) = weak.upgrade() {
                let _ = registry.unregister(tripped);
            }
        });

        assert!(registry.intercept(None, &op, &[]).is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register_and_intercept() {
        let registry = Arc::new(BreakerRegistry::new());
        let op = OperationId::new("submit");
        let mut handles = vec![];

        for i in 0..8 {
            let registry = Arc::clone(&registry);
            let op = op.clone();
            handles.push(thread::spawn(move || {
                let b = breaker(&format!("breaker-{i}"), usize::MAX);
                registry.register(&b, None, op.clone()).unwrap();
                for _ in 0..100 {
                    registry.intercept(None, &op, &[]).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.breakers_for(None, &op).len(), 8);
    }
}
