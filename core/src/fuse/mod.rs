//! Fuses: pluggable policies deciding when a breaker opens
//!
//! Each fuse owns its accumulator and its status. Status transitions happen
//! while the fuse's own lock is held, but observers are notified only after
//! it is released, so an observer may call back into the fuse (or the breaker
//! that owns it) without deadlocking.

mod execution_count;
mod fixed_window;
mod sliding_window_count;
mod sliding_window_limit;
mod timed_window;

pub use execution_count::ExecutionCountFuse;
pub use fixed_window::FixedWindowCountFuse;
pub use sliding_window_count::SlidingWindowCountFuse;
pub use sliding_window_limit::SlidingWindowLimitFuse;
pub use timed_window::TimedWindowCountFuse;

use crate::callbacks::{Observer, Observers, SubscriptionId};
use crate::errors::CircuitError;
use crate::lifecycle::{Lifecycle, Transition};
use crate::{Arguments, FuseStatus, FuseStatusChange};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Callback receiving fuse status changes
///
/// Every transition is delivered exactly once, but transitions racing on
/// different threads may be delivered out of order. Observers that need the
/// current status should re-read it rather than rely on the last change seen.
pub type FuseObserver = Observer<FuseStatusChange>;

/// Triggering policy owned by a [`crate::Breaker`]
pub trait Fuse: Send + Sync + std::fmt::Debug {
    /// Short name of the policy, used in logs
    fn kind(&self) -> &'static str;

    fn status(&self) -> FuseStatus;

    /// Gate one call
    ///
    /// On rejection, returns the status that rejected it as read under the
    /// fuse's own lock: `ManuallyTripped` for a fuse forced open, `Tripped`
    /// for an automatic trip, including one caused by this very call.
    fn admit(&self, args: Arguments<'_>) -> Result<(), FuseStatus>;

    /// Gate one call. Returns `false` when the call must not proceed.
    fn try_pass(&self, args: Arguments<'_>) -> bool {
        self.admit(args).is_ok()
    }

    /// Force the fuse open and clear its accumulator
    fn trip(&self);

    /// Clear the accumulator and accept calls again
    fn reset(&self);

    /// Observe status changes, see [`FuseObserver`] for delivery order
    fn subscribe(&self, observer: FuseObserver) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Release background resources. Safe to call more than once.
    fn dispose(&self) {}
}

/// Status machine and observers shared by every fuse implementation
#[derive(Debug)]
pub(crate) struct FuseCore {
    kind: &'static str,
    lifecycle: Mutex<Lifecycle>,
    observers: Observers<FuseStatusChange>,
}

impl FuseCore {
    pub fn new(kind: &'static str, initial: FuseStatus) -> Self {
        Self {
            kind,
            lifecycle: Mutex::new(Lifecycle::new(kind, initial)),
            observers: Observers::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn status(&self) -> FuseStatus {
        self.lifecycle.lock().status()
    }

    pub fn is_tripped(&self) -> bool {
        self.status().is_tripped()
    }

    /// Apply a transition. Call with the accumulator lock held, then hand the
    /// result to [`FuseCore::publish`] once that lock is released.
    #[must_use]
    pub fn apply(&self, transition: Transition) -> Option<FuseStatusChange> {
        let change = self.lifecycle.lock().apply(transition)?;

        match transition {
            Transition::Blow => warn!(fuse = self.kind, "Fuse tripped"),
            Transition::Trip => info!(fuse = self.kind, "Fuse manually tripped"),
            Transition::Restore | Transition::Rearm => info!(
                fuse = self.kind,
                from = change.previous.as_str(),
                to = change.current.as_str(),
                "Fuse reset"
            ),
            Transition::Arm => {}
        }

        Some(change)
    }

    pub fn publish(&self, change: Option<FuseStatusChange>) {
        if let Some(change) = change {
            self.observers.notify(&change);
        }
    }

    pub fn subscribe(&self, observer: FuseObserver) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

pub(crate) fn validate_count(field: &'static str, value: usize) -> Result<(), CircuitError> {
    if value == 0 {
        return Err(CircuitError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

pub(crate) fn validate_duration(field: &'static str, value: Duration) -> Result<(), CircuitError> {
    if value.is_zero() {
        return Err(CircuitError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}
