//! Breaker: a switch in front of a protected operation
//!
//! The breaker owns one fuse and never stores a status of its own; its
//! status is the fuse status mapped through [`BreakerStatus::from`].

use crate::callbacks::{Observer, Observers, SubscriptionId};
use crate::errors::{CallError, CircuitError};
use crate::fuse::Fuse;
use crate::{Arguments, BreakerStatus, FuseStatus, FuseStatusChange};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

static NEXT_BREAKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakerId(u64);

impl BreakerId {
    fn next() -> Self {
        Self(NEXT_BREAKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback receiving the breaker whose status just changed
pub type BreakerObserver = Observer<Breaker>;

struct BreakerInner {
    id: BreakerId,
    name: String,
    fuse: Box<dyn Fuse>,
    observers: Observers<Breaker>,
    disposed: AtomicBool,
}

impl Drop for BreakerInner {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.fuse.dispose();
        }
    }
}

/// Circuit breaker handle
///
/// Cloning is cheap and every clone refers to the same breaker. The fuse is
/// disposed by [`Breaker::dispose`] or when the last handle is dropped.
#[derive(Clone)]
pub struct Breaker {
    inner: Arc<BreakerInner>,
}

impl Breaker {
    /// Create a breaker that starts `On`
    pub fn new(name: impl Into<String>, fuse: impl Fuse + 'static) -> Self {
        Self::builder(name, fuse).build()
    }

    /// Create a new breaker builder
    pub fn builder(name: impl Into<String>, fuse: impl Fuse + 'static) -> crate::BreakerBuilder {
        crate::BreakerBuilder::new(name, fuse)
    }

    /// Wire a breaker to its fuse (used by the builder)
    pub(crate) fn assemble(
        name: String,
        fuse: Box<dyn Fuse>,
        initial_status: BreakerStatus,
        observers: Vec<BreakerObserver>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<BreakerInner>| {
            let weak = weak.clone();
            fuse.subscribe(Arc::new(move |change: &FuseStatusChange| {
                if !change.changes_breaker_status() {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    Breaker { inner }.publish(change);
                }
            }));

            BreakerInner {
                id: BreakerId::next(),
                name,
                fuse,
                observers: Observers::new(),
                disposed: AtomicBool::new(false),
            }
        });
        let breaker = Self { inner };

        // Observers are attached afterwards so construction emits nothing
        match initial_status {
            BreakerStatus::On => breaker.inner.fuse.reset(),
            BreakerStatus::Off | BreakerStatus::TrippedOff => breaker.inner.fuse.trip(),
        }
        for observer in observers {
            breaker.inner.observers.subscribe(observer);
        }

        debug!(
            breaker = %breaker.inner.name,
            fuse = breaker.inner.fuse.kind(),
            status = ?breaker.status(),
            "Breaker created"
        );
        breaker
    }

    fn publish(&self, change: &FuseStatusChange) {
        info!(
            breaker = %self.inner.name,
            from = ?BreakerStatus::from(change.previous),
            to = ?BreakerStatus::from(change.current),
            "Breaker status changed"
        );
        self.inner.observers.notify(self);
    }

    pub fn id(&self) -> BreakerId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current status, read from the fuse
    pub fn status(&self) -> BreakerStatus {
        BreakerStatus::from(self.inner.fuse.status())
    }

    pub fn is_on(&self) -> bool {
        self.status() == BreakerStatus::On
    }

    /// Off or tripped off
    pub fn is_off(&self) -> bool {
        !self.is_on()
    }

    /// The fuse this breaker owns
    pub fn fuse(&self) -> &dyn Fuse {
        self.inner.fuse.as_ref()
    }

    /// Gate one call through the breaker
    ///
    /// # Errors
    ///
    /// - `BreakerOff` when switched off by [`Breaker::off`], even if the
    ///   switch happened while this call was being gated
    /// - `BreakerTrippedOff` when the fuse tripped on an earlier call
    /// - `FuseTripped` when the fuse rejected this call
    pub fn execute(&self, args: Arguments<'_>) -> Result<(), CircuitError> {
        match self.status() {
            BreakerStatus::Off => Err(CircuitError::BreakerOff {
                breaker: self.inner.name.clone(),
            }),
            BreakerStatus::TrippedOff => Err(CircuitError::BreakerTrippedOff {
                breaker: self.inner.name.clone(),
            }),
            // An `off()` racing with this call surfaces as `ManuallyTripped`
            BreakerStatus::On => self.inner.fuse.admit(args).map_err(|status| match status {
                FuseStatus::ManuallyTripped => CircuitError::BreakerOff {
                    breaker: self.inner.name.clone(),
                },
                FuseStatus::Initial | FuseStatus::Normal | FuseStatus::Tripped => {
                    CircuitError::FuseTripped {
                        breaker: self.inner.name.clone(),
                    }
                }
            }),
        }
    }

    /// Run `f` only if [`Breaker::execute`] admits the call
    ///
    /// ```rust
    /// use fuse_machines::{Breaker, ExecutionCountFuse};
    ///
    /// let breaker = Breaker::new("inventory", ExecutionCountFuse::new(10).unwrap());
    /// let stock = breaker.call(&[], || Ok::<_, std::io::Error>(42));
    /// assert_eq!(stock.unwrap(), 42);
    /// ```
    pub fn call<T, E, F>(&self, args: Arguments<'_>, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.execute(args)?;
        f().map_err(CallError::Execution)
    }

    /// Turn the breaker on. No-op when already on.
    pub fn on(&self) {
        if self.is_on() {
            return;
        }
        info!(breaker = %self.inner.name, "Turning breaker on");
        self.inner.fuse.reset();
    }

    /// Turn the breaker off. No-op when already off or tripped off.
    pub fn off(&self) {
        if !self.is_on() {
            return;
        }
        info!(breaker = %self.inner.name, "Turning breaker off");
        self.inner.fuse.trip();
    }

    /// Observe status changes. Observers run synchronously on the thread that
    /// caused the change and may call back into this breaker.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&Breaker) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(Arc::new(f))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Release the fuse's background resources. Safe to call more than once.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            debug!(breaker = %self.inner.name, "Disposing breaker");
            self.inner.fuse.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl PartialEq for Breaker {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Breaker {}

impl std::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .field("fuse", &self.inner.fuse.kind())
            .finish()
    }
}
