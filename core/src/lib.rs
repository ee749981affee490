//! FuseMachines - circuit breaker driven by pluggable fuses
//!
//! A [`Breaker`] gates calls to a protected operation. It owns exactly one
//! [`Fuse`], the policy that decides when the breaker opens:
//! - [`ExecutionCountFuse`]: trips after a fixed number of calls
//! - [`FixedWindowCountFuse`]: counts calls inside fixed, back-to-back windows
//! - [`SlidingWindowCountFuse`]: counts calls inside a sliding window
//! - [`SlidingWindowLimitFuse`]: sliding window that lets the tripping call through
//! - [`TimedWindowCountFuse`]: counter checked and cleared by a background tick
//!
//! Breaker status is always derived from the fuse status, and status-change
//! observers run synchronously on the thread that caused the change.
//!
//! # Example
//!
//! ```rust
//! use fuse_machines::{Breaker, BreakerStatus, ExecutionCountFuse};
//!
//! let fuse = ExecutionCountFuse::new(3).unwrap();
//! let breaker = Breaker::builder("payments", fuse)
//!     .on_status_changed(|b| println!("Breaker {} is now {:?}", b.name(), b.status()))
//!     .build();
//!
//! for _ in 0..3 {
//!     assert!(breaker.execute(&[]).is_ok());
//! }
//!
//! // The third call tripped the fuse
//! assert_eq!(breaker.status(), BreakerStatus::TrippedOff);
//! assert!(breaker.execute(&[]).is_err());
//!
//! breaker.on();
//! assert!(breaker.execute(&[]).is_ok());
//! ```

pub mod breaker;
pub mod buffer;
pub mod builder;
pub mod callbacks;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fuse;
mod lifecycle;
pub mod registry;
mod ticker;

pub use breaker::{Breaker, BreakerId};
pub use buffer::TtlBuffer;
pub use builder::BreakerBuilder;
pub use callbacks::{Observers, SubscriptionId};
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::MockClock;
pub use clock::{Clock, SystemClock};
pub use config::FuseConfig;
pub use errors::{CallError, CircuitError};
pub use fuse::{
    ExecutionCountFuse, FixedWindowCountFuse, Fuse, FuseObserver, SlidingWindowCountFuse,
    SlidingWindowLimitFuse, TimedWindowCountFuse,
};
pub use registry::{BreakerRegistry, OperationId, TargetId};

use std::any::Any;

/// Borrowed snapshot of the arguments of a guarded call
pub type Arguments<'a> = &'a [&'a dyn Any];

/// Status of a fuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuseStatus {
    /// Constructed and never used; only timer-driven fuses stay here
    Initial,
    /// Accepting calls
    Normal,
    /// Opened automatically because a threshold was reached
    Tripped,
    /// Forced open by an explicit command
    ManuallyTripped,
}

impl FuseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuseStatus::Initial => "Initial",
            FuseStatus::Normal => "Normal",
            FuseStatus::Tripped => "Tripped",
            FuseStatus::ManuallyTripped => "ManuallyTripped",
        }
    }

    /// True for both automatic and manual trips
    pub fn is_tripped(&self) -> bool {
        matches!(self, FuseStatus::Tripped | FuseStatus::ManuallyTripped)
    }
}

/// Status of a breaker, derived one-to-one from its fuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerStatus {
    On,
    TrippedOff,
    Off,
}

impl From<FuseStatus> for BreakerStatus {
    fn from(status: FuseStatus) -> Self {
        match status {
            FuseStatus::Initial | FuseStatus::Normal => BreakerStatus::On,
            FuseStatus::Tripped => BreakerStatus::TrippedOff,
            FuseStatus::ManuallyTripped => BreakerStatus::Off,
        }
    }
}

/// A fuse status transition, delivered to fuse observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuseStatusChange {
    pub previous: FuseStatus,
    pub current: FuseStatus,
}

impl FuseStatusChange {
    /// Whether the transition is visible at the breaker level
    pub fn changes_breaker_status(&self) -> bool {
        BreakerStatus::from(self.previous) != BreakerStatus::from(self.current)
    }
}
