//! Fuse status lifecycle
//!
//! Every fuse drives the same four-state machine. An event that is not valid
//! from the current state is rejected by the machine, which is how repeated
//! trips or resets turn into no-ops instead of duplicate notifications.

use crate::{FuseStatus, FuseStatusChange};
use state_machines::state_machine;

/// Context shared across all lifecycle states
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    pub fuse: &'static str,
}

state_machine! {
    name: FuseLifecycle,
    context: LifecycleContext,
    dynamic: true,

    initial: Initial,
    states: [
        Initial,
        Normal,
        Tripped,
        ManuallyTripped,
    ],
    events {
        arm {
            transition: { from: Initial, to: Normal }
        }
        blow {
            transition: { from: [Initial, Normal], to: Tripped }
        }
        trip {
            transition: { from: [Initial, Normal], to: ManuallyTripped }
        }
        restore {
            transition: { from: [Initial, Tripped, ManuallyTripped], to: Normal }
        }
        rearm {
            transition: { from: [Normal, Tripped, ManuallyTripped], to: Initial }
        }
    }
}

/// Transition requests understood by [`Lifecycle::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// First use of a lazily started fuse
    Arm,
    /// Threshold reached
    Blow,
    /// Explicit trip
    Trip,
    /// Explicit reset back to accepting calls
    Restore,
    /// Explicit reset back to the unused state
    Rearm,
}

impl Transition {
    fn event(self) -> FuseLifecycleEvent {
        match self {
            Transition::Arm => FuseLifecycleEvent::Arm,
            Transition::Blow => FuseLifecycleEvent::Blow,
            Transition::Trip => FuseLifecycleEvent::Trip,
            Transition::Restore => FuseLifecycleEvent::Restore,
            Transition::Rearm => FuseLifecycleEvent::Rearm,
        }
    }
}

/// Owned status machine of a single fuse
pub(crate) struct Lifecycle {
    machine: DynamicFuseLifecycle,
}

impl Lifecycle {
    /// Start in `Initial`, or arm immediately when `initial` is `Normal`
    pub fn new(fuse: &'static str, initial: FuseStatus) -> Self {
        let mut lifecycle = Self {
            machine: DynamicFuseLifecycle::new(LifecycleContext { fuse }),
        };
        if initial == FuseStatus::Normal {
            let _ = lifecycle.apply(Transition::Arm);
        }
        lifecycle
    }

    pub fn status(&self) -> FuseStatus {
        status_of(self.machine.current_state())
    }

    /// Apply a transition; `None` when it is not valid from the current state
    pub fn apply(&mut self, transition: Transition) -> Option<FuseStatusChange> {
        let previous = self.status();
        self.machine.handle(transition.event()).ok()?;

        Some(FuseStatusChange {
            previous,
            current: self.status(),
        })
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("status", &self.status())
            .finish()
    }
}

fn status_of(state: &str) -> FuseStatus {
    match state {
        "Initial" => FuseStatus::Initial,
        "Tripped" => FuseStatus::Tripped,
        "ManuallyTripped" => FuseStatus::ManuallyTripped,
        "Normal" => FuseStatus::Normal,
        unknown => {
            debug_assert!(false, "Unknown lifecycle state: {unknown}");
            FuseStatus::Normal
        }
    }
}
