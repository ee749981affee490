//! Error types for breaker, fuse and registry operations

use thiserror::Error;

/// Errors that can occur during breaker operations
///
/// Every variant is a recoverable value: nothing in this crate retries on the
/// caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    /// Breaker was switched off by an operator
    #[error("Breaker '{breaker}' is off")]
    BreakerOff { breaker: String },

    /// Breaker is open because its fuse tripped on its own
    #[error("Breaker '{breaker}' is tripped off")]
    BreakerTrippedOff { breaker: String },

    /// The fuse rejected the call that was just made
    #[error("Fuse of breaker '{breaker}' tripped")]
    FuseTripped { breaker: String },

    /// A threshold, limit or duration was not strictly positive
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfiguration {
        field: &'static str,
        reason: &'static str,
    },

    /// The breaker is already attached to this operation
    #[error("Breaker '{breaker}' is already registered for '{operation}'")]
    AlreadyRegistered { breaker: String, operation: String },

    /// The breaker is not attached to anything matching the request
    #[error("Breaker '{breaker}' is not registered")]
    NotRegistered { breaker: String },
}

impl CircuitError {
    /// True for errors produced by the call gate (`BreakerOff`,
    /// `BreakerTrippedOff`, `FuseTripped`)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CircuitError::BreakerOff { .. }
                | CircuitError::BreakerTrippedOff { .. }
                | CircuitError::FuseTripped { .. }
        )
    }

    /// True only when an operator disabled the breaker.
    ///
    /// Automatic trips may clear when a window rolls over; manual ones will
    /// not clear until someone turns the breaker back on.
    pub fn is_manual(&self) -> bool {
        matches!(self, CircuitError::BreakerOff { .. })
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        CircuitError::InvalidConfiguration { field, reason }
    }
}

/// Error returned by closure-running helpers such as [`crate::Breaker::call`]
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker or one of its fuses refused the call
    #[error(transparent)]
    Rejected(#[from] CircuitError),
    /// The wrapped operation ran and failed
    #[error("Circuit execution failed: {0}")]
    Execution(E),
}

impl<E> CallError<E> {
    /// The rejection, if the operation never ran
    pub fn rejection(&self) -> Option<&CircuitError> {
        match self {
            CallError::Rejected(e) => Some(e),
            CallError::Execution(_) => None,
        }
    }
}
