//! Time sources for window-based fuses
//!
//! Fuses read time through the [`Clock`] trait so tests can drive windows
//! deterministically with [`MockClock`] (available in test builds and with the
//! `test-helpers` feature).

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }

    /// Shared handle, the form fuse constructors take
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time elapsed from `earlier` to `now`, clamped to zero when the clock went
/// backwards.
pub(crate) fn elapsed_since(now: Instant, earlier: Instant) -> Duration {
    now.saturating_duration_since(earlier)
}

/// Controllable clock for tests
///
/// Clones share the same time value, so advancing one advances all of them.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<parking_lot::Mutex<Instant>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl MockClock {
    /// Create a mock clock starting at a specific instant
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(parking_lot::Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.current_time.lock() += duration;
    }

    /// Move the clock back, simulating a clock adjustment
    pub fn rewind(&self, duration: Duration) {
        let mut time = self.current_time.lock();
        if let Some(earlier) = time.checked_sub(duration) {
            *time = earlier;
        }
    }

    /// Set the clock to a specific instant
    pub fn set(&self, instant: Instant) {
        *self.current_time.lock() = instant;
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.lock()
    }
}
