use super::{Fuse, FuseCore, FuseObserver, validate_count, validate_duration};
use crate::callbacks::SubscriptionId;
use crate::clock::{Clock, SystemClock, elapsed_since};
use crate::errors::CircuitError;
use crate::lifecycle::Transition;
use crate::{Arguments, FuseStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Limits calls within a sliding window, letting the tripping call through
///
/// Unlike [`crate::SlidingWindowCountFuse`], the call that reaches `limit`
/// succeeds and the trip applies from the next call on.
#[derive(Debug)]
pub struct SlidingWindowLimitFuse {
    limit: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
    core: FuseCore,
}

impl SlidingWindowLimitFuse {
    pub fn new(limit: usize, window: Duration) -> Result<Self, CircuitError> {
        Self::with_clock(limit, window, SystemClock::shared())
    }

    pub fn with_clock(
        limit: usize,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CircuitError> {
        validate_count("limit", limit)?;
        validate_duration("window", window)?;

        Ok(Self {
            limit,
            window,
            calls: Mutex::new(VecDeque::new()),
            clock,
            core: FuseCore::new("sliding_window_limit", FuseStatus::Normal),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Calls recorded as of the last call, expired ones included until then
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Fuse for SlidingWindowLimitFuse {
    fn kind(&self) -> &'static str {
        self.core.kind()
    }

    fn status(&self) -> FuseStatus {
        self.core.status()
    }

    fn admit(&self, _args: Arguments<'_>) -> Result<(), FuseStatus> {
        let change = {
            let mut calls = self.calls.lock();
            let status = self.core.status();
            if status.is_tripped() {
                return Err(status);
            }

            let mut now = self.clock.now();
            while let Some(oldest) = calls.front() {
                if elapsed_since(now, *oldest) > self.window {
                    calls.pop_front();
                } else {
                    break;
                }
            }
            if let Some(last) = calls.back()
                && *last > now
            {
                now = *last;
            }

            calls.push_back(now);

            if calls.len() >= self.limit {
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
            let mut calls = self.calls.lock();
            calls.clear();
            self.core.apply(Transition::Trip)
        };
        self.core.publish(change);
    }

    fn reset(&self) {
        let change = {
            let mut calls = self.calls.lock();
            calls.clear();
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
