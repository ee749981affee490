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
use tracing::debug;

#[derive(Debug)]
struct WindowState {
    /// Start of the current window; fixed on first use unless configured
    window_start: Option<Instant>,
    calls: VecDeque<Instant>,
}

/// Counts calls inside fixed, back-to-back windows of `duration`
///
/// Windows are aligned to the first window start, which defaults to the time
/// of the first call. Calls made before an explicit start count toward the
/// first window. The call that brings the count to the threshold is
/// itself rejected and the count starts over.
#[derive(Debug)]
pub struct FixedWindowCountFuse {
    threshold: usize,
    duration: Duration,
    state: Mutex<WindowState>,
    clock: Arc<dyn Clock>,
    core: FuseCore,
}

impl FixedWindowCountFuse {
    pub fn new(threshold: usize, duration: Duration) -> Result<Self, CircuitError> {
        Self::with_clock(threshold, duration, None, SystemClock::shared())
    }

    /// Align windows to `window_start` instead of the first call
    pub fn starting_at(
        threshold: usize,
        duration: Duration,
        window_start: Instant,
    ) -> Result<Self, CircuitError> {
        Self::with_clock(threshold, duration, Some(window_start), SystemClock::shared())
    }

    pub fn with_clock(
        threshold: usize,
        duration: Duration,
        window_start: Option<Instant>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CircuitError> {
        validate_count("threshold", threshold)?;
        validate_duration("duration", duration)?;

        Ok(Self {
            threshold,
            duration,
            state: Mutex::new(WindowState {
                window_start,
                calls: VecDeque::new(),
            }),
            clock,
            core: FuseCore::new("fixed_window_count", FuseStatus::Normal),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start of the current window, if one has been established
    pub fn window_start(&self) -> Option<Instant> {
        self.state.lock().window_start
    }

    /// Calls counted in the current window as of the last call
    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move `start` forward by as many whole windows as have fully elapsed
    fn roll_forward(&self, start: Instant, now: Instant) -> Instant {
        let elapsed = elapsed_since(now, start);
        if elapsed < self.duration {
            return start;
        }

        let windows = elapsed.as_nanos() / self.duration.as_nanos();
        let offset = self.duration.as_nanos().saturating_mul(windows);
        let offset = Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX));

        debug!(
            fuse = self.core.kind(),
            windows = windows as u64,
            "Window rolled over"
        );
        start.checked_add(offset).unwrap_or(now)
    }
}

impl Fuse for FixedWindowCountFuse {
    fn kind(&self) -> &'static str {
        self.core.kind()
    }

    fn status(&self) -> FuseStatus {
        self.core.status()
    }

    fn admit(&self, _args: Arguments<'_>) -> Result<(), FuseStatus> {
        let change = {
            let mut state = self.state.lock();
            let status = self.core.status();
            if status.is_tripped() {
                return Err(status);
            }

            // Never earlier than the newest call or the window start, even
            // once the queue was cleared
            let mut now = self.clock.now();
            if let Some(last) = state.calls.back()
                && *last > now
            {
                now = *last;
            }
            if let Some(start) = state.window_start
                && start > now
            {
                now = start;
            }
            let start = self.roll_forward(*state.window_start.get_or_insert(now), now);
            state.window_start = Some(start);

            while let Some(front) = state.calls.front() {
                if *front < start {
                    state.calls.pop_front();
                } else {
                    break;
                }
            }

            state.calls.push_back(now);

            if state.calls.len() < self.threshold {
                return Ok(());
            }

            state.calls.clear();
            self.core.apply(Transition::Blow)
        };

        self.core.publish(change);
        Err(FuseStatus::Tripped)
    }

    fn trip(&self) {
        let change = {
            let mut state = self.state.lock();
            state.calls.clear();
            self.core.apply(Transition::Trip)
        };
        self.core.publish(change);
    }

    fn reset(&self) {
        let change = {
            let mut state = self.state.lock();
            state.calls.clear();
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
