use super::{Fuse, FuseCore, FuseObserver, validate_count, validate_duration};
use crate::callbacks::SubscriptionId;
use crate::errors::CircuitError;
use crate::lifecycle::Transition;
use crate::ticker::Ticker;
use crate::{Arguments, FuseStatus, FuseStatusChange};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Default)]
struct TickState {
    count: usize,
    /// Bumped whenever ticking stops; ticks from an older epoch are ignored
    epoch: u64,
    ticker: Option<Ticker>,
    disposed: bool,
}

impl TickState {
    fn stop_ticking(&mut self) {
        self.epoch += 1;
        if self.ticker.take().is_some() {
            debug!("Tick stopped");
        }
    }
}

#[derive(Debug)]
struct Shared {
    threshold: usize,
    duration: Duration,
    state: Mutex<TickState>,
    core: FuseCore,
}

impl Shared {
    /// One tick: start a new window, or trip if the counter is somehow at the
    /// threshold. Returns whether the ticker should keep running.
    ///
    /// `admit` trips the fuse the moment the counter reaches the threshold,
    /// so a running tick only ever clears the counter.
    fn on_tick(&self, epoch: u64) -> bool {
        let change = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return false;
            }

            if state.count < self.threshold {
                state.count = 0;
                return true;
            }

            state.stop_ticking();
            self.core.apply(Transition::Blow)
        };

        self.core.publish(change);
        false
    }
}

/// Counts calls per wall-clock window of `duration`
///
/// The first call arms the fuse (`Initial` to `Normal`) and starts a periodic
/// tick. A call that brings the counter to the threshold trips the fuse
/// immediately and is itself rejected, which also stops the tick. While the
/// fuse is `Normal` the counter is therefore below the threshold and each tick
/// just clears it. Reset returns the fuse to `Initial`; ticking resumes with
/// the next call.
#[derive(Debug)]
pub struct TimedWindowCountFuse {
    shared: Arc<Shared>,
}

impl TimedWindowCountFuse {
    pub fn new(threshold: usize, duration: Duration) -> Result<Self, CircuitError> {
        validate_count("threshold", threshold)?;
        validate_duration("duration", duration)?;

        Ok(Self {
            shared: Arc::new(Shared {
                threshold,
                duration,
                state: Mutex::new(TickState::default()),
                core: FuseCore::new("timed_window_count", FuseStatus::Initial),
            }),
        })
    }

    pub fn threshold(&self) -> usize {
        self.shared.threshold
    }

    pub fn duration(&self) -> Duration {
        self.shared.duration
    }

    /// Calls counted in the current window
    pub fn count(&self) -> usize {
        self.shared.state.lock().count
    }

    /// Whether a tick thread is currently running
    pub fn is_ticking(&self) -> bool {
        self.shared.state.lock().ticker.is_some()
    }

    fn start_ticking(&self, state: &mut TickState) {
        if state.disposed {
            debug!(fuse = self.shared.core.kind(), "Fuse disposed, not ticking");
            return;
        }

        state.stop_ticking();
        let epoch = state.epoch;
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);

        let spawned = Ticker::spawn(
            "fuse-window-tick".to_string(),
            self.shared.duration,
            move || match weak.upgrade() {
                Some(shared) => shared.on_tick(epoch),
                None => false,
            },
        );

        match spawned {
            Ok(ticker) => {
                debug!(
                    fuse = self.shared.core.kind(),
                    period_ms = self.shared.duration.as_millis() as u64,
                    "Tick started"
                );
                state.ticker = Some(ticker);
            }
            Err(e) => error!(
                fuse = self.shared.core.kind(),
                error = %e,
                "Failed to spawn tick thread; only per-call checks apply"
            ),
        }
    }

    /// Stop the current tick and apply a manual transition
    fn stop_with(&self, transition: Transition) -> Option<FuseStatusChange> {
        let mut state = self.shared.state.lock();
        state.count = 0;
        state.stop_ticking();
        self.shared.core.apply(transition)
    }
}

impl Fuse for TimedWindowCountFuse {
    fn kind(&self) -> &'static str {
        self.shared.core.kind()
    }

    fn status(&self) -> FuseStatus {
        self.shared.core.status()
    }

    fn admit(&self, _args: Arguments<'_>) -> Result<(), FuseStatus> {
        let core = &self.shared.core;

        let (armed, blown) = {
            let mut state = self.shared.state.lock();
            let status = core.status();
            if status.is_tripped() {
                return Err(status);
            }

            let armed = core.apply(Transition::Arm);
            if armed.is_some() {
                self.start_ticking(&mut state);
            }

            state.count += 1;
            if state.count < self.shared.threshold {
                (armed, None)
            } else {
                state.stop_ticking();
                (armed, core.apply(Transition::Blow))
            }
        };

        let passed = blown.is_none();
        core.publish(armed);
        core.publish(blown);
        if passed {
            Ok(())
        } else {
            Err(FuseStatus::Tripped)
        }
    }

    fn trip(&self) {
        let change = self.stop_with(Transition::Trip);
        self.shared.core.publish(change);
    }

    fn reset(&self) {
        let change = self.stop_with(Transition::Rearm);
        self.shared.core.publish(change);
    }

    fn subscribe(&self, observer: FuseObserver) -> SubscriptionId {
        self.shared.core.subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.core.unsubscribe(id)
    }

    fn dispose(&self) {
        let mut state = self.shared.state.lock();
        if !state.disposed {
            state.disposed = true;
            state.stop_ticking();
            debug!(fuse = self.shared.core.kind(), "Fuse disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuse::test_support::record_changes;
    use std::thread;

    #[test]
    fn test_starts_initial_and_first_call_arms() {
        let fuse = TimedWindowCountFuse::new(10, Duration::from_secs(1)).unwrap();
        let changes = record_changes(&fuse);

        assert_eq!(fuse.status(), FuseStatus::Initial);
        assert!(!fuse.is_ticking());

        assert!(fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert!(fuse.is_ticking());
        assert_eq!(fuse.count(), 1);

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous, FuseStatus::Initial);
        assert_eq!(changes[0].current, FuseStatus::Normal);
    }

    #[test]
    fn test_reaching_threshold_rejects_call() {
        let fuse = TimedWindowCountFuse::new(10, Duration::from_secs(1)).unwrap();

        for i in 0..9 {
            assert!(fuse.try_pass(&[]), "Call {} should pass", i + 1);
            assert_eq!(fuse.count(), i + 1);
        }

        assert!(!fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Tripped);
        assert!(!fuse.is_ticking());
        assert!(!fuse.try_pass(&[]));
    }

    #[test]
    fn test_tick_clears_counter() {
        let fuse = TimedWindowCountFuse::new(5, Duration::from_millis(40)).unwrap();

        fuse.try_pass(&[]);
        fuse.try_pass(&[]);
        fuse.try_pass(&[]);
        assert_eq!(fuse.count(), 3);

        thread::sleep(Duration::from_millis(120));
        assert_eq!(fuse.count(), 0);
        assert_eq!(fuse.status(), FuseStatus::Normal);

        for _ in 0..4 {
            assert!(fuse.try_pass(&[]));
        }
    }

    #[test]
    fn test_tick_trips_when_threshold_reached() {
        let fuse = TimedWindowCountFuse::new(3, Duration::from_secs(60)).unwrap();
        let changes = record_changes(&fuse);
        fuse.try_pass(&[]);

        let epoch = {
            let mut state = fuse.shared.state.lock();
            state.count = 3;
            state.epoch
        };

        assert!(!fuse.shared.on_tick(epoch));
        assert_eq!(fuse.status(), FuseStatus::Tripped);
        assert!(!fuse.is_ticking());
        assert_eq!(changes.lock().len(), 2);
    }

    #[test]
    fn test_stale_tick_is_ignored() {
        let fuse = TimedWindowCountFuse::new(3, Duration::from_secs(60)).unwrap();
        fuse.try_pass(&[]);
        let stale = fuse.shared.state.lock().epoch;

        fuse.reset();
        fuse.try_pass(&[]);
        fuse.shared.state.lock().count = 3;

        assert!(!fuse.shared.on_tick(stale));
        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert_eq!(fuse.count(), 3);
    }

    #[test]
    fn test_ticks_only_clear_below_threshold() {
        let fuse = TimedWindowCountFuse::new(3, Duration::from_millis(30)).unwrap();
        let changes = record_changes(&fuse);

        // Two calls per window, repeatedly, never reach the threshold
        for _ in 0..3 {
            assert!(fuse.try_pass(&[]));
            assert!(fuse.try_pass(&[]));
            thread::sleep(Duration::from_millis(80));
            assert_eq!(fuse.count(), 0);
        }

        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert!(fuse.is_ticking());
        assert_eq!(changes.lock().len(), 1);
    }

    #[test]
    fn test_manual_trip_stops_ticking() {
        let fuse = TimedWindowCountFuse::new(5, Duration::from_millis(20)).unwrap();
        fuse.try_pass(&[]);
        fuse.try_pass(&[]);

        fuse.trip();
        assert_eq!(fuse.status(), FuseStatus::ManuallyTripped);
        assert_eq!(fuse.count(), 0);
        assert!(!fuse.is_ticking());

        thread::sleep(Duration::from_millis(60));
        assert_eq!(fuse.status(), FuseStatus::ManuallyTripped);
        assert!(!fuse.try_pass(&[]));
    }

    #[test]
    fn test_reset_returns_to_initial_and_rearms_lazily() {
        let fuse = TimedWindowCountFuse::new(2, Duration::from_secs(1)).unwrap();
        fuse.try_pass(&[]);
        assert!(!fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Tripped);

        fuse.reset();
        assert_eq!(fuse.status(), FuseStatus::Initial);
        assert_eq!(fuse.count(), 0);
        assert!(!fuse.is_ticking());

        assert!(fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert!(fuse.is_ticking());
    }

    #[test]
    fn test_dispose_stops_ticking_for_good() {
        let fuse = TimedWindowCountFuse::new(10, Duration::from_millis(20)).unwrap();
        fuse.try_pass(&[]);

        fuse.dispose();
        fuse.dispose();
        assert!(!fuse.is_ticking());

        fuse.reset();
        assert!(fuse.try_pass(&[]));
        assert!(fuse.try_pass(&[]));
        thread::sleep(Duration::from_millis(70));

        // No tick ran, so nothing cleared the counter
        assert_eq!(fuse.count(), 2);
        assert!(!fuse.is_ticking());
    }

    #[test]
    fn test_concurrent_calls_and_ticks() {
        let fuse = Arc::new(TimedWindowCountFuse::new(1_000_000, Duration::from_millis(5)).unwrap());
        let mut handles = vec![];

        for _ in 0..4 {
            let fuse = Arc::clone(&fuse);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    assert!(fuse.try_pass(&[]));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fuse.status(), FuseStatus::Normal);
        assert!(fuse.count() <= 2000);
    }
}
