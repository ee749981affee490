use super::{Fuse, FuseCore, FuseObserver, validate_count, validate_duration};
use crate::buffer::TtlBuffer;
use crate::callbacks::SubscriptionId;
use crate::clock::{Clock, SystemClock};
use crate::errors::CircuitError;
use crate::lifecycle::Transition;
use crate::{Arguments, FuseStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Counts calls made within the last `duration`
///
/// Like [`crate::FixedWindowCountFuse`], the call that reaches the threshold
/// is rejected and the buffer is cleared when the fuse trips.
#[derive(Debug)]
pub struct SlidingWindowCountFuse {
    threshold: usize,
    buffer: TtlBuffer<()>,
    /// Serializes the add/count/trip sequence against trip and reset
    gate: Mutex<()>,
    core: FuseCore,
}

impl SlidingWindowCountFuse {
    pub fn new(threshold: usize, duration: Duration) -> Result<Self, CircuitError> {
        Self::with_clock(threshold, duration, SystemClock::shared())
    }

    pub fn with_clock(
        threshold: usize,
        duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CircuitError> {
        validate_count("threshold", threshold)?;
        validate_duration("duration", duration)?;

        Ok(Self {
            threshold,
            buffer: TtlBuffer::with_clock(duration, clock),
            gate: Mutex::new(()),
            core: FuseCore::new("sliding_window_count", FuseStatus::Normal),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn duration(&self) -> Duration {
        self.buffer.ttl()
    }

    /// Calls still inside the window
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Fuse for SlidingWindowCountFuse {
    fn kind(&self) -> &'static str {
        self.core.kind()
    }

    fn status(&self) -> FuseStatus {
        self.core.status()
    }

    fn admit(&self, _args: Arguments<'_>) -> Result<(), FuseStatus> {
        let change = {
            let _gate = self.gate.lock();
            let status = self.core.status();
            if status.is_tripped() {
                return Err(status);
            }

            self.buffer.add(());
            if self.buffer.items().len() < self.threshold {
                return Ok(());
            }

            self.buffer.clear();
            self.core.apply(Transition::Blow)
        };

        self.core.publish(change);
        Err(FuseStatus::Tripped)
    }

    fn trip(&self) {
        let change = {
            let _gate = self.gate.lock();
            self.buffer.clear();
            self.core.apply(Transition::Trip)
        };
        self.core.publish(change);
    }

    fn reset(&self) {
        let change = {
            let _gate = self.gate.lock();
            self.buffer.clear();
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
