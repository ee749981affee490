//! Time-bounded buffer used by sliding-window fuses
//!
//! Entries are kept in insertion order with their insertion time. Reads evict
//! from the front until the oldest entry is younger than the TTL, so each
//! entry is evicted at most once and a read never rescans the live window.

use crate::clock::{Clock, SystemClock, elapsed_since};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thread-safe buffer of timestamped items with a fixed time-to-live
#[derive(Debug)]
pub struct TtlBuffer<T> {
    ttl: Duration,
    entries: Mutex<VecDeque<(Instant, T)>>,
    clock: Arc<dyn Clock>,
}

impl<T> TtlBuffer<T> {
    /// Create a buffer reading time from the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock::shared())
    }

    /// Create a buffer with a custom time source
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Append an item stamped with the current time
    pub fn add(&self, item: T) {
        let mut entries = self.entries.lock();
        let mut now = self.clock.now();

        // Keep timestamps non-decreasing even if the clock stepped back
        if let Some((last, _)) = entries.back()
            && *last > now
        {
            now = *last;
        }

        entries.push_back((now, item));
    }

    /// Number of live items, evicting expired ones first
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn evict_expired(&self, entries: &mut VecDeque<(Instant, T)>) {
        let now = self.clock.now();

        while let Some((inserted_at, _)) = entries.front() {
            if elapsed_since(now, *inserted_at) >= self.ttl {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

impl<T: Clone> TtlBuffer<T> {
    /// Snapshot of the live items, oldest first
    pub fn items(&self) -> Vec<T> {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        entries.iter().map(|(_, item)| item.clone()).collect()
    }
}
