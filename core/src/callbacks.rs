//! Observer lists for status-change notifications

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by [`Observers::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Observer callback shared between the list and in-flight notifications
pub type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Multicast list of callbacks
///
/// `notify` runs callbacks synchronously on the calling thread with no lock
/// held, so a callback may subscribe, unsubscribe, or re-enter the object
/// that is notifying.
pub struct Observers<E> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(SubscriptionId, Observer<E>)>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Observer<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, observer));
        id
    }

    /// Remove an observer; returns false if it was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Deliver `event` to every observer subscribed at the time of the call
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Observer<E>> = self
            .entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            observer(event);
        }
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.len())
            .finish()
    }
}
