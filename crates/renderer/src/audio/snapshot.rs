use std::sync::Arc;

use parking_lot::Mutex;

/// Single-value handoff between the render tick and the audio callback.
///
/// The writer holds the lock only to swap an `Arc`. Readers never block:
/// when the slot is contended they get `None` and keep whatever they copied
/// last time.
pub struct SnapshotSlot<T> {
    pub(super) latest: Mutex<Arc<T>>,
}

impl<T> SnapshotSlot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            latest: Mutex::new(Arc::new(initial)),
        }
    }

    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        *self.latest.lock() = value;
    }

    pub fn try_latest(&self) -> Option<Arc<T>> {
        self.latest.try_lock().map(|latest| Arc::clone(&latest))
    }

    /// Blocking read for contexts that may wait.
    pub fn latest(&self) -> Arc<T> {
        Arc::clone(&self.latest.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_the_last_publish() {
        let slot = SnapshotSlot::new(1);
        assert_eq!(slot.try_latest().as_deref(), Some(&1));
        slot.publish(2);
        slot.publish(3);
        assert_eq!(*slot.latest(), 3);
    }

    #[test]
    fn contended_read_returns_none() {
        let slot = SnapshotSlot::new("a");
        let guard = slot.latest.lock();
        assert!(slot.try_latest().is_none());
        drop(guard);
        assert_eq!(slot.try_latest().as_deref(), Some(&"a"));
    }
}
