//! Bucket: the task list behind one deadline slot of a wheel level.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use super::task::TimerEntry;

/// Expiration value of a bucket that is not enqueued anywhere.
pub(crate) const IDLE_EXPIRATION: i64 = -1;

/// A list of timer entries sharing one quantized deadline.
///
/// The entry list is only ever touched from the driver task; the scheduled
/// expiration is the one field read concurrently (by `offer` deciding the
/// delay-queue priority), so it is an atomic. Entries keep a back-link to
/// their bucket plus their slot index, giving O(1) removal via `swap_remove`.
pub(crate) struct Bucket {
    entries: Mutex<Vec<Arc<TimerEntry>>>,
    expiration: AtomicI64,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            expiration: AtomicI64::new(IDLE_EXPIRATION),
        }
    }

    pub(crate) fn expiration(&self) -> i64 {
        self.expiration.load(Ordering::Acquire)
    }

    /// Swap in a new scheduled expiration; true iff the value changed.
    ///
    /// The driver enqueues the bucket into the delay queue exactly when this
    /// returns true, which is the single idle→enlisted transition per cycle.
    pub(crate) fn set_expiration(&self, expiration: i64) -> bool {
        self.expiration.swap(expiration, Ordering::AcqRel) != expiration
    }

    pub(crate) fn add(self: &Arc<Self>, entry: Arc<TimerEntry>) {
        let mut entries = self.entries.lock().expect("bucket entries mutex poisoned");
        entry.set_slot(self, entries.len());
        entries.push(entry);
    }

    /// Detach `entry` if its back-link still names this bucket.
    pub(crate) fn remove(self: &Arc<Self>, entry: &Arc<TimerEntry>) -> bool {
        let mut entries = self.entries.lock().expect("bucket entries mutex poisoned");
        let Some(index) = entry.slot_in(self) else {
            return false;
        };
        if index >= entries.len() || !Arc::ptr_eq(&entries[index], entry) {
            return false;
        }
        entries.swap_remove(index);
        if index < entries.len() {
            entries[index].set_slot(self, index);
        }
        entry.clear_slot();
        true
    }

    /// Detach every entry front-to-back, handing each to `reinsert`, then
    /// reset the scheduled expiration to idle.
    pub(crate) fn flush(self: &Arc<Self>, mut reinsert: impl FnMut(Arc<TimerEntry>)) {
        let drained: Vec<Arc<TimerEntry>> = {
            let mut entries = self.entries.lock().expect("bucket entries mutex poisoned");
            entries.drain(..).collect()
        };
        for entry in drained {
            entry.clear_slot();
            reinsert(entry);
        }
        self.set_expiration(IDLE_EXPIRATION);
    }

    #[allow(dead_code)] // exercised by tests; kept for parity with the queues
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("bucket entries mutex poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wheel::task::{tests::entry_with_expiration, TaskKind};

    #[test]
    fn set_expiration_reports_transitions() {
        let bucket = Bucket::new();
        assert_eq!(bucket.expiration(), IDLE_EXPIRATION);
        assert!(bucket.set_expiration(100));
        assert!(!bucket.set_expiration(100), "same value is not a change");
        assert!(bucket.set_expiration(IDLE_EXPIRATION));
        assert!(bucket.set_expiration(100), "reuse after idle is a change");
    }

    #[test]
    fn add_then_remove_detaches_entry() {
        let bucket = Arc::new(Bucket::new());
        let entry = entry_with_expiration(1, 105, TaskKind::OneShot);
        bucket.add(Arc::clone(&entry));
        assert_eq!(bucket.len(), 1);
        assert!(entry.slot_in(&bucket).is_some());

        assert!(bucket.remove(&entry));
        assert_eq!(bucket.len(), 0);
        assert!(entry.slot_in(&bucket).is_none());
        assert!(!bucket.remove(&entry), "second remove is a no-op");
    }

    #[test]
    fn remove_against_wrong_bucket_is_rejected() {
        let home = Arc::new(Bucket::new());
        let other = Arc::new(Bucket::new());
        let entry = entry_with_expiration(2, 110, TaskKind::OneShot);
        home.add(Arc::clone(&entry));

        assert!(!other.remove(&entry));
        assert_eq!(home.len(), 1);
        assert!(entry.slot_in(&home).is_some());
    }

    #[test]
    fn swap_remove_keeps_survivor_slot_in_sync() {
        let bucket = Arc::new(Bucket::new());
        let first = entry_with_expiration(1, 100, TaskKind::OneShot);
        let second = entry_with_expiration(2, 101, TaskKind::OneShot);
        let third = entry_with_expiration(3, 102, TaskKind::OneShot);
        bucket.add(Arc::clone(&first));
        bucket.add(Arc::clone(&second));
        bucket.add(Arc::clone(&third));

        assert!(bucket.remove(&first));
        // The tail entry was swapped into slot 0; its back-link must follow.
        assert!(bucket.remove(&third));
        assert!(bucket.remove(&second));
        assert_eq!(bucket.len(), 0);
    }

    #[test]
    fn flush_detaches_all_and_resets_expiration() {
        let bucket = Arc::new(Bucket::new());
        let first = entry_with_expiration(1, 100, TaskKind::OneShot);
        let second = entry_with_expiration(2, 101, TaskKind::Recurring);
        bucket.add(Arc::clone(&first));
        bucket.add(Arc::clone(&second));
        bucket.set_expiration(100);

        let mut flushed = Vec::new();
        bucket.flush(|entry| flushed.push(entry.id));
        assert_eq!(flushed, vec![1, 2], "flush walks front to back");
        assert_eq!(bucket.len(), 0);
        assert_eq!(bucket.expiration(), IDLE_EXPIRATION);
        assert!(first.slot_in(&bucket).is_none());
    }
}
