//! Timer tasks and the public handle returned to schedulers.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use log::warn;

use super::bucket::Bucket;
use super::{Command, CommandOutcome, WheelShared};
use crate::errors::TimerError;

/// Callback invoked with the driver's view of the firing instant.
///
/// Callbacks run on their own worker task, never on the driver, so a slow
/// or panicking callback cannot stall the clock.
pub type Handler = Arc<dyn Fn(DateTime<Utc>) + Send + Sync + 'static>;

/// Whether a task fires once or re-schedules itself after each firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    OneShot,
    Recurring,
}

/// Back-link from an entry to the bucket slot currently holding it.
pub(crate) struct BucketSlot {
    bucket: Weak<Bucket>,
    index: usize,
}

/// A scheduled unit of work.
///
/// Everything except `cancelled` is mutated only on the driver task. The
/// cancelled flag is set by the driver's command arm and read from any
/// thread (the fast path of [`TimerTask::stop`] and the recurring
/// re-schedule check).
pub(crate) struct TimerEntry {
    pub(crate) id: u64,
    pub(crate) duration_ms: i64,
    expiration: AtomicI64,
    pub(crate) kind: TaskKind,
    pub(crate) handler: Handler,
    cancelled: AtomicBool,
    slot: Mutex<Option<BucketSlot>>,
}

impl TimerEntry {
    pub(crate) fn new(
        id: u64,
        duration_ms: i64,
        expiration: i64,
        kind: TaskKind,
        handler: Handler,
    ) -> Self {
        Self {
            id,
            duration_ms,
            expiration: AtomicI64::new(expiration),
            kind,
            handler,
            cancelled: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    pub(crate) fn expiration(&self) -> i64 {
        self.expiration.load(Ordering::Acquire)
    }

    pub(crate) fn set_expiration(&self, expiration: i64) {
        self.expiration.store(expiration, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn set_slot(&self, bucket: &Arc<Bucket>, index: usize) {
        let mut slot = self.slot.lock().expect("task slot mutex poisoned");
        *slot = Some(BucketSlot {
            bucket: Arc::downgrade(bucket),
            index,
        });
    }

    pub(crate) fn clear_slot(&self) {
        let mut slot = self.slot.lock().expect("task slot mutex poisoned");
        *slot = None;
    }

    /// The slot index if this entry currently sits in `bucket`.
    pub(crate) fn slot_in(&self, bucket: &Arc<Bucket>) -> Option<usize> {
        let slot = self.slot.lock().expect("task slot mutex poisoned");
        let slot = slot.as_ref()?;
        let current = slot.bucket.upgrade()?;
        if Arc::ptr_eq(&current, bucket) {
            Some(slot.index)
        } else {
            None
        }
    }

    /// The bucket currently holding this entry, if any.
    pub(crate) fn current_bucket(&self) -> Option<Arc<Bucket>> {
        let slot = self.slot.lock().expect("task slot mutex poisoned");
        slot.as_ref()?.bucket.upgrade()
    }
}

/// Handle to a scheduled task, returned by
/// [`after_func`](super::TimingWheel::after_func) and
/// [`tick_func`](super::TimingWheel::tick_func).
#[derive(Clone)]
pub struct TimerTask {
    entry: Arc<TimerEntry>,
    shared: Arc<WheelShared>,
}

impl std::fmt::Debug for TimerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerTask")
            .field("id", &self.entry.id)
            .field("kind", &self.entry.kind)
            .finish()
    }
}

impl TimerTask {
    pub(crate) fn new(entry: Arc<TimerEntry>, shared: Arc<WheelShared>) -> Self {
        Self { entry, shared }
    }

    /// The wheel-unique id of this task.
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    /// Whether this task fires once or recurs.
    pub fn kind(&self) -> TaskKind {
        self.entry.kind
    }

    /// Cancel the task.
    ///
    /// Returns `Ok(true)` when the task was still live (or already stopped)
    /// and will not fire again, `Ok(false)` when it could not be removed —
    /// a one-shot that already fired, or a firing currently in flight. A
    /// recurring task whose callback is mid-flight completes that firing
    /// but is not re-scheduled once the cancellation is acknowledged.
    ///
    /// Fully synchronous from the caller's view: resolves only after the
    /// driver has processed the deletion. Errors with
    /// [`TimerError::Stopped`] if the wheel shut down first.
    pub async fn stop(&self) -> Result<bool, TimerError> {
        if self.entry.is_cancelled() {
            return Ok(true);
        }

        let id = self.entry.id.to_string();
        let outcome = self.shared.rendezvous.register(&id)?;
        self.shared
            .cmd_tx
            .send(Command::Delete(Arc::clone(&self.entry)))
            .await
            .map_err(|_| TimerError::Stopped)?;

        match outcome.await {
            Ok(CommandOutcome::Stopped(stopped)) => {
                Ok(stopped || self.entry.is_cancelled())
            }
            Ok(other) => {
                warn!("task {}: unexpected stop outcome {other:?}", self.entry.id);
                Err(TimerError::Stopped)
            }
            Err(_) => Err(TimerError::Stopped),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry_with_expiration(
        id: u64,
        expiration: i64,
        kind: TaskKind,
    ) -> Arc<TimerEntry> {
        Arc::new(TimerEntry::new(
            id,
            10,
            expiration,
            kind,
            Arc::new(|_now| {}),
        ))
    }

    #[test]
    fn cancelled_flag_round_trips() {
        let entry = entry_with_expiration(1, 100, TaskKind::OneShot);
        assert!(!entry.is_cancelled());
        entry.cancel();
        assert!(entry.is_cancelled());
    }

    #[test]
    fn expiration_is_mutable() {
        let entry = entry_with_expiration(1, 100, TaskKind::Recurring);
        assert_eq!(entry.expiration(), 100);
        entry.set_expiration(250);
        assert_eq!(entry.expiration(), 250);
    }

    #[test]
    fn slot_links_follow_bucket() {
        let entry = entry_with_expiration(1, 100, TaskKind::OneShot);
        let bucket = Arc::new(Bucket::new());
        assert!(entry.current_bucket().is_none());

        entry.set_slot(&bucket, 3);
        assert_eq!(entry.slot_in(&bucket), Some(3));
        assert!(entry.current_bucket().is_some());

        entry.clear_slot();
        assert!(entry.slot_in(&bucket).is_none());
        assert!(entry.current_bucket().is_none());
    }
}
