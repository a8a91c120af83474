//! Blocking queue of delayed elements.
//!
//! A [`DelayQueue`] holds `(value, expiration)` pairs and releases each value
//! onto its output channel only once the clock has reached the value's
//! expiration. The head of the queue is always the element expiring
//! soonest. The timing wheel feeds it buckets keyed by their scheduled
//! expiration and drives its clock off whatever the poll loop delivers.
//!
//! ## Wakeup protocol
//!
//! The poll loop sleeps until the head expires. An `offer` that lands a new
//! minimum has to cut that sleep short, which is coordinated by one atomic
//! `sleeping` flag and a capacity-1 wakeup channel:
//!
//! * the poll loop sets `sleeping` before it blocks, and re-reads the heap
//!   minimum under the lock after every wakeup;
//! * an offerer that observes its element at index 0 tries to swap
//!   `sleeping` back off, and only the winner of that swap sends a token;
//! * after a timed sleep expires on its own, the poll loop swaps the flag
//!   off itself and drains any token that raced in.
//!
//! Racing offers may each see index 0 and lose the swap; the loop re-peeks
//! the true minimum every iteration, so a lost wakeup is harmless and a
//! stale token never deadlocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use crate::clock::Clock;
use crate::pqueue::PriorityQueue;

/// Delay queue over a mutex-protected indexed heap.
pub struct DelayQueue<T> {
    heap: Mutex<PriorityQueue<T>>,
    sleeping: AtomicBool,
    wakeup_tx: mpsc::Sender<()>,
    wakeup_rx: AsyncMutex<mpsc::Receiver<()>>,
    out_tx: mpsc::Sender<T>,
    out_rx: Mutex<Option<mpsc::Receiver<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T> DelayQueue<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (wakeup_tx, wakeup_rx) = mpsc::channel(1);
        let (out_tx, out_rx) = mpsc::channel(1);
        Self {
            heap: Mutex::new(PriorityQueue::new()),
            sleeping: AtomicBool::new(false),
            wakeup_tx,
            wakeup_rx: AsyncMutex::new(wakeup_rx),
            out_tx,
            out_rx: Mutex::new(Some(out_rx)),
            clock,
        }
    }

    /// Take the output stream. Yields `None` after the first call.
    pub fn take_chan(&self) -> Option<mpsc::Receiver<T>> {
        self.out_rx
            .lock()
            .expect("delay queue output mutex poisoned")
            .take()
    }

    /// Insert `value` expiring at `expiration` (epoch ms).
    ///
    /// If the element becomes the new head while the poll loop is asleep,
    /// the loop is woken so it can shorten its wait.
    pub fn offer(&self, value: T, expiration: i64) {
        let index = {
            let mut heap = self.heap.lock().expect("delay queue heap mutex poisoned");
            heap.add(value, expiration).index()
        };

        if index == Some(0)
            && self
                .sleeping
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            trace!("delay queue: new minimum at {expiration}, waking poll loop");
            let _ = self.wakeup_tx.try_send(());
        }
    }

    /// Run the release loop until `cancel` fires.
    ///
    /// Expired values are sent to the channel returned by [`take_chan`];
    /// each value is removed from the heap only after the send succeeds, so
    /// a cancellation during a pending send leaves the head in place.
    ///
    /// [`take_chan`]: DelayQueue::take_chan
    pub async fn poll(&self, mut cancel: watch::Receiver<bool>) {
        let mut wakeup = self.wakeup_rx.lock().await;
        loop {
            let now = self.clock.now_ms();
            let head = {
                let heap = self.heap.lock().expect("delay queue heap mutex poisoned");
                let head = heap.peek().cloned();
                match &head {
                    Some(element) if element.priority() <= now => {}
                    // Nothing due: flag the loop as sleeping so offers of a
                    // new minimum know to wake it.
                    _ => self.sleeping.store(true, Ordering::Release),
                }
                head
            };

            let Some(element) = head else {
                tokio::select! {
                    _ = cancel.changed() => break,
                    _ = wakeup.recv() => continue,
                }
            };

            let delta = element.priority() - now;
            if delta <= 0 {
                let value = element.value().clone();
                tokio::select! {
                    sent = self.out_tx.send(value) => {
                        if sent.is_err() {
                            debug!("delay queue: output receiver dropped, stopping poll");
                            break;
                        }
                        let mut heap =
                            self.heap.lock().expect("delay queue heap mutex poisoned");
                        let _ = heap.remove(&element);
                    }
                    _ = cancel.changed() => break,
                }
                continue;
            }

            tokio::select! {
                _ = wakeup.recv() => {}
                _ = tokio::time::sleep(Duration::from_millis(delta as u64)) => {
                    if !self.sleeping.swap(false, Ordering::AcqRel) {
                        // An offer won the flag race during our sleep; its
                        // token is stale now, drain it so the next sleeping
                        // phase starts clean.
                        let _ = wakeup.try_recv();
                    }
                }
                _ = cancel.changed() => break,
            }
        }
        self.sleeping.store(false, Ordering::Release);
        debug!("delay queue poll loop terminated");
    }

    pub fn len(&self) -> usize {
        self.heap
            .lock()
            .expect("delay queue heap mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
