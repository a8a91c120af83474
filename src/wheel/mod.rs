//! The hierarchical timing wheel driver.
//!
//! [`TimingWheel`] owns the wheel hierarchy, the delay queue of armed
//! buckets, and the rendezvous registry, and runs them with two cooperating
//! tokio tasks:
//!
//! * the **poll task** runs the delay queue's release loop, delivering each
//!   bucket once its scheduled expiration has passed;
//! * the **driver task** `select!`s over the delivered buckets (advance the
//!   clock, flush, cascade or fire) and the command channel (insertions and
//!   cancellations submitted through [`after_func`], [`tick_func`] and
//!   [`TimerTask::stop`]).
//!
//! Keeping every mutation of the rings, buckets, and task back-links on the
//! single driver task is what makes the wheel race-free: submitters never
//! touch the structure, they only exchange commands and rendezvous
//! outcomes with the driver. Callbacks run on a fresh worker task per
//! firing, so a slow callback cannot stall the clock.
//!
//! [`after_func`]: TimingWheel::after_func
//! [`tick_func`]: TimingWheel::tick_func

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

mod bucket;
mod ring;
mod task;

pub use task::{Handler, TaskKind, TimerTask};

use crate::clock::{Clock, SystemClock};
use crate::delayqueue::DelayQueue;
use crate::errors::TimerError;
use crate::options::WheelOptions;
use crate::rendezvous::Rendezvous;
use crate::stats::{Snapshot, WheelStats};
use bucket::Bucket;
use ring::Ring;
use task::TimerEntry;

/// Delay queue specialization carrying armed buckets.
pub(crate) type DelayedBuckets = DelayQueue<Arc<Bucket>>;

/// Commands submitted to the driver task.
pub(crate) enum Command {
    AddNew(Arc<TimerEntry>),
    Delete(Arc<TimerEntry>),
}

/// Outcome delivered through a command's rendezvous slot.
#[derive(Debug)]
pub(crate) enum CommandOutcome {
    Added(TimerTask),
    Stopped(bool),
}

/// State shared between the wheel handle, task handles, and the driver.
pub(crate) struct WheelShared {
    pub(crate) tick_ms: i64,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cmd_tx: mpsc::Sender<Command>,
    pub(crate) rendezvous: Rendezvous<CommandOutcome>,
    pub(crate) stats: WheelStats,
    next_id: AtomicU64,
}

/// Run a firing on its own worker task.
pub(crate) fn spawn_handler(id: u64, handler: Handler, fired_at: DateTime<Utc>) {
    tokio::spawn(async move {
        trace!("task {id}: firing");
        handler(fired_at);
    });
}

/// Hierarchical timing wheel.
///
/// Construction validates the options; [`start`](TimingWheel::start) spawns
/// the driver pair; [`stop`](TimingWheel::stop) is terminal. Scheduling
/// entry points may be called before `start` — their commands queue up and
/// are processed once the driver runs.
pub struct TimingWheel {
    shared: Arc<WheelShared>,
    queue: Arc<DelayedBuckets>,
    ring: Mutex<Option<Ring>>,
    cmd_rx: Mutex<Option<mpsc::Receiver<Command>>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    started: AtomicBool,
    drivers: Mutex<Vec<JoinHandle<()>>>,
}

impl TimingWheel {
    /// Build a wheel against the system clock.
    pub fn new(options: WheelOptions) -> Result<Self, TimerError> {
        Self::new_with_clock(options, Arc::new(SystemClock))
    }

    /// Build a wheel against an injected clock.
    pub fn new_with_clock(
        options: WheelOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TimerError> {
        let tick_ms = options.tick.as_millis() as i64;
        if tick_ms < 1 {
            return Err(TimerError::InvalidTick);
        }
        if options.size <= 0 {
            return Err(TimerError::InvalidWheelSize);
        }

        let start_ms = clock.now_ms();
        let ring = Ring::new(tick_ms, options.size, start_ms);
        let queue = Arc::new(DelayedBuckets::new(Arc::clone(&clock)));
        let (cmd_tx, cmd_rx) = mpsc::channel(options.size as usize * 100);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(WheelShared {
                tick_ms,
                clock,
                cmd_tx,
                rendezvous: Rendezvous::new(),
                stats: WheelStats::default(),
                next_id: AtomicU64::new(0),
            }),
            queue,
            ring: Mutex::new(Some(ring)),
            cmd_rx: Mutex::new(Some(cmd_rx)),
            cancel_tx,
            cancel_rx,
            started: AtomicBool::new(false),
            drivers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the poll task and the driver task. Only the first call has an
    /// effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("timing wheel already started");
            return;
        }

        let Some(mut ring) = self.ring.lock().expect("ring mutex poisoned").take() else {
            return;
        };
        let Some(mut cmd_rx) = self.cmd_rx.lock().expect("command mutex poisoned").take() else {
            return;
        };
        let Some(mut bucket_rx) = self.queue.take_chan() else {
            return;
        };

        let poll_queue = Arc::clone(&self.queue);
        let poll_cancel = self.cancel_rx.clone();
        let poll = tokio::spawn(async move {
            poll_queue.poll(poll_cancel).await;
        });

        let shared = Arc::clone(&self.shared);
        let queue = Arc::clone(&self.queue);
        let mut cancel = self.cancel_rx.clone();
        let driver = tokio::spawn(async move {
            loop {
                tokio::select! {
                    delivered = bucket_rx.recv() => {
                        let Some(bucket) = delivered else { break };
                        ring.advance_clock(bucket.expiration());
                        shared.stats.record_flush();
                        bucket.flush(|entry| {
                            ring.add_or_run(
                                entry,
                                &queue,
                                shared.clock.as_ref(),
                                &shared.stats,
                            );
                        });
                    }
                    submitted = cmd_rx.recv() => {
                        let Some(command) = submitted else { break };
                        match command {
                            Command::AddNew(entry) => {
                                let id = entry.id.to_string();
                                ring.add_or_run(
                                    Arc::clone(&entry),
                                    &queue,
                                    shared.clock.as_ref(),
                                    &shared.stats,
                                );
                                let handle = TimerTask::new(entry, Arc::clone(&shared));
                                if let Err(err) = shared
                                    .rendezvous
                                    .trigger(&id, CommandOutcome::Added(handle))
                                {
                                    warn!("task {id}: add rendezvous failed: {err}");
                                }
                            }
                            Command::Delete(entry) => {
                                let id = entry.id.to_string();
                                let stopped = if entry.is_cancelled() {
                                    true
                                } else {
                                    let removed = entry
                                        .current_bucket()
                                        .map(|bucket| bucket.remove(&entry))
                                        .unwrap_or(false);
                                    if removed {
                                        entry.cancel();
                                        shared.stats.record_cancelled();
                                    }
                                    removed
                                };
                                if let Err(err) = shared
                                    .rendezvous
                                    .trigger(&id, CommandOutcome::Stopped(stopped))
                                {
                                    warn!("task {id}: stop rendezvous failed: {err}");
                                }
                            }
                        }
                    }
                    _ = cancel.changed() => break,
                }
            }
            let abandoned = shared.rendezvous.abandon_all();
            if abandoned > 0 {
                debug!("abandoned {abandoned} rendezvous slots at shutdown");
            }
            debug!("timing wheel driver loop terminated");
        });

        let mut drivers = self.drivers.lock().expect("driver handles mutex poisoned");
        drivers.push(poll);
        drivers.push(driver);
        debug!("timing wheel started (tick {}ms)", self.shared.tick_ms);
    }

    /// Stop the wheel. Terminal: the wheel cannot be restarted, pending
    /// commands are not drained, and callers blocked on a rendezvous get
    /// [`TimerError::Stopped`]. Worker tasks already spawned for firings
    /// run to completion; this call does not wait for them.
    pub async fn stop(&self) {
        let _ = self.cancel_tx.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut drivers = self.drivers.lock().expect("driver handles mutex poisoned");
            drivers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        debug!("timing wheel stopped");
    }

    /// Schedule `handler` to run once, `delay` from now. A zero delay fires
    /// on the next driver iteration.
    pub async fn after_func<F>(&self, delay: Duration, handler: F) -> Result<TimerTask, TimerError>
    where
        F: Fn(DateTime<Utc>) + Send + Sync + 'static,
    {
        self.schedule(delay, TaskKind::OneShot, Arc::new(handler))
            .await
    }

    /// Schedule `handler` to run every `period`, starting one period from
    /// now. The period must be at least the wheel tick.
    pub async fn tick_func<F>(&self, period: Duration, handler: F) -> Result<TimerTask, TimerError>
    where
        F: Fn(DateTime<Utc>) + Send + Sync + 'static,
    {
        if (period.as_millis() as i64) < self.shared.tick_ms {
            return Err(TimerError::InvalidTickFuncDuration);
        }
        self.schedule(period, TaskKind::Recurring, Arc::new(handler))
            .await
    }

    /// Counters accumulated since construction.
    pub fn stats(&self) -> Snapshot {
        self.shared.stats.snapshot()
    }

    async fn schedule(
        &self,
        duration: Duration,
        kind: TaskKind,
        handler: Handler,
    ) -> Result<TimerTask, TimerError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let duration_ms = duration.as_millis() as i64;
        let expiration = self.shared.clock.now_ms() + duration_ms;
        let entry = Arc::new(TimerEntry::new(id, duration_ms, expiration, kind, handler));

        let outcome = self.shared.rendezvous.register(&id.to_string())?;
        self.shared
            .cmd_tx
            .send(Command::AddNew(entry))
            .await
            .map_err(|_| TimerError::Stopped)?;
        self.shared.stats.record_scheduled();

        match outcome.await {
            Ok(CommandOutcome::Added(task)) => Ok(task),
            Ok(other) => {
                warn!("task {id}: unexpected add outcome {other:?}");
                Err(TimerError::Stopped)
            }
            Err(_) => Err(TimerError::Stopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_zero_tick() {
        let options = WheelOptions::default().with_tick(Duration::from_nanos(0));
        assert!(matches!(
            TimingWheel::new(options),
            Err(TimerError::InvalidTick)
        ));
    }

    #[test]
    fn construction_rejects_sub_millisecond_tick() {
        let options = WheelOptions::default().with_tick(Duration::from_micros(200));
        assert!(matches!(
            TimingWheel::new(options),
            Err(TimerError::InvalidTick)
        ));
    }

    #[test]
    fn construction_rejects_non_positive_size() {
        let options = WheelOptions::default().with_size(0);
        assert!(matches!(
            TimingWheel::new(options),
            Err(TimerError::InvalidWheelSize)
        ));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let wheel = TimingWheel::new(WheelOptions::default()).expect("wheel");
        wheel.start();
        wheel.start();
        wheel.stop().await;
    }

    #[tokio::test]
    async fn stats_start_at_zero() {
        let wheel = TimingWheel::new(WheelOptions::default()).expect("wheel");
        assert_eq!(wheel.stats(), Snapshot::default());
    }
}
