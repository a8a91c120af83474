//! One level of the hierarchical wheel.
//!
//! A ring is a fixed array of buckets, each `tick` milliseconds wide. Tasks
//! whose deadline exceeds the ring's span go to a lazily built overflow
//! parent whose tick is this ring's whole interval; flushing a parent bucket
//! cascades its tasks back down into finer rings as the clock catches up.

use std::sync::Arc;

use log::trace;

use super::bucket::Bucket;
use super::task::{TaskKind, TimerEntry};
use super::{spawn_handler, DelayedBuckets};
use crate::clock::{wall_time, Clock};
use crate::stats::WheelStats;

/// Round `x` down to a multiple of `m`; non-positive `m` leaves `x` as is.
pub(crate) fn truncate(x: i64, m: i64) -> i64 {
    if m <= 0 {
        return x;
    }
    x - x % m
}

pub(crate) struct Ring {
    tick: i64,
    size: i64,
    interval: i64,
    current_time: i64,
    buckets: Vec<Arc<Bucket>>,
    overflow: Option<Box<Ring>>,
}

impl Ring {
    pub(crate) fn new(tick: i64, size: i64, start_ms: i64) -> Self {
        let buckets = (0..size).map(|_| Arc::new(Bucket::new())).collect();
        Self {
            tick,
            size,
            interval: tick * size,
            current_time: truncate(start_ms, tick),
            buckets,
            overflow: None,
        }
    }

    #[allow(dead_code)] // read by tests asserting clock truncation
    pub(crate) fn current_time(&self) -> i64 {
        self.current_time
    }

    /// Enlist `entry`, or run it on a fresh worker when its deadline has
    /// already passed. Recurring entries that fire are re-armed from the
    /// current clock reading and re-submitted, unless cancelled.
    pub(crate) fn add_or_run(
        &mut self,
        entry: Arc<TimerEntry>,
        queue: &DelayedBuckets,
        clock: &dyn Clock,
        stats: &WheelStats,
    ) {
        if self.add(&entry, queue) {
            stats.record_enlisted();
            return;
        }

        let now = clock.now_ms();
        stats.record_fired();
        spawn_handler(entry.id, Arc::clone(&entry.handler), wall_time(now));

        if entry.kind == TaskKind::Recurring && !entry.is_cancelled() {
            entry.set_expiration(now + entry.duration_ms);
            self.add_or_run(entry, queue, clock, stats);
        }
    }

    /// Place `entry` in this ring or an overflow parent.
    ///
    /// Returns false when the deadline falls inside the current tick, which
    /// the caller treats as already expired.
    ///
    /// The bucket index depends only on the deadline and the tick, never on
    /// `current_time`, so equal quantized deadlines always share a bucket no
    /// matter when they were inserted; the bucket's expiration transition is
    /// then the single point deciding the delay-queue enqueue.
    pub(crate) fn add(&mut self, entry: &Arc<TimerEntry>, queue: &DelayedBuckets) -> bool {
        let expiration = entry.expiration();
        if expiration < self.current_time + self.tick {
            return false;
        }
        if expiration < self.current_time + self.interval {
            let vid = expiration / self.tick;
            let bucket = Arc::clone(&self.buckets[(vid % self.size) as usize]);
            bucket.add(Arc::clone(entry));
            if bucket.set_expiration(vid * self.tick) {
                trace!(
                    "task {}: bucket armed at {} (tick {})",
                    entry.id,
                    vid * self.tick,
                    self.tick
                );
                queue.offer(bucket, vid * self.tick);
            }
            return true;
        }

        let (tick, size, current_time) = (self.interval, self.size, self.current_time);
        let overflow = self
            .overflow
            .get_or_insert_with(move || Box::new(Ring::new(tick, size, current_time)));
        overflow.add(entry, queue)
    }

    /// Advance the ring clock to the tick containing `expiration`, then
    /// propagate into the overflow parent. The clock never moves backwards.
    pub(crate) fn advance_clock(&mut self, expiration: i64) {
        if expiration >= self.current_time + self.tick {
            self.current_time = truncate(expiration, self.tick);
            if let Some(overflow) = self.overflow.as_mut() {
                overflow.advance_clock(self.current_time);
            }
        }
    }
}
