//! Millisecond clock sources for the timing wheel.
//!
//! Everything in the wheel is measured in whole milliseconds since the Unix
//! epoch. The [`Clock`] trait keeps the source injectable: production code
//! uses [`SystemClock`], high-rate callers can opt into [`CachedClock`], and
//! tests drive the wheel deterministically with [`FixedClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use tokio::sync::watch;

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in whole milliseconds.
    fn now_ms(&self) -> i64;
}

/// Convert an epoch-millisecond reading back into a wall instant.
///
/// Out-of-range values clamp to the minimum representable instant rather
/// than panic; the wheel never produces such values itself.
pub fn wall_time(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Clock backed by the operating system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that reads a cached millisecond cell refreshed by a background task.
///
/// Useful when `now_ms` is called at very high rates and a syscall per read
/// is measurable. The cell is refreshed roughly once per millisecond, so
/// readings may lag the system clock by up to one tick.
///
/// Must be created inside a tokio runtime. Dropping the clock signals the
/// refresh task to exit; the task is detached, so the drop does not wait for
/// it.
#[derive(Debug)]
pub struct CachedClock {
    now_ms: Arc<AtomicI64>,
    shutdown: watch::Sender<bool>,
}

impl CachedClock {
    pub fn new() -> Self {
        let cell = Arc::new(AtomicI64::new(Utc::now().timestamp_millis()));
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&cell);
        tokio::spawn(async move {
            loop {
                shared.store(Utc::now().timestamp_millis(), Ordering::Release);
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(Duration::from_millis(1)) => {}
                }
            }
            debug!("cached clock refresh task stopped");
        });
        Self {
            now_ms: cell,
            shutdown,
        }
    }
}

impl Default for CachedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for CachedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

impl Drop for CachedClock {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    /// Set the clock to an absolute reading.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::Release);
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::AcqRel);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Acquire)
    }
}
