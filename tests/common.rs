//! Shared helpers for the timing wheel integration tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tickwheel::{TimingWheel, WheelOptions};

/// Initialize env_logger once; repeated calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A millisecond wheel with twenty buckets, the shape most scenarios use.
#[allow(dead_code)]
pub fn millisecond_wheel() -> TimingWheel {
    let options = WheelOptions::default()
        .with_tick(Duration::from_millis(1))
        .with_size(20);
    TimingWheel::new(options).expect("valid wheel options")
}

/// Records the elapsed time of every firing a callback observes.
#[derive(Clone)]
#[allow(dead_code)]
pub struct FiringRecorder {
    started: Instant,
    firings: Arc<Mutex<Vec<(Duration, DateTime<Utc>)>>>,
}

#[allow(dead_code)]
impl FiringRecorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            firings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A callback suitable for `after_func` / `tick_func`.
    pub fn callback(&self) -> impl Fn(DateTime<Utc>) + Send + Sync + 'static {
        let started = self.started;
        let sink = Arc::clone(&self.firings);
        move |fired_at| {
            let elapsed = started.elapsed();
            sink.lock().expect("recorder mutex").push((elapsed, fired_at));
        }
    }

    pub fn count(&self) -> usize {
        self.firings.lock().expect("recorder mutex").len()
    }

    /// Elapsed-at-firing readings, in firing order.
    pub fn elapsed(&self) -> Vec<Duration> {
        self.firings
            .lock()
            .expect("recorder mutex")
            .iter()
            .map(|(elapsed, _)| *elapsed)
            .collect()
    }
}
