//! A few thousand concurrent timers all land.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::prelude::*;

use common::{init_logging, millisecond_wheel};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thousands_of_one_shots_all_fire() {
    init_logging();
    let wheel = millisecond_wheel();
    wheel.start();

    const TASKS: u32 = 2_000;
    let fired = Arc::new(AtomicU32::new(0));
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..TASKS {
        let counter = Arc::clone(&fired);
        let delay = Duration::from_millis(rng.gen_range(1..150));
        wheel
            .after_func(delay, move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .await
            .expect("schedule");
    }

    // All deadlines are within 150ms; leave slack for flushing and workers.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(fired.load(Ordering::Relaxed), TASKS);

    let stats = wheel.stats();
    assert_eq!(stats.scheduled, u64::from(TASKS));
    assert_eq!(stats.fired, u64::from(TASKS));

    wheel.stop().await;
}
