//! Release-time guarantees of the delay queue against the real clock.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use tickwheel::clock::{Clock, SystemClock};
use tickwheel::delayqueue::DelayQueue;

#[tokio::test]
async fn values_release_no_earlier_than_their_deadline() {
    common::init_logging();
    let queue = Arc::new(DelayQueue::new(
        Arc::new(SystemClock) as Arc<dyn Clock>
    ));
    let mut output = queue.take_chan().expect("output stream");
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let poller = Arc::clone(&queue);
    tokio::spawn(async move { poller.poll(cancel_rx).await });

    let base = SystemClock.now_ms();
    let start = Instant::now();
    // Deliberately offered out of deadline order.
    queue.offer(("c", 45), base + 45);
    queue.offer(("a", 15), base + 15);
    queue.offer(("b", 30), base + 30);

    for expected in ["a", "b", "c"] {
        let (label, deadline) = output.recv().await.expect("released value");
        assert_eq!(label, expected);
        assert!(
            start.elapsed() >= Duration::from_millis(deadline),
            "{label} released before its deadline"
        );
    }
    assert!(queue.is_empty());

    let _ = cancel_tx.send(true);
}
