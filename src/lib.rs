//! # Tickwheel - Hierarchical Timing Wheel Timer
//!
//! Tickwheel schedules very large numbers of one-shot and recurring callbacks with
//! millisecond-granular deadlines. Insertion is O(1) regardless of how many timers are
//! in flight, which keeps it out of the hot path where a naive min-heap timer becomes
//! the bottleneck: connection timeouts, retry deadlines, rate-limit windows, session expiry.
//!
//! ## Features
//!
//! - **O(1) Insertion**: Tasks land in a fixed-size bucket chosen by quantized deadline, never a heap of tasks.
//! - **Hierarchical Cascading**: Deadlines beyond a wheel's span stage in coarser overflow wheels and cascade down as the clock advances.
//! - **Off-Driver Callbacks**: Every firing runs on a fresh worker task, so a slow callback cannot stall the clock.
//! - **Synchronous Handles**: `after_func` / `tick_func` resolve to a task handle once the driver has accepted the task; `TimerTask::stop` resolves once the cancellation is acknowledged.
//! - **Injectable Clock**: Millisecond clock behind a trait, with system, cached, and fixed (test) implementations.
//! - **Async Design**: Built with Tokio; the whole wheel is two cooperating tasks plus short-lived workers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tickwheel::{TimingWheel, WheelOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // One-millisecond ticks, twenty buckets per wheel level
//!     let options = WheelOptions::default()
//!         .with_tick(Duration::from_millis(1))
//!         .with_size(20);
//!     let wheel = TimingWheel::new(options)?;
//!     wheel.start();
//!
//!     let task = wheel
//!         .after_func(Duration::from_millis(10), |fired_at| {
//!             println!("fired at {fired_at}");
//!         })
//!         .await?;
//!
//!     // Cancel if it has not fired yet
//!     let was_live = task.stop().await?;
//!     println!("cancelled: {was_live}");
//!
//!     wheel.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`wheel`] - The timing wheel driver, task handles, buckets and rings
//! - [`delayqueue`] - Blocking queue releasing elements once their deadline passes
//! - [`pqueue`] - Indexed min-heap with O(log n) interior removal
//! - [`rendezvous`] - One-shot result slots coupling submitters to the driver
//! - [`clock`] - Millisecond clock sources (system, cached, fixed)
//! - [`options`] - Construction options
//! - [`stats`] - Per-wheel counters
//! - [`errors`] - The crate error type
//!
//! ## Architecture
//!
//! ```text
//! after_func / tick_func / stop
//!          │ command + rendezvous
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Driver Task    │───→│  Wheel Rings    │ ← add / cascade / advance
//! └─────────────────┘    └─────────────────┘
//!          ↑ armed buckets        │ bucket armed
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Poll Task      │←───│  Delay Queue    │ ← earliest-deadline heap
//! └─────────────────┘    └─────────────────┘
//!          │ firing
//!     worker task per callback
//! ```
//!
//! The wheel hierarchy grows lazily: each level covers `tick × size`
//! milliseconds and spills into a parent whose tick is that whole span.

pub mod clock;
pub mod delayqueue;
pub mod errors;
pub mod options;
pub mod pqueue;
pub mod rendezvous;
pub mod stats;
pub mod wheel;

pub use errors::TimerError;
pub use options::WheelOptions;
pub use wheel::{Handler, TaskKind, TimerTask, TimingWheel};
