use thiserror::Error;

/// Errors surfaced by the timing wheel and its supporting queues.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Construction rejected a tick below one millisecond.
    #[error("tick must be greater than or equal to 1ms")]
    InvalidTick,

    /// Construction rejected a non-positive wheel size.
    #[error("wheel size must be greater than zero")]
    InvalidWheelSize,

    /// `tick_func` rejected a period shorter than the wheel tick.
    #[error("tick_func period must be greater than or equal to the wheel tick")]
    InvalidTickFuncDuration,

    /// A priority-queue handle was used against a queue it does not belong to.
    #[error("element belongs to a different queue")]
    MismatchQueue,

    /// A priority-queue handle carried an index outside the live heap.
    #[error("element index {index} out of range for queue of length {len}")]
    OutOfIndex { index: usize, len: usize },

    /// A priority-queue handle's cached priority disagrees with the slot it
    /// points at, meaning the handle is stale.
    #[error("element priority {expected} does not match stored priority {found}")]
    MismatchPriority { expected: i64, found: i64 },

    /// Rendezvous registration collided with an id already in flight.
    #[error("rendezvous id already registered: {0}")]
    Duplicate(String),

    /// Rendezvous trigger named an id nobody registered.
    #[error("rendezvous id not registered: {0}")]
    NotFound(String),

    /// Rendezvous trigger found the slot but its receiver was already gone.
    #[error("rendezvous receiver already dropped for id: {0}")]
    TriggerTimeout(String),

    /// The wheel has been stopped; the submitted command was abandoned.
    #[error("timing wheel stopped")]
    Stopped,
}
