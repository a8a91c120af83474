//! One-shot rendezvous slots keyed by string id.
//!
//! The driver loop is synchronous from a submitter's point of view: the
//! submitter registers a slot, pushes a command, and blocks on the slot
//! until the driver triggers it with the outcome. Each slot is a one-shot
//! channel that is consumed (removed from the map) by the trigger.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::oneshot;

use crate::errors::TimerError;

/// Registry of in-flight rendezvous slots.
pub struct Rendezvous<T> {
    slots: RwLock<HashMap<String, oneshot::Sender<T>>>,
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Create a slot for `id` and return its receive end.
    ///
    /// Fails with [`TimerError::Duplicate`] if the id already has a slot.
    pub fn register(&self, id: &str) -> Result<oneshot::Receiver<T>, TimerError> {
        let mut slots = self.slots.write().expect("rendezvous lock poisoned");
        if slots.contains_key(id) {
            return Err(TimerError::Duplicate(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Deliver `value` to the slot named `id`, consuming the slot.
    ///
    /// Fails with [`TimerError::NotFound`] for an unknown id and with
    /// [`TimerError::TriggerTimeout`] when the registered receiver has
    /// already been dropped.
    pub fn trigger(&self, id: &str, value: T) -> Result<(), TimerError> {
        let sender = {
            let mut slots = self.slots.write().expect("rendezvous lock poisoned");
            slots.remove(id)
        };
        match sender {
            None => Err(TimerError::NotFound(id.to_string())),
            Some(sender) => sender
                .send(value)
                .map_err(|_| TimerError::TriggerTimeout(id.to_string())),
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.slots
            .read()
            .expect("rendezvous lock poisoned")
            .contains_key(id)
    }

    /// Drop every outstanding slot, waking all blocked receivers with a
    /// closed-channel error. Called when the driver shuts down.
    pub fn abandon_all(&self) -> usize {
        let mut slots = self.slots.write().expect("rendezvous lock poisoned");
        let abandoned = slots.len();
        slots.clear();
        abandoned
    }
}
