//! Indexed min-heap priority queue.
//!
//! A binary heap keyed by an `i64` priority whose elements hand back stable
//! [`Element`] handles. Each handle tracks its own array index, so interior
//! removal and priority updates run in O(log n) instead of a linear scan.
//! The delay queue leans on this to pull an arbitrary bucket out of the
//! middle of the heap once it has been delivered.
//!
//! Handles are validated before any mutating use: a handle from another
//! queue, a handle whose slot has since been vacated, or a handle whose
//! cached priority no longer matches the slot it points at is rejected with
//! a typed error and the heap is left untouched.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::TimerError;

/// Index value carried by a handle that is not currently in any queue.
const DETACHED: usize = usize::MAX;

/// Queue identity of a handle that is not currently in any queue.
const NO_QUEUE: u64 = 0;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a value stored in a [`PriorityQueue`].
///
/// The queue keeps the `index` field synchronized on every swap, so a live
/// handle can always be removed or re-prioritized in O(log n).
#[derive(Debug)]
pub struct Element<T> {
    value: T,
    priority: AtomicI64,
    index: AtomicUsize,
    queue: AtomicU64,
}

impl<T> Element<T> {
    /// The stored value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The priority this element is currently keyed by.
    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Acquire)
    }

    /// Position inside the owning queue, or `None` once popped or removed.
    pub fn index(&self) -> Option<usize> {
        match self.index.load(Ordering::Acquire) {
            DETACHED => None,
            index => Some(index),
        }
    }

    fn detach(&self) {
        self.index.store(DETACHED, Ordering::Release);
        self.queue.store(NO_QUEUE, Ordering::Release);
    }
}

/// Min-heap over [`Element`] handles; the root is the lowest priority value.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    id: u64,
    items: Vec<Arc<Element<T>>>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            items: Vec::with_capacity(capacity),
        }
    }

    /// Insert `value` keyed by `priority` and return its handle.
    pub fn add(&mut self, value: T, priority: i64) -> Arc<Element<T>> {
        let element = Arc::new(Element {
            value,
            priority: AtomicI64::new(priority),
            index: AtomicUsize::new(self.items.len()),
            queue: AtomicU64::new(self.id),
        });
        self.items.push(Arc::clone(&element));
        self.sift_up(self.items.len() - 1);
        element
    }

    /// The lowest-priority element, without removing it.
    pub fn peek(&self) -> Option<&Arc<Element<T>>> {
        self.items.first()
    }

    /// Remove and return the lowest-priority element.
    pub fn pop(&mut self) -> Option<Arc<Element<T>>> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.swap(0, last);
        let element = self.items.pop()?;
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        element.detach();
        Some(element)
    }

    /// Remove an arbitrary element by handle.
    pub fn remove(&mut self, element: &Arc<Element<T>>) -> Result<(), TimerError> {
        let index = self.validate(element)?;
        let found = self.items[index].priority();
        let expected = element.priority();
        if expected != found {
            return Err(TimerError::MismatchPriority { expected, found });
        }

        let last = self.items.len() - 1;
        self.swap(index, last);
        let removed = match self.items.pop() {
            Some(removed) => removed,
            None => return Ok(()),
        };
        if index < self.items.len() {
            let settled = self.sift_down(index);
            if settled == index {
                self.sift_up(index);
            }
        }
        removed.detach();
        Ok(())
    }

    /// Re-key an element. Updating to the unchanged priority is a no-op.
    pub fn update(&mut self, element: &Arc<Element<T>>, priority: i64) -> Result<(), TimerError> {
        let index = self.validate(element)?;
        if element.priority() == priority {
            return Ok(());
        }

        element.priority.store(priority, Ordering::Release);
        let settled = self.sift_down(index);
        if settled == index {
            self.sift_up(index);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn validate(&self, element: &Arc<Element<T>>) -> Result<usize, TimerError> {
        if element.queue.load(Ordering::Acquire) != self.id {
            return Err(TimerError::MismatchQueue);
        }
        let index = element.index.load(Ordering::Acquire);
        if index >= self.items.len() {
            return Err(TimerError::OutOfIndex {
                index,
                len: self.items.len(),
            });
        }
        Ok(index)
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.items[a].index.store(a, Ordering::Release);
        self.items[b].index.store(b, Ordering::Release);
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.items[index].priority() >= self.items[parent].priority() {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    /// Returns the index the element finally settled at.
    fn sift_down(&mut self, mut index: usize) -> usize {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                return index;
            }
            let mut child = left;
            let right = left + 1;
            if right < len && self.items[right].priority() < self.items[left].priority() {
                child = right;
            }
            if self.items[index].priority() <= self.items[child].priority() {
                return index;
            }
            self.swap(index, child);
            index = child;
        }
    }
}
