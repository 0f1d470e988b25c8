//! Bounded, ordered per-connection queue of outbound items.
//!
//! # Responsibilities
//! - Hold already-serialized outbound items in insertion order
//! - Refuse new items once `capacity` slots are taken, without blocking
//! - Hand out at most one item at a time for writing
//! - Tell the owner when a completion frees a slot of a full queue
//!
//! # Design Decisions
//! - The item being written still occupies its slot until
//!   `on_write_complete`, so `capacity` bounds queued + in-flight
//! - No interior locking: HTTP sessions confine the queue to their task,
//!   WebSocket connections wrap it in the connection's mutex

use std::collections::VecDeque;

/// An outbound message plus whether the connection closes after it.
#[derive(Debug)]
pub struct WriteItem<M> {
    pub message: M,
    pub close_after: bool,
}

impl<M> WriteItem<M> {
    pub fn new(message: M) -> Self {
        Self {
            message,
            close_after: false,
        }
    }

    pub fn closing(message: M) -> Self {
        Self {
            message,
            close_after: true,
        }
    }
}

/// Bounded FIFO with a single in-flight slot.
#[derive(Debug)]
pub struct WriteQueue<T> {
    pending: VecDeque<T>,
    in_flight: bool,
    capacity: usize,
}

impl<T> WriteQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            in_flight: false,
            capacity,
        }
    }

    /// Append `item`. Returns `false`, leaving the queue untouched, if full.
    pub fn enqueue(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.pending.push_back(item);
        true
    }

    /// Take the front item for writing, unless a write is already in flight.
    pub fn take_next(&mut self) -> Option<T> {
        if self.in_flight {
            return None;
        }
        let item = self.pending.pop_front()?;
        self.in_flight = true;
        Some(item)
    }

    /// Retire the in-flight item.
    ///
    /// Returns `true` if the queue was full before this completion, i.e. the
    /// owner paused reading and may now resume.
    pub fn on_write_complete(&mut self) -> bool {
        debug_assert!(self.in_flight, "write completion without a write in flight");
        let was_full = self.is_full();
        self.in_flight = false;
        was_full
    }

    /// Whether every slot is taken (queued plus in flight).
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Items held, counting the one in flight.
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything still queued (not the in-flight item).
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
