//! Bounded, non-blocking hand-off channel.
//!
//! Every hand-off in the pipeline goes through a [`BoundedChannel`]: a fixed-capacity
//! FIFO backed by a lock-free `crossbeam_queue::ArrayQueue`. The sender is never
//! blocked. When the queue is full the *new* item is rejected, handed back to the
//! caller and counted, so a slow consumer only ever loses its own newest data.
//!
//! ```text
//!  producer ──try_send──▶ [ slot | slot ] ──try_receive──▶ consumer
//!                 │ full
//!                 └──▶ Err(item), rejected += 1
//! ```
//!
//! The channel is a cheap `Clone` handle; producer and consumer hold clones of the
//! same queue. No lock is exposed, only the atomic queue operations.

use crossbeam_queue::ArrayQueue;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default capacity for display and processing hand-offs.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2;

struct Inner<T> {
    queue: ArrayQueue<T>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

/// Fixed-capacity FIFO with a reject-new-on-full policy.
pub struct BoundedChannel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("accepted", &self.accepted())
            .field("rejected", &self.rejected())
            .finish()
    }
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items.
    ///
    /// A zero capacity is raised to one; a channel that can hold nothing would
    /// reject every item.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: ArrayQueue::new(capacity.max(1)),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue `item` without blocking.
    ///
    /// Returns the item back in `Err` when the channel is full. Items already queued
    /// keep their order.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        match self.inner.queue.push(item) {
            Ok(()) => {
                self.inner.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(item) => {
                self.inner.rejected.fetch_add(1, Ordering::Relaxed);
                Err(item)
            }
        }
    }

    /// Dequeue the oldest item without blocking.
    pub fn try_receive(&self) -> Option<T> {
        self.inner.queue.pop()
    }

    /// Whether no item is currently queued.
    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    /// Whether the next `try_send` would be rejected.
    pub fn is_full(&self) -> bool {
        self.inner.queue.is_full()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    /// Total items accepted since creation.
    pub fn accepted(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Total items rejected because the channel was full.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Discard every queued item, returning how many were dropped.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.inner.queue.pop().is_some() {
            drained += 1;
        }
        drained
    }
}
