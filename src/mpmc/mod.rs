//! Bounded multi-producer multi-consumer queue.
//!
//! Any number of producers and consumers share one fixed-capacity ring.
//! Every operation starts with a fetch-add on a 64-bit counter (`tail` for
//! producers, `head` for consumers), which hands the caller a *reservation*
//! and fully determines its slot and its turn:
//!
//! ```text
//! reservation r  →  slot r & (N-1)
//!
//! producer r: waits until slot ticket == r        (empty, my turn)
//!             writes value, publishes ticket r+1  (full)
//! consumer r: waits until slot ticket == r+1      (full, my turn)
//!             takes value, publishes ticket r+N   (empty, next wrap)
//! ```
//!
//! FIFO order is by reservation: the consumer holding reservation `r`
//! receives exactly the value of the producer holding reservation `r`.
//! What a thread does while waiting for its turn is the queue's
//! [`WaitStrategy`] type parameter; each slot carries its own strategy
//! state, so waking is per-slot, not per-queue.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use turnstile::BoundedQueue;
//! use turnstile::wait::YieldWait;
//!
//! let queue = Arc::new(BoundedQueue::<u64, YieldWait>::new(8).unwrap());
//!
//! let producers: Vec<_> = (0..2)
//!     .map(|p| {
//!         let queue = Arc::clone(&queue);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 queue.enqueue(p * 1000 + i);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let consumer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         let mut received = Vec::new();
//!         while let Some(value) = queue.dequeue() {
//!             received.push(value);
//!         }
//!         received
//!     })
//! };
//!
//! for handle in producers {
//!     handle.join().unwrap();
//! }
//! queue.finish();
//!
//! assert_eq!(consumer.join().unwrap().len(), 200);
//! ```
//!
//! # Shutdown
//!
//! [`finish`](BoundedQueue::finish) is one-way: it raises a flag and wakes
//! every slot. Consumers whose reservation no producer has claimed return
//! `None`; reservations that precede the final tail are still served.
//! Producers have no shutdown of their own; quiesce them before
//! finishing.

mod ring;

use std::fmt;

use crate::backoff::{Backoff, NoBackoff};
use crate::wait::{SpinWait, WaitStrategy};

use ring::Ring;

/// Error returned when a queue cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The requested capacity was not a power of two in `2..=2^31`.
    /// Contains the requested capacity.
    ///
    /// Capacity 1 is rejected because the slot phases of consecutive wraps
    /// would share a ticket value, breaking the one-writer-per-slot rule.
    Capacity(usize),
    /// The slot array could not be allocated.
    Alloc,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity(n) => {
                write!(f, "capacity must be a power of two in 2..=2^31, got {n}")
            }
            Self::Alloc => write!(f, "slot array allocation failed"),
        }
    }
}

impl std::error::Error for QueueError {}

/// A bounded MPMC FIFO queue with ticketed slots.
///
/// The queue is not cloneable; share it across threads behind an
/// [`Arc`](std::sync::Arc). Moving it is allowed whenever no operation is
/// in flight, which the borrow checker enforces.
///
/// `enqueue` blocks while the ring is full and `dequeue` blocks while the
/// caller's slot is empty; neither times out. `dequeue` returns `None`
/// only through the shutdown path.
pub struct BoundedQueue<T, W: WaitStrategy = SpinWait> {
    ring: Ring<T, W>,
}

impl<T, W: WaitStrategy> BoundedQueue<T, W> {
    /// Creates a queue with the given capacity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Capacity`] unless `capacity` is a power of two
    /// in `2..=2^31`, and [`QueueError::Alloc`] if the slot array cannot be
    /// allocated.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile::{BoundedQueue, QueueError};
    ///
    /// let queue = BoundedQueue::<u64>::new(16).unwrap();
    /// assert_eq!(queue.capacity(), 16);
    ///
    /// assert_eq!(
    ///     BoundedQueue::<u64>::new(12).unwrap_err(),
    ///     QueueError::Capacity(12),
    /// );
    /// ```
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Ok(Self {
            ring: Ring::new(capacity)?,
        })
    }

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Advisory emptiness check.
    ///
    /// Computed from relaxed counter loads; it may be stale by the time it
    /// returns. Fine for monitoring, never for coordinating consumers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns `true` once [`finish`](Self::finish) has been called.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.ring.is_finished()
    }

    /// Raises the shutdown flag and wakes every slot's waiters.
    ///
    /// Consumers blocked on reservations that no producer has claimed
    /// return `None`; claimed reservations are still delivered. Enqueues
    /// remain permitted afterwards, but an enqueue racing with `finish`
    /// can strand its value if every consumer has already given up.
    /// Quiesce producers first.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile::BoundedQueue;
    ///
    /// let queue = BoundedQueue::<u64>::new(4).unwrap();
    /// queue.enqueue(1);
    /// queue.finish();
    ///
    /// assert_eq!(queue.dequeue(), Some(1)); // already produced
    /// assert_eq!(queue.dequeue(), None); // never will be
    /// ```
    pub fn finish(&self) {
        self.ring.finish();
    }

    /// Inserts a value, blocking while the ring is full.
    ///
    /// Once the internal reservation is taken the insert cannot fail; if
    /// the queue stays full and no consumer runs, this blocks forever.
    pub fn enqueue(&self, value: T) {
        self.enqueue_with(value, NoBackoff);
    }

    /// Inserts a value, running `backoff` before blocking.
    ///
    /// While the slot is not yet available the queue alternates plain
    /// ticket loads with `backoff` calls; once the backoff asks to
    /// escalate, the remainder of the wait goes through the wait strategy.
    pub fn enqueue_with<B: Backoff>(&self, value: T, mut backoff: B) {
        let tail = self.ring.reserve_tail();
        let slot = self.ring.slot(tail);

        let want = tail as u32;
        let mut waiting = false;
        let mut current = slot.wait.load();
        while current != want {
            if waiting {
                current = slot.wait.wait_and_load(current);
            } else {
                waiting = backoff.backoff();
                current = slot.wait.load();
            }
        }

        // Safety: the ticket equals our reservation, so this slot is empty
        // and no other producer holds reservation `tail`. The matching
        // consumer cannot read until the ticket advances below.
        unsafe {
            (*slot.value.get()).write(value);
        }
        slot.wait.store_and_wake(want.wrapping_add(1));
    }

    /// Removes the next value, blocking while the caller's slot is empty.
    ///
    /// Returns `None` only when the queue is finished and this caller's
    /// reservation can never be served.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue_with(NoBackoff)
    }

    /// Removes the next value, running `backoff` before blocking.
    pub fn dequeue_with<B: Backoff>(&self, mut backoff: B) -> Option<T> {
        let head = self.ring.reserve_head();
        let slot = self.ring.slot(head);

        let want = (head as u32).wrapping_add(1);
        let mut waiting = false;
        let mut current = slot.wait.load();
        while current != want {
            if self.ring.is_finished() && head >= self.ring.load_tail() {
                // No producer holds this reservation; it will never be
                // filled. The slot is untouched.
                return None;
            }
            if waiting {
                current = slot.wait.wait_and_load(current);
            } else {
                waiting = backoff.backoff();
                current = slot.wait.load();
            }
        }

        // Safety: the ticket equals our reservation plus one, so the
        // producer holding reservation `head` has published and no other
        // consumer can hold this reservation.
        let value = unsafe { (*slot.value.get()).assume_init_read() };

        // Hand the slot to the producer of the next wrap.
        slot.wait
            .store_and_wake((head as u32).wrapping_add(self.capacity() as u32));
        Some(value)
    }
}

impl<T, W: WaitStrategy> fmt::Debug for BoundedQueue<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
