//! The ring buffer storage backing the MPMC queue.
//!
//! Memory layout:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ head (cache-line padded) - consumer reservation count │
//! ├───────────────────────────────────────────────────────┤
//! │ tail (cache-line padded) - producer reservation count │
//! ├───────────────────────────────────────────────────────┤
//! │ finish flag                                           │
//! ├───────────────────────────────────────────────────────┤
//! │ Slot[0]: { wait state (ticket), value }  ← padded     │
//! │ Slot[1]: { wait state (ticket), value }  ← padded     │
//! │ ...                                                   │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Each slot's ticket encodes its phase. For slot index `i` with wrap `k`:
//! - `ticket == i + k*N`: empty, awaiting the producer holding that
//!   reservation
//! - `ticket == i + k*N + 1`: full, awaiting the matching consumer
//!
//! The slot array is one contiguous allocation of cache-line padded slots,
//! constructed in place and freed as a single block.

use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::cmp;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::wait::WaitStrategy;

use super::QueueError;

/// Reservations beyond this cannot be disambiguated by a 32-bit ticket.
const MAX_CAPACITY: usize = 1 << 31;

/// One ring cell: the wait strategy's state (which owns the ticket) plus
/// storage for a value. The value is only initialized while the ticket
/// marks the slot full.
#[repr(C)]
pub(crate) struct Slot<T, W> {
    pub(crate) wait: W,
    pub(crate) value: UnsafeCell<MaybeUninit<T>>,
}

/// The backing storage for a bounded MPMC queue.
pub(crate) struct Ring<T, W: WaitStrategy> {
    /// Consumer reservation counter. Monotonic.
    head: CachePadded<AtomicU64>,
    /// Producer reservation counter. Monotonic.
    tail: CachePadded<AtomicU64>,
    /// One-way shutdown flag.
    finish: AtomicBool,

    buffer: NonNull<CachePadded<Slot<T, W>>>,
    mask: u64,
}

impl<T, W: WaitStrategy> Ring<T, W> {
    /// Allocates the slot array and initializes slot `i` with ticket `i`.
    pub(crate) fn new(capacity: usize) -> Result<Self, QueueError> {
        // Capacity 1 is rejected: the full marker of wrap `k` (r + 1) would
        // equal the empty marker of wrap `k + 1` (r + N), entitling the
        // next producer to the slot before the consumer has read it.
        if capacity < 2 || !capacity.is_power_of_two() || capacity > MAX_CAPACITY {
            return Err(QueueError::Capacity(capacity));
        }

        // A slot array too large for the address space is a capacity
        // problem, not an allocator one.
        let layout = Layout::array::<CachePadded<Slot<T, W>>>(capacity)
            .map_err(|_| QueueError::Capacity(capacity))?;
        let ptr = unsafe { alloc::alloc(layout) }.cast::<CachePadded<Slot<T, W>>>();
        let buffer = NonNull::new(ptr).ok_or(QueueError::Alloc)?;

        for i in 0..capacity {
            unsafe {
                buffer.as_ptr().add(i).write(CachePadded::new(Slot {
                    wait: W::with_ticket(i as u32),
                    value: UnsafeCell::new(MaybeUninit::uninit()),
                }));
            }
        }

        Ok(Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            finish: AtomicBool::new(false),
            buffer,
            mask: capacity as u64 - 1,
        })
    }

    fn layout(capacity: usize) -> Layout {
        Layout::array::<CachePadded<Slot<T, W>>>(capacity).expect("capacity overflows layout")
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// The slot a reservation maps to.
    #[inline]
    pub(crate) fn slot(&self, reservation: u64) -> &Slot<T, W> {
        let index = (reservation & self.mask) as usize;
        unsafe { &*self.buffer.as_ptr().add(index) }
    }

    /// Takes the next producer reservation.
    ///
    /// SeqCst so the reservation is totally ordered against the tail load
    /// in the consumer's shutdown check.
    #[inline]
    pub(crate) fn reserve_tail(&self) -> u64 {
        self.tail.fetch_add(1, Ordering::SeqCst)
    }

    /// Takes the next consumer reservation.
    #[inline]
    pub(crate) fn reserve_head(&self) -> u64 {
        self.head.fetch_add(1, Ordering::Relaxed)
    }

    /// Tail load for the shutdown check; pairs with [`reserve_tail`].
    ///
    /// [`reserve_tail`]: Self::reserve_tail
    #[inline]
    pub(crate) fn load_tail(&self) -> u64 {
        self.tail.load(Ordering::SeqCst)
    }

    /// Advisory emptiness: may race with concurrent operations.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        tail <= head
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.finish.load(Ordering::Relaxed)
    }

    /// Raises the finish flag and wakes every slot's waiters.
    pub(crate) fn finish(&self) {
        self.finish.store(true, Ordering::Relaxed);
        for i in 0..=self.mask {
            self.slot(i).wait.wake();
        }
    }
}

// Safety: slot hand-off is synchronized by the per-slot tickets and the
// head/tail counters; values only move between threads, so `T: Send`
// suffices. The wait strategy is `Send + Sync` by its trait bound.
unsafe impl<T: Send, W: WaitStrategy> Send for Ring<T, W> {}
unsafe impl<T: Send, W: WaitStrategy> Sync for Ring<T, W> {}

impl<T, W: WaitStrategy> Drop for Ring<T, W> {
    fn drop(&mut self) {
        let capacity = (self.mask + 1) as usize;
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        // Head can run past tail when shutdown abandons reservations, so
        // the unconsumed region is [min(head, tail), tail). A slot in that
        // region holds a value only if its ticket marks it full.
        for pos in cmp::min(head, tail)..tail {
            let slot = self.slot(pos);
            if slot.wait.load() == (pos as u32).wrapping_add(1) {
                unsafe {
                    ptr::drop_in_place((*slot.value.get()).as_mut_ptr());
                }
            }
        }

        for i in 0..capacity {
            unsafe {
                ptr::drop_in_place(self.buffer.as_ptr().add(i));
            }
        }

        unsafe {
            alloc::dealloc(self.buffer.as_ptr().cast(), Self::layout(capacity));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::SpinWait;

    #[test]
    fn slots_start_with_ticket_equal_to_index() {
        let ring = Ring::<u64, SpinWait>::new(8).unwrap();

        for i in 0..8u64 {
            assert_eq!(ring.slot(i).wait.load(), i as u32);
        }
        assert!(ring.is_empty());
        assert!(!ring.is_finished());
    }

    #[test]
    fn reservations_are_monotonic() {
        let ring = Ring::<u64, SpinWait>::new(4).unwrap();

        assert_eq!(ring.reserve_tail(), 0);
        assert_eq!(ring.reserve_tail(), 1);
        assert_eq!(ring.reserve_head(), 0);
        assert_eq!(ring.load_tail(), 2);
    }
}
