//! Per-slot tickets and the strategies that wait on them.
//!
//! Every ring slot owns a 32-bit atomic [`Ticket`] that encodes whose turn
//! the slot is: ticket `t` means the producer holding reservation `t` may
//! write, ticket `t + 1` means the matching consumer may read. A
//! [`WaitStrategy`] bundles that ticket with whatever state is needed to
//! park a thread until the ticket advances, so the ticket and its waiters
//! live on the same cache line.
//!
//! # Choosing a strategy
//!
//! | Strategy | `wait_and_load` | `store_and_wake` | `wake` |
//! |----------|-----------------|------------------|--------|
//! | [`SpinWait`] | spin hint, reload | release store | no-op |
//! | [`YieldWait`] | yield, reload | release store | no-op |
//! | [`FutexWait`] | kernel wait-if-equals | store, fence, conditional wake | wake all |
//! | [`CondvarWait`] | condvar sleep under lock | store + notify under lock | notify all |
//!
//! `wait_and_load` may return spuriously; callers always re-check the
//! ticket against the value they need.

use std::fmt;
use std::hint;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::thread;

use parking_lot::{Condvar, Mutex};

/// A slot's phase counter: a 32-bit atomic with acquire/release accessors.
///
/// The value is the low 32 bits of a 64-bit reservation; only `2 * capacity`
/// distinct values are ever meaningful for one slot within an in-flight
/// window, so the truncation is unambiguous.
#[derive(Debug)]
pub struct Ticket(AtomicU32);

impl Ticket {
    /// Creates a ticket holding `value`. Used only before the slot is
    /// shared.
    #[inline]
    pub fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    /// Loads the ticket with acquire ordering.
    #[inline]
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Stores the ticket with release ordering.
    #[inline]
    pub fn store(&self, value: u32) {
        self.0.store(value, Ordering::Release)
    }
}

/// Per-slot wait/wake behavior for a ticketed queue.
///
/// Implementations embed the slot's [`Ticket`] plus any waiter state. All
/// methods take `&self`: a slot is shared by every producer and consumer
/// whose reservation maps to it.
pub trait WaitStrategy: Send + Sync {
    /// Creates the slot state with the ticket initialized to `ticket`.
    fn with_ticket(ticket: u32) -> Self;

    /// Loads the current ticket (acquire).
    fn load(&self) -> u32;

    /// Called after the caller observed `observed`, which was not the value
    /// it needs. May park until the ticket changes, pause briefly, or
    /// return at once; returns a fresh acquire load either way. Spurious
    /// returns are allowed; callers re-check.
    fn wait_and_load(&self, observed: u32) -> u32;

    /// Publishes `ticket` (release) and wakes any waiter parked on the
    /// previous value.
    fn store_and_wake(&self, ticket: u32);

    /// Wakes every waiter currently parked on this slot. Used by shutdown;
    /// the ticket is left unchanged.
    fn wake(&self);
}

/// Pure spinning; never parks.
#[derive(Debug)]
pub struct SpinWait {
    ticket: Ticket,
}

impl WaitStrategy for SpinWait {
    #[inline]
    fn with_ticket(ticket: u32) -> Self {
        Self {
            ticket: Ticket::new(ticket),
        }
    }

    #[inline]
    fn load(&self) -> u32 {
        self.ticket.load()
    }

    #[inline]
    fn wait_and_load(&self, _observed: u32) -> u32 {
        hint::spin_loop();
        self.ticket.load()
    }

    #[inline]
    fn store_and_wake(&self, ticket: u32) {
        self.ticket.store(ticket);
    }

    #[inline]
    fn wake(&self) {}
}

/// Yields the scheduler between reloads; never parks.
#[derive(Debug)]
pub struct YieldWait {
    ticket: Ticket,
}

impl WaitStrategy for YieldWait {
    #[inline]
    fn with_ticket(ticket: u32) -> Self {
        Self {
            ticket: Ticket::new(ticket),
        }
    }

    #[inline]
    fn load(&self) -> u32 {
        self.ticket.load()
    }

    #[inline]
    fn wait_and_load(&self, _observed: u32) -> u32 {
        thread::yield_now();
        self.ticket.load()
    }

    #[inline]
    fn store_and_wake(&self, ticket: u32) {
        self.ticket.store(ticket);
    }

    #[inline]
    fn wake(&self) {}
}

/// Sleeps in the kernel on the ticket word itself.
///
/// Waiters register in a counter before calling the kernel's
/// wait-if-equals, so the storing side can skip the wake syscall entirely
/// when nobody is parked.
pub struct FutexWait {
    ticket: Ticket,
    waiters: AtomicU32,
}

impl WaitStrategy for FutexWait {
    #[inline]
    fn with_ticket(ticket: u32) -> Self {
        Self {
            ticket: Ticket::new(ticket),
            waiters: AtomicU32::new(0),
        }
    }

    #[inline]
    fn load(&self) -> u32 {
        self.ticket.load()
    }

    #[inline]
    fn wait_and_load(&self, observed: u32) -> u32 {
        self.waiters.fetch_add(1, Ordering::Relaxed);
        // The kernel re-checks ticket == observed before sleeping, so a
        // store that lands first turns this into a no-op.
        atomic_wait::wait(&self.ticket.0, observed);
        self.waiters.fetch_sub(1, Ordering::Relaxed);
        self.ticket.load()
    }

    #[inline]
    fn store_and_wake(&self, ticket: u32) {
        self.ticket.store(ticket);
        // Orders the ticket store against the waiter-count probe: a thread
        // past its fetch_add is visible below, and one before it will see
        // the new ticket when the kernel re-checks.
        fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::Relaxed) != 0 {
            self.wake();
        }
    }

    #[inline]
    fn wake(&self) {
        atomic_wait::wake_all(&self.ticket.0);
    }
}

impl fmt::Debug for FutexWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutexWait")
            .field("ticket", &self.ticket)
            .field("waiters", &self.waiters)
            .finish()
    }
}

/// Blocks on a per-slot mutex and condition variable.
///
/// The lock is held only across ticket accesses and condvar operations,
/// never while a value is moved. The mutex orders ticket observation with
/// waiter registration, so no extra fences are needed.
pub struct CondvarWait {
    ticket: Ticket,
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitStrategy for CondvarWait {
    #[inline]
    fn with_ticket(ticket: u32) -> Self {
        Self {
            ticket: Ticket::new(ticket),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    #[inline]
    fn load(&self) -> u32 {
        self.ticket.load()
    }

    fn wait_and_load(&self, observed: u32) -> u32 {
        let mut guard = self.lock.lock();
        if self.ticket.load() == observed {
            self.cond.wait(&mut guard);
        }
        self.ticket.load()
    }

    fn store_and_wake(&self, ticket: u32) {
        let _guard = self.lock.lock();
        self.ticket.store(ticket);
        self.cond.notify_all();
    }

    fn wake(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }
}

impl fmt::Debug for CondvarWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondvarWait")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}
