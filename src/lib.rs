//! Bounded MPMC queues with per-slot tickets and pluggable wait strategies.
//!
//! `turnstile` provides a fixed-capacity multi-producer multi-consumer FIFO
//! queue. Every operation is linearized by a fetch-add on a 64-bit counter,
//! and every ring slot carries its own 32-bit ticket that tells producers
//! and consumers whose turn it is. What happens while a thread waits for
//! its turn is pluggable: spin, yield, sleep in the kernel on the slot's
//! ticket, or block on a per-slot mutex and condition variable.
//!
//! # Quick Start
//!
//! ```
//! use turnstile::BoundedQueue;
//!
//! let queue = BoundedQueue::<u64>::new(8).unwrap();
//!
//! queue.enqueue(42);
//! assert_eq!(queue.dequeue(), Some(42));
//! ```
//!
//! # Wait Strategies
//!
//! The queue is parameterized on a [`WaitStrategy`](wait::WaitStrategy);
//! the strategy's state is embedded in each slot, so the ticket and the
//! machinery that waits on it share a cache line.
//!
//! | Strategy | Parks? | Latency | CPU | Use case |
//! |----------|--------|---------|-----|----------|
//! | [`SpinWait`] | no | lowest | highest | isolated cores, short critical paths |
//! | [`YieldWait`] | no | low | moderate | shared cores |
//! | [`FutexWait`] | kernel | moderate | low | mixed workloads, many threads |
//! | [`CondvarWait`] | mutex+condvar | highest | low | portability baseline |
//!
//! # Backoff
//!
//! Contention that is expected to resolve in nanoseconds should not cost a
//! syscall. The `*_with` operations accept a [`Backoff`](backoff::Backoff)
//! policy that runs small user-space delays first and decides when to fall
//! through to the wait strategy:
//!
//! ```
//! use turnstile::BoundedQueue;
//! use turnstile::backoff::{CpuRelax, ExponentialBackoff};
//! use turnstile::wait::FutexWait;
//!
//! let queue = BoundedQueue::<u64, FutexWait>::new(8).unwrap();
//!
//! queue.enqueue_with(7, ExponentialBackoff::<CpuRelax>::new(64));
//! assert_eq!(queue.dequeue_with(ExponentialBackoff::<CpuRelax>::new(64)), Some(7));
//! ```
//!
//! # Shutdown
//!
//! [`finish`](mpmc::BoundedQueue::finish) raises a one-way flag and wakes
//! every slot. Consumers whose reservation can never be served return
//! `None`; reservations already claimed by a producer are still delivered.
//! Quiesce producers before finishing; see the method docs.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod backoff;
pub mod mpmc;
pub mod wait;

pub use mpmc::{BoundedQueue, QueueError};
pub use wait::{CondvarWait, FutexWait, SpinWait, WaitStrategy, YieldWait};
