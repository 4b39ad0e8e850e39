//! Blocking synchronization primitives built entirely out of arena words.
//!
//! Every primitive here is an ordinary registered struct living in the
//! shared arena, manipulated only through atomic operations on its fields
//! and the futex-style wait/wake shim:
//! * [`Lock`] – three-state futex mutex.
//! * [`Cond`] – condition variable bound to one lock.
//! * [`CyclicBarrier`] – reusable multi-party rendezvous.
//! * [`BoundedQueue`] – blocking MPMC ring of references.
//!
//! None of the blocking operations take a timeout and none are
//! cancellable; a blocked agent stays blocked until a matching wake or
//! process teardown. Wake order is unspecified — a woken agent re-checks
//! its predicate, nothing more.

mod barrier;
mod cond;
mod lock;
mod queue;

pub use barrier::{CyclicBarrier, INVALIDATED};
pub use cond::Cond;
pub use lock::Lock;
pub use queue::BoundedQueue;
