//! Futex-style wait/wake shim used by the blocking primitives.
//!
//! Callers park on an arena word via the `atomic-wait` crate (futex-backed
//! where the platform provides one). A wait returns when the word no longer
//! holds the expected value or a wake arrives; spurious returns are allowed,
//! so every caller re-checks its predicate in a loop.

use std::sync::atomic::AtomicU32;

/// Blocks the current agent while `atomic` still holds `expected`.
#[inline]
pub fn wait_u32(atomic: &AtomicU32, expected: u32) {
    atomic_wait::wait(atomic, expected);
}

/// Wakes at most one agent parked on `atomic`.
#[inline]
pub fn wake_one(atomic: &AtomicU32) {
    atomic_wait::wake_one(atomic as *const AtomicU32);
}

/// Wakes every agent parked on `atomic`.
#[inline]
pub fn wake_all(atomic: &AtomicU32) {
    atomic_wait::wake_all(atomic as *const AtomicU32);
}
