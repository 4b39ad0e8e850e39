//! Futex-backed three-state mutex stored in the arena.
//!
//! State values: 0 unlocked, 1 locked with no waiters, 2 locked with
//! possible waiters. This is the classic futex mutex (Drepper, "Futexes
//! Are Tricky"): unlock does not hand the lock to a woken waiter, the
//! waiter re-attempts acquisition, so acquisition order is not FIFO.

use arena::{ArenaResult, FieldId, FieldKind, Ref, Runtime, Shape, StructRef};
use std::sync::Arc;

const STATE: &str = "state";

const UNLOCKED: i32 = 0;
const LOCKED: i32 = 1;
const CONTENDED: i32 = 2;

pub(crate) fn shape(rt: &Runtime) -> ArenaResult<Arc<Shape>> {
    rt.registry()
        .register("sync.Lock", &[(STATE, FieldKind::AtomicInt32)])
}

/// Mutual-exclusion lock shared between agents.
///
/// The lock word is the sole arbiter of write access to the non-atomic
/// fields of any struct guarded by it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    cell: StructRef,
    state: FieldId,
}

impl Lock {
    /// Allocates an unlocked lock in the arena.
    pub fn new(rt: &Runtime) -> ArenaResult<Self> {
        Self::attach(shape(rt)?.allocate(rt.arena())?)
    }

    /// Reconstructs a lock from a bare offset.
    pub fn from_ref(rt: &Runtime, r: Ref) -> ArenaResult<Self> {
        Self::attach(shape(rt)?.view(rt.arena(), r)?)
    }

    fn attach(cell: StructRef) -> ArenaResult<Self> {
        let state = cell.field(STATE)?;
        Ok(Self { cell, state })
    }

    /// The offset of the lock object, for storing in reference fields.
    pub fn as_ref(&self) -> Ref {
        self.cell.base()
    }

    /// Acquires the lock, blocking while another agent holds it.
    pub fn lock(&self) {
        if let Err(mut observed) =
            self.cell
                .compare_exchange_i32_at(self.state, UNLOCKED, LOCKED)
        {
            loop {
                if observed == CONTENDED
                    || self
                        .cell
                        .compare_exchange_i32_at(self.state, LOCKED, CONTENDED)
                        .is_err()
                {
                    self.cell.wait_i32_at(self.state, CONTENDED);
                }
                match self
                    .cell
                    .compare_exchange_i32_at(self.state, UNLOCKED, CONTENDED)
                {
                    Ok(_) => break,
                    Err(current) => observed = current,
                }
            }
        }
    }

    /// Releases the lock and wakes one waiter when there may be any.
    pub fn unlock(&self) {
        if self.cell.add_i32_at(self.state, -1) != LOCKED {
            self.cell.store_i32_at(self.state, UNLOCKED);
            self.cell.wake_one_at(self.state);
        }
    }

    /// Single non-blocking acquisition attempt.
    pub fn try_lock(&self) -> bool {
        self.cell
            .compare_exchange_i32_at(self.state, UNLOCKED, LOCKED)
            .is_ok()
    }

    /// Runs `f` with the lock held; the lock is released even when `f`
    /// panics.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Unlock<'a>(&'a Lock);
        impl Drop for Unlock<'_> {
            fn drop(&mut self) {
                self.0.unlock();
            }
        }

        self.lock();
        let _guard = Unlock(self);
        f()
    }
}
