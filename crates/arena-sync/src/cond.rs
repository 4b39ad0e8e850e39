//! Condition variable bound to one [`Lock`].
//!
//! Sequence-word protocol (after the locklessinc mutex/condvar design):
//! waiters snapshot the sequence counter, release the lock, and park on
//! the counter expecting the snapshot; wakers bump the counter and wake.
//! The primitive guarantees wake delivery, not predicate truth — correct
//! usage is always `while !predicate { cond.wait() }`.

use crate::lock::Lock;
use arena::{ArenaResult, FieldId, FieldKind, Ref, Runtime, Shape, StructRef};
use std::sync::Arc;

const LOCK: &str = "lock";
const SEQ: &str = "seq";

pub(crate) fn shape(rt: &Runtime) -> ArenaResult<Arc<Shape>> {
    rt.registry().register(
        "sync.Cond",
        &[(LOCK, FieldKind::Ref), (SEQ, FieldKind::AtomicInt32)],
    )
}

/// Condition variable for agents blocking on a predicate over shared state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cond {
    cell: StructRef,
    seq: FieldId,
    lock: Lock,
}

impl Cond {
    /// Allocates a condition variable bound to `lock`.
    pub fn new(rt: &Runtime, lock: &Lock) -> ArenaResult<Self> {
        let cell = shape(rt)?.allocate(rt.arena())?;
        cell.set_ref(LOCK, lock.as_ref())?;
        Self::attach(rt, cell)
    }

    /// Reconstructs a condition variable (and its lock) from a bare offset.
    pub fn from_ref(rt: &Runtime, r: Ref) -> ArenaResult<Self> {
        Self::attach(rt, shape(rt)?.view(rt.arena(), r)?)
    }

    fn attach(rt: &Runtime, cell: StructRef) -> ArenaResult<Self> {
        let seq = cell.field(SEQ)?;
        let lock = Lock::from_ref(rt, cell.get_ref(LOCK)?)?;
        Ok(Self { cell, seq, lock })
    }

    /// The offset of the condition variable object.
    pub fn as_ref(&self) -> Ref {
        self.cell.base()
    }

    /// The lock this condition variable is bound to.
    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// Atomically releases the lock and blocks until a wake arrives, then
    /// re-acquires the lock before returning.
    ///
    /// The caller must hold the lock. Spurious returns are possible;
    /// callers re-check their predicate in a loop.
    pub fn wait(&self) {
        let ticket = self.cell.load_i32_at(self.seq);
        self.lock.unlock();
        self.cell.wait_i32_at(self.seq, ticket);
        self.lock.lock();
    }

    /// Wakes one waiter. The caller must hold the lock.
    pub fn wake(&self) {
        self.cell.add_i32_at(self.seq, 1);
        self.cell.wake_one_at(self.seq);
    }

    /// Wakes every waiter. The caller must hold the lock.
    pub fn wake_all(&self) {
        self.cell.add_i32_at(self.seq, 1);
        self.cell.wake_all_at(self.seq);
    }
}
