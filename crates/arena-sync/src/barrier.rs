//! Reusable multi-party rendezvous, CyclicBarrier-style.
//!
//! The barrier state is `(sequence, parties, index)` guarded by its lock.
//! Waiters remember the sequence number of their cycle and sleep on the
//! condition variable until it changes; the last arriver resets the index,
//! bumps the sequence, and wakes everyone, which also makes the barrier
//! immediately reusable for the next cycle.

use crate::cond::Cond;
use crate::lock::Lock;
use arena::{ArenaResult, FieldId, FieldKind, Ref, Runtime, Shape, StructRef, Value};
use std::sync::Arc;

const LOCK: &str = "lock";
const COND: &str = "cond";
const SEQ: &str = "seq";
const PARTIES: &str = "parties";
const INDEX: &str = "index";

/// Returned by [`CyclicBarrier::wait`] when the barrier was invalidated.
pub const INVALIDATED: i32 = -1;

fn shape(rt: &Runtime) -> ArenaResult<Arc<Shape>> {
    rt.registry().register(
        "sync.CyclicBarrier",
        &[
            (LOCK, FieldKind::Ref),
            (COND, FieldKind::Ref),
            (SEQ, FieldKind::AtomicInt32),
            (PARTIES, FieldKind::Int32),
            (INDEX, FieldKind::Int32),
        ],
    )
}

/// Reusable rendezvous point for a fixed number of parties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CyclicBarrier {
    cell: StructRef,
    seq: FieldId,
    parties: FieldId,
    index: FieldId,
    lock: Lock,
    cond: Cond,
}

impl CyclicBarrier {
    /// Allocates a barrier for `parties` agents.
    pub fn new(rt: &Runtime, parties: i32) -> ArenaResult<Self> {
        let lock = Lock::new(rt)?;
        let cond = Cond::new(rt, &lock)?;
        let cell = shape(rt)?.allocate_init(
            rt.arena(),
            &[
                (LOCK, Value::Ref(lock.as_ref())),
                (COND, Value::Ref(cond.as_ref())),
                (PARTIES, Value::I32(parties)),
            ],
        )?;
        Self::attach(rt, cell)
    }

    /// Reconstructs a barrier from a bare offset.
    pub fn from_ref(rt: &Runtime, r: Ref) -> ArenaResult<Self> {
        Self::attach(rt, shape(rt)?.view(rt.arena(), r)?)
    }

    fn attach(rt: &Runtime, cell: StructRef) -> ArenaResult<Self> {
        let seq = cell.field(SEQ)?;
        let parties = cell.field(PARTIES)?;
        let index = cell.field(INDEX)?;
        let lock = Lock::from_ref(rt, cell.get_ref(LOCK)?)?;
        let cond = Cond::from_ref(rt, cell.get_ref(COND)?)?;
        Ok(Self {
            cell,
            seq,
            parties,
            index,
            lock,
            cond,
        })
    }

    /// The offset of the barrier object.
    pub fn as_ref(&self) -> Ref {
        self.cell.base()
    }

    /// Number of parties the barrier was built for; negative after
    /// invalidation.
    pub fn parties(&self) -> i32 {
        self.lock.with(|| self.cell.get_i32_at(self.parties))
    }

    /// Enters the barrier and blocks until all parties have arrived.
    ///
    /// Returns this agent's 0-based arrival index for the cycle, or
    /// [`INVALIDATED`] when the barrier was reset while waiting (or before
    /// arrival).
    pub fn wait(&self) -> i32 {
        self.lock.lock();
        let parties = self.cell.get_i32_at(self.parties);
        if parties <= 0 {
            self.lock.unlock();
            return INVALIDATED;
        }

        let index = self.cell.get_i32_at(self.index);
        if index + 1 == parties {
            // Last arriver: release the cycle and reuse the barrier.
            self.cell.set_i32_at(self.index, 0);
            self.cell.add_i32_at(self.seq, 1);
            self.cond.wake_all();
            self.lock.unlock();
            return index;
        }

        self.cell.set_i32_at(self.index, index + 1);
        let ticket = self.cell.load_i32_at(self.seq);
        while ticket == self.cell.load_i32_at(self.seq) {
            self.cond.wait();
        }
        let index = if self.cell.get_i32_at(self.parties) <= 0 {
            INVALIDATED
        } else {
            index
        };
        self.lock.unlock();
        index
    }

    /// Invalidates the barrier: every blocked and every subsequent `wait`
    /// returns [`INVALIDATED`] until the barrier is reconstructed.
    pub fn reset_and_invalidate(&self) {
        self.lock.lock();
        self.cell.add_i32_at(self.seq, 1);
        self.cell.set_i32_at(self.parties, -1);
        self.cond.wake_all();
        self.lock.unlock();
    }
}
