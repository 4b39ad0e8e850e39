//! Blocking bounded MPMC queue of references.
//!
//! Ring of `capacity + 1` slots so full/empty disambiguate without a
//! counter: `head == tail` means empty, `(tail + 1) % len == head` means
//! full. All state lives under the queue's lock; one condition variable
//! serves producers and consumers, gated by a waiter count so a wake is
//! issued after every successful operation while anyone is registered as
//! waiting — never only on the empty/full edge transitions, which would
//! risk stranding a waiter.
//!
//! Per-producer ordering is preserved; global ordering across producers is
//! not.

use crate::cond::Cond;
use crate::lock::Lock;
use arena::{ArenaResult, ArrayRef, ElemKind, FieldId, FieldKind, Ref, Runtime, Shape, StructRef, Value};
use std::sync::Arc;

const ITEMS: &str = "items";
const WAITERS: &str = "waiters";
const HEAD: &str = "head";
const TAIL: &str = "tail";
const LOCK: &str = "lock";
const COND: &str = "cond";

fn shape(rt: &Runtime) -> ArenaResult<Arc<Shape>> {
    rt.registry().register(
        "sync.BoundedQueue",
        &[
            (ITEMS, FieldKind::Ref),
            (WAITERS, FieldKind::Int32),
            (HEAD, FieldKind::Int32),
            (TAIL, FieldKind::Int32),
            (LOCK, FieldKind::Ref),
            (COND, FieldKind::Ref),
        ],
    )
}

/// Bounded multi-producer/multi-consumer queue of shared references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundedQueue {
    cell: StructRef,
    items: ArrayRef,
    waiters: FieldId,
    head: FieldId,
    tail: FieldId,
    lock: Lock,
    cond: Cond,
}

impl BoundedQueue {
    /// Allocates a queue holding up to `capacity` references.
    pub fn new(rt: &Runtime, capacity: usize) -> ArenaResult<Self> {
        let items = ArrayRef::allocate(rt.arena(), ElemKind::Ref, capacity + 1)?;
        let lock = Lock::new(rt)?;
        let cond = Cond::new(rt, &lock)?;
        let cell = shape(rt)?.allocate_init(
            rt.arena(),
            &[
                (ITEMS, Value::Ref(items.base())),
                (LOCK, Value::Ref(lock.as_ref())),
                (COND, Value::Ref(cond.as_ref())),
            ],
        )?;
        Self::attach(rt, cell)
    }

    /// Reconstructs a queue from a bare offset.
    pub fn from_ref(rt: &Runtime, r: Ref) -> ArenaResult<Self> {
        Self::attach(rt, shape(rt)?.view(rt.arena(), r)?)
    }

    fn attach(rt: &Runtime, cell: StructRef) -> ArenaResult<Self> {
        let items = ArrayRef::from_ref(rt.arena(), ElemKind::Ref, cell.get_ref(ITEMS)?)?;
        let lock = Lock::from_ref(rt, cell.get_ref(LOCK)?)?;
        let cond = Cond::from_ref(rt, cell.get_ref(COND)?)?;
        Ok(Self {
            waiters: cell.field(WAITERS)?,
            head: cell.field(HEAD)?,
            tail: cell.field(TAIL)?,
            cell,
            items,
            lock,
            cond,
        })
    }

    /// The offset of the queue object.
    pub fn as_ref(&self) -> Ref {
        self.cell.base()
    }

    /// Maximum number of elements the queue holds.
    pub fn capacity(&self) -> usize {
        self.items.len() - 1
    }

    /// Current occupancy, taken under the queue lock.
    pub fn len(&self) -> usize {
        self.lock.with(|| self.occupancy())
    }

    /// Returns true when the queue currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn occupancy(&self) -> usize {
        let slots = self.items.len() as i32;
        let head = self.cell.get_i32_at(self.head);
        let tail = self.cell.get_i32_at(self.tail);
        ((tail - head).rem_euclid(slots)) as usize
    }

    fn is_full_locked(&self) -> bool {
        let slots = self.items.len() as i32;
        (self.cell.get_i32_at(self.tail) + 1) % slots == self.cell.get_i32_at(self.head)
    }

    fn is_empty_locked(&self) -> bool {
        self.cell.get_i32_at(self.head) == self.cell.get_i32_at(self.tail)
    }

    fn wait_registered(&self) {
        self.cell
            .set_i32_at(self.waiters, self.cell.get_i32_at(self.waiters) + 1);
        self.cond.wait();
        self.cell
            .set_i32_at(self.waiters, self.cell.get_i32_at(self.waiters) - 1);
    }

    fn wake_if_waited_on(&self) {
        if self.cell.get_i32_at(self.waiters) > 0 {
            self.cond.wake();
        }
    }

    fn insert_locked(&self, value: Ref) {
        let tail = self.cell.get_i32_at(self.tail);
        self.items.set_ref(tail as usize, value);
        self.cell
            .set_i32_at(self.tail, (tail + 1) % self.items.len() as i32);
        self.wake_if_waited_on();
    }

    /// Appends `value`, blocking while the queue is full.
    pub fn put(&self, value: Ref) {
        self.lock.lock();
        while self.is_full_locked() {
            self.wait_registered();
        }
        self.insert_locked(value);
        self.lock.unlock();
    }

    /// Non-blocking append: fails immediately when the lock is contended or
    /// the queue is full, leaving the queue unchanged.
    pub fn try_put(&self, value: Ref) -> bool {
        if !self.lock.try_lock() {
            return false;
        }
        if self.is_full_locked() {
            self.lock.unlock();
            return false;
        }
        self.insert_locked(value);
        self.lock.unlock();
        true
    }

    /// Removes and returns the oldest element, blocking while the queue is
    /// empty.
    pub fn get(&self) -> Ref {
        self.lock.lock();
        while self.is_empty_locked() {
            self.wait_registered();
        }
        let head = self.cell.get_i32_at(self.head);
        let value = self.items.get_ref(head as usize);
        self.cell
            .set_i32_at(self.head, (head + 1) % self.items.len() as i32);
        self.wake_if_waited_on();
        self.lock.unlock();
        value
    }
}
