//! Typed struct views: zero-ownership handles interpreting arena offsets.
//!
//! A [`StructRef`] is an `(arena, shape, offset)` triple. It owns no memory
//! and equality is offset equality on the same arena. Accessors come in two
//! flavours: name-based lookups that can fail on an unknown or mismatched
//! field, and `_at` variants taking a pre-resolved [`FieldId`] for code on a
//! hot path (the synchronization primitives resolve their fields once at
//! construction).
//!
//! Atomic float64 access is emulated: the shape reserves one auxiliary
//! spinlock word and every access busy-waits on it with CAS, no backoff.
//! Atomic read-modify-write is native only for integer-sized words.

use crate::arena::{Arena, Ref};
use crate::layout::{FieldId, FieldKind, Shape, Value};
use crate::wait;
use crate::{ArenaError, ArenaResult};
use std::fmt;
use std::hint;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Handle interpreting an arena offset according to a registered shape.
#[derive(Clone)]
pub struct StructRef {
    arena: Arc<Arena>,
    shape: Arc<Shape>,
    base: Ref,
}

impl PartialEq for StructRef {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && Arc::ptr_eq(&self.arena, &other.arena)
    }
}

impl Eq for StructRef {}

impl fmt::Debug for StructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructRef")
            .field("shape", &self.shape.name())
            .field("base", &self.base)
            .finish()
    }
}

impl StructRef {
    pub(crate) fn new(arena: Arc<Arena>, shape: Arc<Shape>, base: Ref) -> Self {
        Self { arena, shape, base }
    }

    /// The offset this view interprets.
    pub fn base(&self) -> Ref {
        self.base
    }

    /// The shape this view interprets the offset with.
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// The arena the referenced object lives in.
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// Resolves a field name on this view's shape.
    pub fn field(&self, name: &str) -> ArenaResult<FieldId> {
        self.shape.field(name)
    }

    fn checked(&self, name: &str, want: FieldKind) -> ArenaResult<FieldId> {
        let id = self.shape.field(name)?;
        if id.kind != want {
            return Err(ArenaError::TypeMismatch {
                offset: self.base.0,
                expected: format!("{want:?} field {name:?} on {}", self.shape.name()),
                found: format!("{:?}", id.kind),
            });
        }
        Ok(id)
    }

    fn word_index(&self, id: FieldId, want: FieldKind) -> usize {
        assert_eq!(
            id.kind,
            want,
            "field id used with the wrong accessor on {}",
            self.shape.name()
        );
        self.base.index() + id.word as usize
    }

    // ---- plain fields -----------------------------------------------------

    /// Reads a plain int32 field.
    pub fn get_i32(&self, name: &str) -> ArenaResult<i32> {
        Ok(self.get_i32_at(self.checked(name, FieldKind::Int32)?))
    }

    /// Writes a plain int32 field.
    pub fn set_i32(&self, name: &str, value: i32) -> ArenaResult<()> {
        self.set_i32_at(self.checked(name, FieldKind::Int32)?, value);
        Ok(())
    }

    /// Reads a plain float64 field.
    pub fn get_f64(&self, name: &str) -> ArenaResult<f64> {
        Ok(self.get_f64_at(self.checked(name, FieldKind::Float64)?))
    }

    /// Writes a plain float64 field.
    pub fn set_f64(&self, name: &str, value: f64) -> ArenaResult<()> {
        self.set_f64_at(self.checked(name, FieldKind::Float64)?, value);
        Ok(())
    }

    /// Reads a plain reference field.
    pub fn get_ref(&self, name: &str) -> ArenaResult<Ref> {
        Ok(self.get_ref_at(self.checked(name, FieldKind::Ref)?))
    }

    /// Writes a plain reference field.
    pub fn set_ref(&self, name: &str, value: Ref) -> ArenaResult<()> {
        self.set_ref_at(self.checked(name, FieldKind::Ref)?, value);
        Ok(())
    }

    /// Pre-resolved variant of [`StructRef::get_i32`].
    pub fn get_i32_at(&self, id: FieldId) -> i32 {
        self.arena
            .word(self.word_index(id, FieldKind::Int32))
            .load(Ordering::Relaxed) as i32
    }

    /// Pre-resolved variant of [`StructRef::set_i32`].
    pub fn set_i32_at(&self, id: FieldId, value: i32) {
        self.arena
            .word(self.word_index(id, FieldKind::Int32))
            .store(value as u32, Ordering::Relaxed);
    }

    /// Pre-resolved variant of [`StructRef::get_f64`].
    pub fn get_f64_at(&self, id: FieldId) -> f64 {
        self.arena.load_f64(self.word_index(id, FieldKind::Float64))
    }

    /// Pre-resolved variant of [`StructRef::set_f64`].
    pub fn set_f64_at(&self, id: FieldId, value: f64) {
        self.arena
            .store_f64(self.word_index(id, FieldKind::Float64), value);
    }

    /// Pre-resolved variant of [`StructRef::get_ref`].
    pub fn get_ref_at(&self, id: FieldId) -> Ref {
        Ref(self
            .arena
            .word(self.word_index(id, FieldKind::Ref))
            .load(Ordering::Relaxed))
    }

    /// Pre-resolved variant of [`StructRef::set_ref`].
    pub fn set_ref_at(&self, id: FieldId, value: Ref) {
        self.arena
            .word(self.word_index(id, FieldKind::Ref))
            .store(value.0, Ordering::Relaxed);
    }

    // ---- atomic int32 fields ---------------------------------------------

    /// Atomically reads an atomic int32 field.
    pub fn load_i32(&self, name: &str) -> ArenaResult<i32> {
        Ok(self.load_i32_at(self.checked(name, FieldKind::AtomicInt32)?))
    }

    /// Atomically writes an atomic int32 field.
    pub fn store_i32(&self, name: &str, value: i32) -> ArenaResult<()> {
        self.store_i32_at(self.checked(name, FieldKind::AtomicInt32)?, value);
        Ok(())
    }

    /// Atomically adds to an atomic int32 field, returning the prior value.
    pub fn add_i32(&self, name: &str, delta: i32) -> ArenaResult<i32> {
        Ok(self.add_i32_at(self.checked(name, FieldKind::AtomicInt32)?, delta))
    }

    /// Compare-and-swap on an atomic int32 field; returns the observed value
    /// (equal to `current` exactly when the swap happened).
    pub fn compare_exchange_i32(&self, name: &str, current: i32, new: i32) -> ArenaResult<i32> {
        let id = self.checked(name, FieldKind::AtomicInt32)?;
        Ok(match self.compare_exchange_i32_at(id, current, new) {
            Ok(prior) => prior,
            Err(observed) => observed,
        })
    }

    /// Pre-resolved variant of [`StructRef::load_i32`].
    pub fn load_i32_at(&self, id: FieldId) -> i32 {
        self.atomic_i32(id).load(Ordering::Acquire) as i32
    }

    /// Pre-resolved variant of [`StructRef::store_i32`].
    pub fn store_i32_at(&self, id: FieldId, value: i32) {
        self.atomic_i32(id).store(value as u32, Ordering::Release);
    }

    /// Pre-resolved variant of [`StructRef::add_i32`].
    pub fn add_i32_at(&self, id: FieldId, delta: i32) -> i32 {
        self.atomic_i32(id).fetch_add(delta as u32, Ordering::AcqRel) as i32
    }

    /// Pre-resolved compare-and-swap; `Ok(prior)` when the swap happened,
    /// `Err(observed)` when it did not.
    pub fn compare_exchange_i32_at(&self, id: FieldId, current: i32, new: i32) -> Result<i32, i32> {
        self.atomic_i32(id)
            .compare_exchange(current as u32, new as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(|prior| prior as i32)
            .map_err(|observed| observed as i32)
    }

    /// Blocks while the atomic int32 field still holds `expected`.
    ///
    /// Futex-style: returns on a wake or when the value already differs;
    /// spurious returns are possible and callers re-check their predicate.
    pub fn wait_i32_at(&self, id: FieldId, expected: i32) {
        wait::wait_u32(self.atomic_i32(id), expected as u32);
    }

    /// Wakes at most one agent blocked on the field.
    pub fn wake_one_at(&self, id: FieldId) {
        wait::wake_one(self.atomic_i32(id));
    }

    /// Wakes every agent blocked on the field.
    pub fn wake_all_at(&self, id: FieldId) {
        wait::wake_all(self.atomic_i32(id));
    }

    fn atomic_i32(&self, id: FieldId) -> &std::sync::atomic::AtomicU32 {
        self.arena.word(self.word_index(id, FieldKind::AtomicInt32))
    }

    // ---- atomic reference fields -----------------------------------------

    /// Atomically reads an atomic reference field.
    pub fn load_ref(&self, name: &str) -> ArenaResult<Ref> {
        let id = self.checked(name, FieldKind::AtomicRef)?;
        Ok(Ref(self
            .arena
            .word(self.word_index(id, FieldKind::AtomicRef))
            .load(Ordering::Acquire)))
    }

    /// Atomically writes an atomic reference field.
    pub fn store_ref(&self, name: &str, value: Ref) -> ArenaResult<()> {
        let id = self.checked(name, FieldKind::AtomicRef)?;
        self.arena
            .word(self.word_index(id, FieldKind::AtomicRef))
            .store(value.0, Ordering::Release);
        Ok(())
    }

    /// Compare-and-swap on an atomic reference field; returns the observed
    /// reference (equal to `current` exactly when the swap happened).
    pub fn compare_exchange_ref(&self, name: &str, current: Ref, new: Ref) -> ArenaResult<Ref> {
        let id = self.checked(name, FieldKind::AtomicRef)?;
        let word = self.arena.word(self.word_index(id, FieldKind::AtomicRef));
        Ok(Ref(
            match word.compare_exchange(current.0, new.0, Ordering::AcqRel, Ordering::Acquire) {
                Ok(prior) => prior,
                Err(observed) => observed,
            },
        ))
    }

    // ---- atomic float64 fields -------------------------------------------

    /// Atomically reads an atomic float64 field through the shape spinlock.
    pub fn load_f64(&self, name: &str) -> ArenaResult<f64> {
        let index = self.word_index(self.checked(name, FieldKind::AtomicFloat64)?, FieldKind::AtomicFloat64);
        Ok(self.with_spinlock(|| self.arena.load_f64(index)))
    }

    /// Atomically writes an atomic float64 field through the shape spinlock.
    pub fn store_f64(&self, name: &str, value: f64) -> ArenaResult<()> {
        let index = self.word_index(self.checked(name, FieldKind::AtomicFloat64)?, FieldKind::AtomicFloat64);
        self.with_spinlock(|| self.arena.store_f64(index, value));
        Ok(())
    }

    /// Atomically adds to an atomic float64 field, returning the prior value.
    pub fn add_f64(&self, name: &str, delta: f64) -> ArenaResult<f64> {
        let index = self.word_index(self.checked(name, FieldKind::AtomicFloat64)?, FieldKind::AtomicFloat64);
        Ok(self.with_spinlock(|| {
            let prior = self.arena.load_f64(index);
            self.arena.store_f64(index, prior + delta);
            prior
        }))
    }

    /// Compare-and-swap on an atomic float64 field; stores `new` when the
    /// field compares equal to `current` and returns the observed value.
    ///
    /// Comparison follows float equality, so a NaN never matches.
    pub fn compare_exchange_f64(&self, name: &str, current: f64, new: f64) -> ArenaResult<f64> {
        let index = self.word_index(self.checked(name, FieldKind::AtomicFloat64)?, FieldKind::AtomicFloat64);
        Ok(self.with_spinlock(|| {
            let prior = self.arena.load_f64(index);
            if prior == current {
                self.arena.store_f64(index, new);
            }
            prior
        }))
    }

    fn with_spinlock<R>(&self, f: impl FnOnce() -> R) -> R {
        // Compilation reserves the spinlock word whenever an AtomicFloat64
        // field exists, so the accessor kind check above guarantees it here.
        let word = self
            .shape
            .spinlock_word()
            .expect("atomic float field implies a spinlock word");
        let lock = self.arena.word(self.base.index() + word);
        while lock
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        let out = f();
        lock.store(0, Ordering::Release);
        out
    }

    // ---- initialisation ---------------------------------------------------

    /// Initialises one field from a value-map entry, checking that the value
    /// variant matches the field kind (atomic or plain).
    pub(crate) fn init(&self, name: &str, value: Value) -> ArenaResult<()> {
        let id = self.shape.field(name)?;
        let index = self.base.index() + id.word as usize;
        match (value, id.kind) {
            (Value::I32(v), FieldKind::Int32 | FieldKind::AtomicInt32) => {
                self.arena.word(index).store(v as u32, Ordering::Relaxed);
            }
            (Value::F64(v), FieldKind::Float64 | FieldKind::AtomicFloat64) => {
                self.arena.store_f64(index, v);
            }
            (Value::Ref(v), FieldKind::Ref | FieldKind::AtomicRef) => {
                self.arena.word(index).store(v.0, Ordering::Relaxed);
            }
            (value, kind) => {
                return Err(ArenaError::TypeMismatch {
                    offset: self.base.0,
                    expected: format!("{kind:?} field {name:?} on {}", self.shape.name()),
                    found: format!("initial value {value:?}"),
                });
            }
        }
        Ok(())
    }
}
