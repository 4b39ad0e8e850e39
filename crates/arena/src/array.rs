//! Inline homogeneous arrays with an element-count header.
//!
//! Layout: header word, element count word, then the payload. Float64
//! payloads start on the word after the count, which is 8-byte aligned
//! because object bases are even. Element access mirrors slice semantics
//! and panics on an out-of-range index or a kind-mismatched accessor;
//! reconstruction from a bare offset is fallible like struct views.

use crate::arena::{Arena, Ref};
use crate::layout::{self, Header};
use crate::{ArenaError, ArenaResult};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Element kind stored in an array header.
///
/// The codes match the field descriptor codes of the struct layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElemKind {
    /// References to other shared objects.
    Ref,
    /// Float64 elements, two words each.
    Float64,
    /// Int32 elements.
    Int32,
}

impl ElemKind {
    pub(crate) fn code(self) -> u32 {
        match self {
            ElemKind::Ref => 1,
            ElemKind::Float64 => 2,
            ElemKind::Int32 => 3,
        }
    }

    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ElemKind::Ref),
            2 => Some(ElemKind::Float64),
            3 => Some(ElemKind::Int32),
            _ => None,
        }
    }

    fn payload_words(self, len: usize) -> usize {
        match self {
            ElemKind::Ref | ElemKind::Int32 => len,
            ElemKind::Float64 => 2 * len,
        }
    }
}

/// Handle to an inline fixed-length array in the arena.
#[derive(Clone)]
pub struct ArrayRef {
    arena: Arc<Arena>,
    elem: ElemKind,
    base: Ref,
    len: usize,
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && Arc::ptr_eq(&self.arena, &other.arena)
    }
}

impl Eq for ArrayRef {}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRef")
            .field("elem", &self.elem)
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

impl ArrayRef {
    /// Allocates a zeroed array of `len` elements.
    pub fn allocate(arena: &Arc<Arena>, elem: ElemKind, len: usize) -> ArenaResult<Self> {
        let base = arena.allocate(2 + elem.payload_words(len))?;
        arena
            .word(base.index() + 1)
            .store(len as u32, Ordering::Relaxed);
        arena
            .word(base.index())
            .store(layout::encode_array_header(elem), Ordering::Release);
        Ok(Self {
            arena: arena.clone(),
            elem,
            base,
            len,
        })
    }

    /// Reconstructs an array view from a bare offset, verifying the header.
    pub fn from_ref(arena: &Arc<Arena>, elem: ElemKind, r: Ref) -> ArenaResult<Self> {
        if r.is_null() {
            return Err(ArenaError::TypeMismatch {
                offset: r.0,
                expected: format!("{elem:?} array"),
                found: "null reference".to_string(),
            });
        }
        let header = layout::decode_header(arena.word(r.index()).load(Ordering::Acquire));
        if header.category != layout::CAT_ARRAY || header.tag != elem.code() {
            return Err(ArenaError::TypeMismatch {
                offset: r.0,
                expected: format!("{elem:?} array"),
                found: header.describe(),
            });
        }
        Ok(Self::attach(arena, elem, r))
    }

    /// Reconstruction path used by registry resolution: the header has
    /// already been read and categorised.
    pub(crate) fn from_header(arena: &Arc<Arena>, r: Ref, header: Header) -> ArenaResult<Self> {
        let elem = ElemKind::from_code(header.tag).ok_or_else(|| ArenaError::TypeMismatch {
            offset: r.0,
            expected: "array element kind".to_string(),
            found: header.describe(),
        })?;
        Ok(Self::attach(arena, elem, r))
    }

    fn attach(arena: &Arc<Arena>, elem: ElemKind, r: Ref) -> Self {
        let len = arena.word(r.index() + 1).load(Ordering::Relaxed) as usize;
        Self {
            arena: arena.clone(),
            elem,
            base: r,
            len,
        }
    }

    /// The offset of the array object.
    pub fn base(&self) -> Ref {
        self.base
    }

    /// Element kind of the array.
    pub fn elem(&self) -> ElemKind {
        self.elem
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot(&self, index: usize, want: ElemKind) -> usize {
        assert_eq!(
            self.elem, want,
            "accessor kind does not match {:?} array",
            self.elem
        );
        assert!(
            index < self.len,
            "index {index} out of bounds (len {})",
            self.len
        );
        let payload = self.base.index() + 2;
        match want {
            ElemKind::Ref | ElemKind::Int32 => payload + index,
            ElemKind::Float64 => payload + 2 * index,
        }
    }

    /// Reads element `index` of an int32 array.
    ///
    /// Panics when the index is out of bounds or the array holds another
    /// element kind; the float64/ref accessors behave the same way.
    pub fn get_i32(&self, index: usize) -> i32 {
        self.arena
            .word(self.slot(index, ElemKind::Int32))
            .load(Ordering::Relaxed) as i32
    }

    /// Writes element `index` of an int32 array.
    pub fn set_i32(&self, index: usize, value: i32) {
        self.arena
            .word(self.slot(index, ElemKind::Int32))
            .store(value as u32, Ordering::Relaxed);
    }

    /// Reads element `index` of a float64 array.
    pub fn get_f64(&self, index: usize) -> f64 {
        self.arena.load_f64(self.slot(index, ElemKind::Float64))
    }

    /// Writes element `index` of a float64 array.
    pub fn set_f64(&self, index: usize, value: f64) {
        self.arena
            .store_f64(self.slot(index, ElemKind::Float64), value);
    }

    /// Reads element `index` of a reference array.
    pub fn get_ref(&self, index: usize) -> Ref {
        Ref(self
            .arena
            .word(self.slot(index, ElemKind::Ref))
            .load(Ordering::Relaxed))
    }

    /// Writes element `index` of a reference array.
    pub fn set_ref(&self, index: usize, value: Ref) {
        self.arena
            .word(self.slot(index, ElemKind::Ref))
            .store(value.0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Role;

    fn setup() -> Arc<Arena> {
        let arena = Arena::with_capacity(512).expect("create arena");
        arena.bootstrap(Role::Coordinator).expect("bootstrap");
        Arc::new(arena)
    }

    #[test]
    fn int32_round_trip_and_reconstruction() {
        let arena = setup();
        let array = ArrayRef::allocate(&arena, ElemKind::Int32, 5).unwrap();
        for i in 0..5 {
            array.set_i32(i, (i as i32) * -7);
        }

        let back = ArrayRef::from_ref(&arena, ElemKind::Int32, array.base()).unwrap();
        assert_eq!(back.len(), 5);
        for i in 0..5 {
            assert_eq!(back.get_i32(i), (i as i32) * -7);
        }
        assert_eq!(back, array);
    }

    #[test]
    fn float64_payload_is_aligned() {
        let arena = setup();
        let array = ArrayRef::allocate(&arena, ElemKind::Float64, 3).unwrap();
        // Payload starts two words past an even base.
        assert_eq!((array.base().0 + 2) & 1, 0);
        array.set_f64(2, 6.25);
        assert_eq!(array.get_f64(2), 6.25);
        assert_eq!(array.get_f64(0), 0.0);
    }

    #[test]
    fn ref_elements_default_to_null() {
        let arena = setup();
        let array = ArrayRef::allocate(&arena, ElemKind::Ref, 4).unwrap();
        assert!(array.get_ref(0).is_null());
        let target = arena.allocate(2).unwrap();
        array.set_ref(3, target);
        assert_eq!(array.get_ref(3), target);
    }

    #[test]
    fn kind_mismatch_on_reconstruction() {
        let arena = setup();
        let array = ArrayRef::allocate(&arena, ElemKind::Int32, 2).unwrap();
        assert!(matches!(
            ArrayRef::from_ref(&arena, ElemKind::Float64, array.base()),
            Err(ArenaError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ArrayRef::from_ref(&arena, ElemKind::Int32, Ref::NULL),
            Err(ArenaError::TypeMismatch { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_panics() {
        let arena = setup();
        let array = ArrayRef::allocate(&arena, ElemKind::Int32, 2).unwrap();
        array.get_i32(2);
    }
}
