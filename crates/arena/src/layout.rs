//! Declarative struct layouts: field kinds, compiled shapes, type tags, and
//! the registry that reconstructs typed views from bare offsets.
//!
//! A shape is compiled once from an ordered field list into fixed word
//! offsets plus a deterministic tag; every agent registers the same shapes
//! and the tags make their registries agree without any shared-memory
//! coordination. Accessors are data driven: a field resolves to an
//! `(offset, kind)` pair interpreted by the generic routines in
//! [`StructRef`](crate::StructRef), there is no code generation anywhere.
//!
//! Object headers occupy the first word of every allocation:
//!
//! ```text
//! bits 29..32  category (0 struct, 1 array, 2 reserved for strings)
//! bits  8..29  type tag (structs) or element-kind code (arrays)
//! bits  0..8   data word count (structs; 0 for arrays)
//! ```
//!
//! Arrays store their element count in the word after the header.

use crate::arena::{Arena, Ref};
use crate::array::{ArrayRef, ElemKind};
use crate::view::StructRef;
use crate::{ArenaError, ArenaResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Maximum number of data words in a struct, header excluded.
pub const MAX_STRUCT_WORDS: usize = 12;

pub(crate) const CAT_STRUCT: u32 = 0;
pub(crate) const CAT_ARRAY: u32 = 1;
/// Reserved for inline strings; never produced today.
#[allow(dead_code)]
pub(crate) const CAT_STRING: u32 = 2;

const CAT_SHIFT: u32 = 29;
const TAG_SHIFT: u32 = 8;
const TAG_MASK: u32 = 0x1F_FFFF;
const COUNT_MASK: u32 = 0xFF;

/// Kinds a struct field can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain 32-bit integer, ordinary load/store.
    Int32,
    /// Plain float64, ordinary load/store, 8-byte aligned.
    Float64,
    /// Plain reference to another shared object.
    Ref,
    /// Atomic 32-bit integer with load/store/add/compare-exchange.
    AtomicInt32,
    /// Atomic float64 emulated through the shape's auxiliary spinlock word.
    AtomicFloat64,
    /// Atomic reference with load/store/compare-exchange.
    AtomicRef,
}

impl FieldKind {
    fn is_float(self) -> bool {
        matches!(self, FieldKind::Float64 | FieldKind::AtomicFloat64)
    }

    fn words(self) -> usize {
        if self.is_float() {
            2
        } else {
            1
        }
    }

    fn signature(self) -> &'static str {
        match self {
            FieldKind::Int32 => "i32",
            FieldKind::Float64 => "f64",
            FieldKind::Ref => "ref",
            FieldKind::AtomicInt32 => "ai32",
            FieldKind::AtomicFloat64 => "af64",
            FieldKind::AtomicRef => "aref",
        }
    }
}

/// Initial value for one field of a freshly allocated struct.
#[derive(Clone, Copy, Debug)]
pub enum Value {
    /// Initialises an `Int32` or `AtomicInt32` field.
    I32(i32),
    /// Initialises a `Float64` or `AtomicFloat64` field.
    F64(f64),
    /// Initialises a `Ref` or `AtomicRef` field.
    Ref(Ref),
}

/// Resolved accessor handle: the `(offset, kind)` pair of one field.
///
/// Only meaningful for the shape it was resolved from; the typed accessors
/// assert the kind on every use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldId {
    pub(crate) word: u32,
    pub(crate) kind: FieldKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    /// Word offset from the object base, header included.
    pub(crate) word: usize,
}

/// Compiled layout of a registered struct type.
///
/// Holds the fixed word offset of every field, the derived type tag, and the
/// auxiliary spinlock word reserved when any `AtomicFloat64` field is
/// present.
#[derive(Debug, PartialEq, Eq)]
pub struct Shape {
    name: String,
    fields: Vec<Field>,
    /// Data words, header excluded.
    words: usize,
    tag: u32,
    spinlock_word: Option<usize>,
}

impl Shape {
    /// Name the shape was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shape's type tag as stored in instance headers.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Data words one instance occupies, header excluded.
    pub fn words(&self) -> usize {
        self.words
    }

    pub(crate) fn spinlock_word(&self) -> Option<usize> {
        self.spinlock_word
    }

    /// Resolves a field name to its accessor handle.
    pub fn field(&self, name: &str) -> ArenaResult<FieldId> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| FieldId {
                word: field.word as u32,
                kind: field.kind,
            })
            .ok_or_else(|| ArenaError::UnknownField {
                shape: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Allocates a zeroed instance and installs its header.
    ///
    /// Fields need no explicit clearing: the arena is zero-mapped and
    /// offsets are never reused.
    pub fn allocate(self: &Arc<Self>, arena: &Arc<Arena>) -> ArenaResult<StructRef> {
        let base = arena.allocate(1 + self.words)?;
        arena
            .word(base.index())
            .store(encode_struct_header(self.tag, self.words), Ordering::Release);
        Ok(StructRef::new(arena.clone(), self.clone(), base))
    }

    /// Allocates an instance and initialises the named fields from a value
    /// map, in the order given.
    pub fn allocate_init(
        self: &Arc<Self>,
        arena: &Arc<Arena>,
        values: &[(&str, Value)],
    ) -> ArenaResult<StructRef> {
        let view = self.allocate(arena)?;
        for (name, value) in values {
            view.init(name, *value)?;
        }
        Ok(view)
    }

    /// Reconstructs a view from a bare offset, verifying the stored tag.
    pub fn view(self: &Arc<Self>, arena: &Arc<Arena>, r: Ref) -> ArenaResult<StructRef> {
        if r.is_null() {
            return Err(ArenaError::TypeMismatch {
                offset: r.0,
                expected: self.name.clone(),
                found: "null reference".to_string(),
            });
        }
        let header = decode_header(arena.word(r.index()).load(Ordering::Acquire));
        if header.category != CAT_STRUCT || header.tag != self.tag {
            return Err(ArenaError::TypeMismatch {
                offset: r.0,
                expected: self.name.clone(),
                found: header.describe(),
            });
        }
        Ok(StructRef::new(arena.clone(), self.clone(), r))
    }
}

/// Compiles an ordered field list into fixed offsets plus a tag.
fn compile(name: &str, fields: &[(&str, FieldKind)]) -> ArenaResult<Shape> {
    let mut compiled = Vec::with_capacity(fields.len());
    let mut loc = 1usize; // word 0 is the header
    let mut spinlock_word = None;

    for (field_name, kind) in fields {
        // The spinlock word goes in front of the first atomic float field.
        if *kind == FieldKind::AtomicFloat64 && spinlock_word.is_none() {
            spinlock_word = Some(loc);
            loc += 1;
        }
        if kind.is_float() {
            loc = (loc + 1) & !1;
        }
        compiled.push(Field {
            name: field_name.to_string(),
            kind: *kind,
            word: loc,
        });
        loc += kind.words();
    }

    let words = loc - 1;
    if words > MAX_STRUCT_WORDS {
        return Err(ArenaError::TooManyFields {
            name: name.to_string(),
            words,
            max: MAX_STRUCT_WORDS,
        });
    }

    Ok(Shape {
        name: name.to_string(),
        fields: compiled,
        words,
        tag: type_tag(name, fields),
        spinlock_word,
    })
}

/// Deterministic 21-bit FNV-1a tag over the shape name and field signature.
fn type_tag(name: &str, fields: &[(&str, FieldKind)]) -> u32 {
    const FNV_OFFSET: u32 = 0x811C_9DC5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET;
    let mut eat = |bytes: &[u8]| {
        for byte in bytes {
            hash ^= *byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };

    eat(name.as_bytes());
    eat(&[0]);
    for (field_name, kind) in fields {
        eat(field_name.as_bytes());
        eat(b":");
        eat(kind.signature().as_bytes());
        eat(b";");
    }

    let tag = (hash ^ (hash >> 21)) & TAG_MASK;
    if tag == 0 {
        1
    } else {
        tag
    }
}

pub(crate) fn encode_struct_header(tag: u32, words: usize) -> u32 {
    (CAT_STRUCT << CAT_SHIFT) | ((tag & TAG_MASK) << TAG_SHIFT) | (words as u32 & COUNT_MASK)
}

pub(crate) fn encode_array_header(elem: ElemKind) -> u32 {
    (CAT_ARRAY << CAT_SHIFT) | ((elem.code() & TAG_MASK) << TAG_SHIFT)
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Header {
    pub(crate) category: u32,
    pub(crate) tag: u32,
    #[allow(dead_code)]
    pub(crate) count: u32,
}

impl Header {
    pub(crate) fn describe(&self) -> String {
        match self.category {
            CAT_STRUCT => format!("struct with tag {:#x}", self.tag),
            CAT_ARRAY => match ElemKind::from_code(self.tag) {
                Some(elem) => format!("{elem:?} array"),
                None => format!("array with element code {}", self.tag),
            },
            other => format!("category {other}"),
        }
    }
}

pub(crate) fn decode_header(word: u32) -> Header {
    Header {
        category: word >> CAT_SHIFT,
        tag: (word >> TAG_SHIFT) & TAG_MASK,
        count: word & COUNT_MASK,
    }
}

/// A reconstructed object: either a struct view or an inline array.
#[derive(Debug)]
pub enum View {
    /// The offset held a struct with a registered tag.
    Struct(StructRef),
    /// The offset held an inline array.
    Array(ArrayRef),
}

const CACHE_SLOTS: usize = 64;

/// Direct-mapped reconstruction cache keyed by offset.
///
/// Purely a performance layer: the arena never frees or retypes an offset,
/// so a hit can only return the shape previously resolved for that offset.
/// Resolution is correct with every lookup missing.
struct ResolveCache {
    slots: Mutex<[Option<(u32, Arc<Shape>)>; CACHE_SLOTS]>,
}

impl ResolveCache {
    fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
        }
    }

    fn slot_of(r: Ref) -> usize {
        // Offsets are even, fold that bit out.
        (r.0 as usize >> 1) % CACHE_SLOTS
    }

    fn get(&self, r: Ref, tag: u32) -> Option<Arc<Shape>> {
        match &self.slots.lock()[Self::slot_of(r)] {
            Some((offset, shape)) if *offset == r.0 && shape.tag == tag => Some(shape.clone()),
            _ => None,
        }
    }

    fn put(&self, r: Ref, shape: Arc<Shape>) {
        self.slots.lock()[Self::slot_of(r)] = Some((r.0, shape));
    }
}

/// Maps type tags to compiled shapes and reconstructs views from offsets.
///
/// Host-side state: every agent builds its own registry by registering the
/// same shape definitions; deterministic tags keep the registries in
/// agreement.
pub struct Registry {
    shapes: RwLock<HashMap<u32, Arc<Shape>>>,
    cache: ResolveCache,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            shapes: RwLock::new(HashMap::new()),
            cache: ResolveCache::new(),
        }
    }

    /// Compiles and registers a shape.
    ///
    /// Registration is idempotent for a structurally identical shape and
    /// fails with [`ArenaError::DuplicateTypeTag`] when a structurally
    /// different shape already owns the computed tag, before any instance
    /// exists.
    pub fn register(&self, name: &str, fields: &[(&str, FieldKind)]) -> ArenaResult<Arc<Shape>> {
        self.insert(compile(name, fields)?)
    }

    pub(crate) fn insert(&self, shape: Shape) -> ArenaResult<Arc<Shape>> {
        let mut shapes = self.shapes.write();
        if let Some(existing) = shapes.get(&shape.tag) {
            if **existing == shape {
                return Ok(existing.clone());
            }
            return Err(ArenaError::DuplicateTypeTag {
                tag: shape.tag,
                existing: existing.name.clone(),
                incoming: shape.name,
            });
        }
        let shape = Arc::new(shape);
        shapes.insert(shape.tag, shape.clone());
        Ok(shape)
    }

    /// Looks up a registered shape by tag.
    pub fn lookup(&self, tag: u32) -> Option<Arc<Shape>> {
        self.shapes.read().get(&tag).cloned()
    }

    /// Reconstructs whatever object lives at `r` from its stored header.
    ///
    /// Fails with [`ArenaError::TypeMismatch`] for the null reference, an
    /// unknown tag, or an unrecognised header category; a mismatch is an
    /// error, never a silent cast.
    pub fn resolve(&self, arena: &Arc<Arena>, r: Ref) -> ArenaResult<View> {
        if r.is_null() {
            return Err(ArenaError::TypeMismatch {
                offset: r.0,
                expected: "shared object".to_string(),
                found: "null reference".to_string(),
            });
        }

        let header = decode_header(arena.word(r.index()).load(Ordering::Acquire));
        match header.category {
            CAT_ARRAY => Ok(View::Array(ArrayRef::from_header(arena, r, header)?)),
            CAT_STRUCT => {
                if let Some(shape) = self.cache.get(r, header.tag) {
                    return Ok(View::Struct(StructRef::new(arena.clone(), shape, r)));
                }
                let shape = self.lookup(header.tag).ok_or_else(|| ArenaError::TypeMismatch {
                    offset: r.0,
                    expected: "registered type tag".to_string(),
                    found: header.describe(),
                })?;
                self.cache.put(r, shape.clone());
                Ok(View::Struct(StructRef::new(arena.clone(), shape, r)))
            }
            _ => Err(ArenaError::TypeMismatch {
                offset: r.0,
                expected: "struct or array".to_string(),
                found: header.describe(),
            }),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Role;

    fn runtime_arena(words: usize) -> Arc<Arena> {
        let arena = Arena::with_capacity(words).expect("create arena");
        arena.bootstrap(Role::Coordinator).expect("bootstrap");
        Arc::new(arena)
    }

    #[test]
    fn offsets_align_floats_and_insert_spinlock() {
        let shape = compile(
            "Sample",
            &[
                ("a", FieldKind::Int32),
                ("b", FieldKind::Float64),
                ("c", FieldKind::AtomicFloat64),
                ("d", FieldKind::Ref),
            ],
        )
        .expect("compile");

        // a at 1, b aligned to 2..4, spinlock at 4, c aligned to 6..8, d at 8.
        assert_eq!(shape.field("a").unwrap().word, 1);
        assert_eq!(shape.field("b").unwrap().word, 2);
        assert_eq!(shape.spinlock_word(), Some(4));
        assert_eq!(shape.field("c").unwrap().word, 6);
        assert_eq!(shape.field("d").unwrap().word, 8);
        assert_eq!(shape.words(), 8);
    }

    #[test]
    fn tags_are_deterministic_and_structural() {
        let fields: &[(&str, FieldKind)] = &[("x", FieldKind::Int32), ("y", FieldKind::Float64)];
        let a = type_tag("Point", fields);
        let b = type_tag("Point", fields);
        assert_eq!(a, b);
        assert_ne!(a, 0);
        assert_ne!(a, type_tag("Point3", fields));
        assert_ne!(a, type_tag("Point", &[("x", FieldKind::Int32)]));
    }

    #[test]
    fn too_many_fields_is_rejected() {
        let fields: Vec<(&str, FieldKind)> = vec![
            ("a", FieldKind::Float64),
            ("b", FieldKind::Float64),
            ("c", FieldKind::Float64),
            ("d", FieldKind::Float64),
            ("e", FieldKind::Float64),
            ("f", FieldKind::Float64),
        ];
        // Six aligned float64 fields need 13 data words.
        assert!(matches!(
            compile("Fat", &fields),
            Err(ArenaError::TooManyFields { words: 13, .. })
        ));
    }

    #[test]
    fn reregistration_is_idempotent() {
        let registry = Registry::new();
        let first = registry
            .register("Pair", &[("x", FieldKind::Int32), ("y", FieldKind::Int32)])
            .unwrap();
        let second = registry
            .register("Pair", &[("x", FieldKind::Int32), ("y", FieldKind::Int32)])
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn forced_tag_collision_is_rejected_before_instantiation() {
        let registry = Registry::new();
        let first = compile("One", &[("x", FieldKind::Int32)]).unwrap();
        let mut second = compile("Two", &[("y", FieldKind::Float64)]).unwrap();
        second.tag = first.tag;

        registry.insert(first).unwrap();
        assert!(matches!(
            registry.insert(second),
            Err(ArenaError::DuplicateTypeTag { .. })
        ));
    }

    #[test]
    fn resolve_round_trips_structs_and_arrays() {
        let arena = runtime_arena(256);
        let registry = Registry::new();
        let shape = registry
            .register("Node", &[("value", FieldKind::Int32), ("next", FieldKind::Ref)])
            .unwrap();

        let node = shape
            .allocate_init(&arena, &[("value", Value::I32(7))])
            .unwrap();
        let array = ArrayRef::allocate(&arena, ElemKind::Float64, 4).unwrap();

        match registry.resolve(&arena, node.base()).unwrap() {
            View::Struct(view) => {
                assert_eq!(view, node);
                assert_eq!(view.get_i32("value").unwrap(), 7);
            }
            View::Array(_) => panic!("expected struct"),
        }
        // Resolve again to exercise the cache hit path.
        assert!(matches!(
            registry.resolve(&arena, node.base()),
            Ok(View::Struct(_))
        ));

        match registry.resolve(&arena, array.base()).unwrap() {
            View::Array(view) => {
                assert_eq!(view.len(), 4);
                assert_eq!(view.elem(), ElemKind::Float64);
            }
            View::Struct(_) => panic!("expected array"),
        }
    }

    #[test]
    fn resolve_rejects_null_and_unknown_tags() {
        let arena = runtime_arena(128);
        let registry = Registry::new();

        assert!(matches!(
            registry.resolve(&arena, Ref::NULL),
            Err(ArenaError::TypeMismatch { .. })
        ));

        // A struct allocated through a registry the resolver never saw.
        let foreign = Registry::new();
        let shape = foreign.register("Ghost", &[("x", FieldKind::Int32)]).unwrap();
        let ghost = shape.allocate(&arena).unwrap();
        assert!(matches!(
            registry.resolve(&arena, ghost.base()),
            Err(ArenaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn view_checks_the_expected_shape() {
        let arena = runtime_arena(128);
        let registry = Registry::new();
        let point = registry
            .register("Point", &[("x", FieldKind::Int32)])
            .unwrap();
        let node = registry
            .register("Node", &[("next", FieldKind::Ref)])
            .unwrap();

        let instance = point.allocate(&arena).unwrap();
        assert!(point.view(&arena, instance.base()).is_ok());
        assert!(matches!(
            node.view(&arena, instance.base()),
            Err(ArenaError::TypeMismatch { .. })
        ));
    }
}
