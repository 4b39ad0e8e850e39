//! Error taxonomy for the arena core.
//!
//! Every error here is fatal for the operation that raised it: the allocator
//! and bootstrap protocol never retry on behalf of the caller, and a failed
//! reconstruction indicates a logic error or a corrupted region. CAS retries
//! inside the allocator and the float spinlock are part of normal operation
//! under contention and are never surfaced.

use thiserror::Error;

/// Convenience alias for fallible arena operations.
pub type ArenaResult<T, E = ArenaError> = Result<T, E>;

/// Errors surfaced by the arena core.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The bump allocator would run past the arena limit.
    #[error("arena out of memory: requested {requested} words at cursor {cursor}, limit {limit}")]
    OutOfMemory {
        /// Words requested by the failing allocation.
        requested: usize,
        /// Allocation cursor observed when the request failed.
        cursor: u32,
        /// Exclusive allocation limit of the arena.
        limit: u32,
    },

    /// Mapping the backing region failed for the given size/alignment pair.
    #[error("failed to map shared region of {size} bytes aligned to {alignment}")]
    AllocationFailed {
        /// Requested region size in bytes.
        size: usize,
        /// Requested region alignment in bytes.
        alignment: usize,
    },

    /// Reconstruction found a header or field that does not match expectations.
    #[error("type mismatch at offset {offset}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Word offset that was being reconstructed or accessed.
        offset: u32,
        /// What the caller asked for.
        expected: String,
        /// What the stored header or shape actually describes.
        found: String,
    },

    /// Two structurally different shapes mapped to the same type tag.
    #[error("duplicate type tag {tag:#x}: {existing:?} vs {incoming:?}")]
    DuplicateTypeTag {
        /// The colliding tag value.
        tag: u32,
        /// Name of the shape already registered under the tag.
        existing: String,
        /// Name of the shape whose registration was rejected.
        incoming: String,
    },

    /// A shape exceeds the maximum supported struct size.
    #[error("shape {name:?} needs {words} data words, maximum is {max}")]
    TooManyFields {
        /// Name of the rejected shape.
        name: String,
        /// Data words the shape would occupy.
        words: usize,
        /// Maximum data words a shape may occupy.
        max: usize,
    },

    /// A second coordinator tried to initialise the same region.
    #[error("arena already initialised by another coordinator")]
    AlreadyInitialized,

    /// The bootstrap role string was not recognised.
    #[error("invalid bootstrap role {0:?}")]
    InvalidRole(String),

    /// A field name was not found on the shape.
    #[error("shape {shape:?} has no field named {field:?}")]
    UnknownField {
        /// Name of the shape that was queried.
        shape: String,
        /// The missing field name.
        field: String,
    },
}
