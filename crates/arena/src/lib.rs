//! Shared-memory arena core for cooperating execution agents.
//!
//! Independent agents (OS threads or processes that see the same mapped
//! bytes at the same offsets) coordinate through one flat word arena. This
//! crate provides the foundational pieces:
//! * [`SharedRegion`] – zeroed, aligned memory backing one arena.
//! * [`Arena`] – lock-free bump allocator, reserved header words, and the
//!   coordinator/participant bootstrap protocol.
//! * [`Registry`] / [`Shape`] – declarative field layouts compiled to fixed
//!   offsets with deterministic type tags, and fallible reconstruction of
//!   typed views from bare offsets.
//! * [`StructRef`] / [`ArrayRef`] – zero-ownership handles with plain and
//!   atomic accessors, including spinlock-emulated atomic float64 fields.
//! * [`wait`] – the futex-style wait/wake shim blocking primitives build on.

mod arena;
mod array;
mod error;
mod layout;
mod region;
mod runtime;
mod view;
pub mod wait;

pub use arena::{AgentId, Arena, Ref, Role, WORD_BYTES};
pub use array::{ArrayRef, ElemKind};
pub use error::{ArenaError, ArenaResult};
pub use layout::{FieldId, FieldKind, Registry, Shape, Value, View, MAX_STRUCT_WORDS};
pub use region::SharedRegion;
pub use runtime::Runtime;
pub use view::StructRef;
