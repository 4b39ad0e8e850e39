//! Explicit runtime handle tying one arena to the registry interpreting it.
//!
//! There is no process-wide singleton anywhere in the crate: whoever needs
//! the arena or the registry receives a `Runtime` reference explicitly,
//! typically as `Arc<Runtime>` cloned into each agent.

use crate::arena::Arena;
use crate::layout::Registry;
use crate::ArenaResult;
use std::sync::Arc;

/// One arena plus the shape registry that interprets it.
pub struct Runtime {
    arena: Arc<Arena>,
    registry: Registry,
}

impl Runtime {
    /// Wraps an existing arena with a fresh registry.
    pub fn new(arena: Arena) -> Self {
        Self {
            arena: Arc::new(arena),
            registry: Registry::new(),
        }
    }

    /// Maps a fresh arena of `words` words and wraps it.
    pub fn with_capacity(words: usize) -> ArenaResult<Self> {
        Ok(Self::new(Arena::with_capacity(words)?))
    }

    /// The shared arena.
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// The shape registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
