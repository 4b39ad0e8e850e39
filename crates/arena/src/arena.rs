//! The word-addressed shared arena: bump allocator, reserved header words,
//! and the bootstrap/agent-id protocol.
//!
//! Word layout of the low arena (word = 4 bytes):
//!
//! ```text
//! [0]    null sentinel, never a valid object
//! [1]    allocation cursor (CAS-updated, monotonic, even)
//! [2]    allocation limit, exclusive
//! [3]    next agent id (coordinator claims 0)
//! [4]    init magic, set once by the coordinator
//! [5..8) reserved
//! [8]    root slot published for participant discovery
//! [10..] allocated structs and arrays
//! ```

use crate::region::SharedRegion;
use crate::wait;
use crate::{ArenaError, ArenaResult};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Bytes per arena word.
pub const WORD_BYTES: usize = 4;

const CURSOR_WORD: usize = 1;
const LIMIT_WORD: usize = 2;
const AGENT_ID_WORD: usize = 3;
const INIT_MAGIC_WORD: usize = 4;
const ROOT_WORD: usize = 8;
const FIRST_ALLOC_WORD: u32 = 10;

const INIT_MAGIC: u32 = 0x4152_4E41; // "ARNA"

/// Word offset of a shared object inside the arena.
///
/// `Ref::NULL` (offset 0) never addresses a valid object; reference equality
/// between shared objects is equality of their offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ref(pub u32);

impl Ref {
    /// The null reference.
    pub const NULL: Ref = Ref(0);

    /// Returns true for the null reference.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity assigned during bootstrap; the coordinator is always agent 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentId(pub u32);

/// Role an agent plays in the bootstrap protocol.
///
/// Exactly one agent bootstraps as coordinator before any other agent
/// touches the region; everyone else joins as a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Initialises the header and claims agent id 0.
    Coordinator,
    /// Joins an initialised arena and receives the next agent id.
    Participant,
}

impl FromStr for Role {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coordinator" => Ok(Role::Coordinator),
            "participant" => Ok(Role::Participant),
            other => Err(ArenaError::InvalidRole(other.to_string())),
        }
    }
}

/// One flat shared-memory region treated as an array of words, with a
/// lock-free bump allocator over it.
///
/// The allocator is monotonic by design: offsets are never reclaimed or
/// reused, so callers size the arena generously up front. Everything an
/// agent shares lives at some offset in here; the `Arena` handle itself
/// owns nothing but the mapping.
#[derive(Debug)]
pub struct Arena {
    region: SharedRegion,
    words: usize,
}

impl Arena {
    /// Smallest arena that still fits the reserved header.
    pub const MIN_WORDS: usize = 16;

    /// Maps a fresh zeroed arena of (at least) `words` words.
    pub fn with_capacity(words: usize) -> ArenaResult<Self> {
        let words = words.max(Self::MIN_WORDS) & !1;
        let region = SharedRegion::new_zeroed(words * WORD_BYTES, 64)?;
        Ok(Self { region, words })
    }

    /// Number of words addressable in this arena.
    pub fn words(&self) -> usize {
        self.words
    }

    /// Atomic view of a single arena word.
    ///
    /// Panics when `index` is out of bounds; offsets produced by the
    /// allocator are always in range.
    pub(crate) fn word(&self, index: usize) -> &AtomicU32 {
        assert!(
            index < self.words,
            "word index {index} out of bounds (arena has {} words)",
            self.words
        );
        // SAFETY: the region is a live allocation of `words * WORD_BYTES`
        // bytes aligned to 64; every word is a valid `AtomicU32` location
        // and all shared access goes through atomics.
        unsafe { &*(self.region.as_ptr().add(index * WORD_BYTES) as *const AtomicU32) }
    }

    /// Reads a float64 stored across the word pair starting at `index`.
    ///
    /// Plain (non-atomic) float access; the pair must be 8-byte aligned.
    pub(crate) fn load_f64(&self, index: usize) -> f64 {
        debug_assert_eq!(index & 1, 0, "float64 words start on an even word");
        let lo = self.word(index).load(Ordering::Relaxed) as u64;
        let hi = self.word(index + 1).load(Ordering::Relaxed) as u64;
        f64::from_bits(hi << 32 | lo)
    }

    /// Writes a float64 across the word pair starting at `index`.
    pub(crate) fn store_f64(&self, index: usize, value: f64) {
        debug_assert_eq!(index & 1, 0, "float64 words start on an even word");
        let bits = value.to_bits();
        self.word(index).store(bits as u32, Ordering::Relaxed);
        self.word(index + 1).store((bits >> 32) as u32, Ordering::Relaxed);
    }

    /// Claims `words` contiguous words via a CAS bump loop and returns the
    /// base offset.
    ///
    /// The claimed range is rounded up to an even word count so the cursor
    /// stays 8-byte aligned. This primitive never blocks (a lost CAS only
    /// retries against the new cursor), so it is safe to call while holding
    /// locks. Fails with [`ArenaError::OutOfMemory`] when the request would
    /// cross the allocation limit.
    pub fn allocate(&self, words: usize) -> ArenaResult<Ref> {
        let need = ((words.max(1) + 1) & !1) as u32;
        let cursor = self.word(CURSOR_WORD);
        let limit = self.word(LIMIT_WORD).load(Ordering::Relaxed);
        loop {
            let base = cursor.load(Ordering::Relaxed);
            let next = base
                .checked_add(need)
                .filter(|next| *next <= limit)
                .ok_or(ArenaError::OutOfMemory {
                    requested: words,
                    cursor: base,
                    limit,
                })?;
            if cursor
                .compare_exchange_weak(base, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(Ref(base));
            }
        }
    }

    /// Runs the bootstrap protocol for this agent and returns its id.
    ///
    /// The coordinator must bootstrap before any participant touches the
    /// arena; a second coordinator fails with
    /// [`ArenaError::AlreadyInitialized`].
    pub fn bootstrap(&self, role: Role) -> ArenaResult<AgentId> {
        match role {
            Role::Coordinator => {
                if self
                    .word(INIT_MAGIC_WORD)
                    .compare_exchange(0, INIT_MAGIC, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(ArenaError::AlreadyInitialized);
                }
                self.word(ROOT_WORD).store(0, Ordering::Relaxed);
                self.word(AGENT_ID_WORD).store(1, Ordering::Relaxed);
                self.word(LIMIT_WORD)
                    .store(self.words as u32, Ordering::Relaxed);
                self.word(CURSOR_WORD)
                    .store(FIRST_ALLOC_WORD, Ordering::Release);
                Ok(AgentId(0))
            }
            Role::Participant => {
                let id = self.word(AGENT_ID_WORD).fetch_add(1, Ordering::AcqRel);
                Ok(AgentId(id))
            }
        }
    }

    /// Publishes the well-known root reference for participant discovery.
    pub fn publish_root(&self, root: Ref) {
        self.word(ROOT_WORD).store(root.0, Ordering::Release);
        wait::wake_all(self.word(ROOT_WORD));
    }

    /// Reads the root slot; [`Ref::NULL`] while nothing is published.
    pub fn root(&self) -> Ref {
        Ref(self.word(ROOT_WORD).load(Ordering::Acquire))
    }

    /// Blocks until the coordinator publishes a non-null root.
    pub fn wait_root(&self) -> Ref {
        loop {
            let current = self.word(ROOT_WORD).load(Ordering::Acquire);
            if current != 0 {
                return Ref(current);
            }
            wait::wait_u32(self.word(ROOT_WORD), 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booted(words: usize) -> Arena {
        let arena = Arena::with_capacity(words).expect("create arena");
        arena.bootstrap(Role::Coordinator).expect("bootstrap");
        arena
    }

    #[test]
    fn allocations_are_even_and_disjoint() {
        let arena = booted(256);
        let a = arena.allocate(3).unwrap();
        let b = arena.allocate(5).unwrap();
        assert_eq!(a.0 & 1, 0);
        assert_eq!(b.0 & 1, 0);
        // 3 words round to 4.
        assert_eq!(b.0, a.0 + 4);
    }

    #[test]
    fn out_of_memory_at_the_boundary() {
        // Header takes 10 words; room for exactly three 4-word claims.
        let arena = booted(22);
        for _ in 0..3 {
            arena.allocate(4).expect("fits");
        }
        assert!(matches!(
            arena.allocate(4),
            Err(ArenaError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn second_coordinator_is_rejected() {
        let arena = booted(64);
        assert!(matches!(
            arena.bootstrap(Role::Coordinator),
            Err(ArenaError::AlreadyInitialized)
        ));
        assert_eq!(arena.bootstrap(Role::Participant).unwrap(), AgentId(1));
        assert_eq!(arena.bootstrap(Role::Participant).unwrap(), AgentId(2));
    }

    #[test]
    fn role_parsing() {
        assert_eq!("coordinator".parse::<Role>().unwrap(), Role::Coordinator);
        assert_eq!("participant".parse::<Role>().unwrap(), Role::Participant);
        assert!(matches!(
            "master".parse::<Role>(),
            Err(ArenaError::InvalidRole(_))
        ));
    }

    #[test]
    fn root_slot_round_trip() {
        let arena = booted(64);
        assert!(arena.root().is_null());
        let obj = arena.allocate(2).unwrap();
        arena.publish_root(obj);
        assert_eq!(arena.root(), obj);
        assert_eq!(arena.wait_root(), obj);
    }

    #[test]
    fn f64_word_pair_round_trip() {
        let arena = booted(64);
        let base = arena.allocate(2).unwrap();
        arena.store_f64(base.index(), -3.25);
        assert_eq!(arena.load_f64(base.index()), -3.25);
    }
}
