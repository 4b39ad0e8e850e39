//! Backing memory for the word arena.
//!
//! The arena protocol assumes one flat, zero-initialised region that every
//! agent sees at the same offsets. Native builds prefer anonymous `mmap`
//! regions (page aligned); when the mapping cannot honor the requested
//! alignment we fall back to an aligned heap allocation. The unsafe surface
//! stays encapsulated here.

use crate::{ArenaError, ArenaResult};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

#[derive(Debug)]
enum Backing {
    Mapped(memmap2::MmapMut),
    Owned { ptr: NonNull<u8>, layout: Layout },
}

impl Backing {
    fn as_ptr(&self) -> *const u8 {
        match self {
            Backing::Mapped(map) => map.as_ptr(),
            Backing::Owned { ptr, .. } => ptr.as_ptr(),
        }
    }
}

/// Zeroed, aligned, contiguous memory backing one arena.
#[derive(Debug)]
pub struct SharedRegion {
    len: usize,
    alignment: usize,
    backing: Backing,
}

// SAFETY: the region is a plain byte allocation with no interior pointers;
// all concurrent access goes through the `AtomicU32` views the arena layers
// on top of it.
unsafe impl Send for SharedRegion {}
// SAFETY: as above; `&SharedRegion` only hands out const pointers.
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocates a zeroed region of `len` bytes aligned to `alignment`.
    pub fn new_zeroed(len: usize, alignment: usize) -> ArenaResult<Self> {
        if len == 0 || alignment == 0 || !alignment.is_power_of_two() {
            return Err(ArenaError::AllocationFailed {
                size: len,
                alignment,
            });
        }

        if let Some(backing) = Self::mapped(len, alignment)? {
            return Ok(Self {
                len,
                alignment,
                backing,
            });
        }

        Self::heap(len, alignment)
    }

    fn mapped(len: usize, alignment: usize) -> ArenaResult<Option<Backing>> {
        let map = memmap2::MmapOptions::new()
            .len(len)
            .map_anon()
            .map_err(|_| ArenaError::AllocationFailed {
                size: len,
                alignment,
            })?;

        if map.as_ptr() as usize % alignment != 0 {
            return Ok(None);
        }

        // Anonymous mappings are zero-filled by the kernel.
        Ok(Some(Backing::Mapped(map)))
    }

    fn heap(len: usize, alignment: usize) -> ArenaResult<Self> {
        let layout = Layout::from_size_align(len, alignment).map_err(|_| {
            ArenaError::AllocationFailed {
                size: len,
                alignment,
            }
        })?;

        // SAFETY: `layout` has non-zero size, checked above.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(ArenaError::AllocationFailed {
            size: len,
            alignment,
        })?;

        Ok(Self {
            len,
            alignment,
            backing: Backing::Owned { ptr, layout },
        })
    }

    /// Total number of bytes managed by this region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment the region was allocated with.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Borrow the region as a const pointer.
    pub fn as_ptr(&self) -> *const u8 {
        self.backing.as_ptr()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Backing::Owned { ptr, layout } = &self.backing {
            // SAFETY: the pointer was produced by `alloc_zeroed` with this layout.
            unsafe {
                dealloc(ptr.as_ptr(), *layout);
            }
        }
    }
}
