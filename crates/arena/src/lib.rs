//! Linear memory arena.
//!
//! An [`Arena`] is a single growable byte buffer that hands out
//! [`ArenaRegion`]s, in the same way a WebAssembly module hands out pointers
//! into its linear memory.  Regions are plain offsets, so they stay valid when
//! the memory grows.  Nothing is garbage collected: every allocation must be
//! released explicitly, or acquired through [`Arena::scratch`] so that it is
//! released when the guard goes out of scope.
//!
//! The arena is single-threaded.  Accesses go through closures that borrow the
//! memory for their duration, and an access attempted while another one is in
//! progress fails with [`ArenaError::Busy`] instead of panicking.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;

use tracing::*;

mod error;

pub use error::ArenaError;

/// Size of one memory page, matching WebAssembly pages.
pub const PAGE_SIZE: usize = 64 * 1024;

/// Default cap on the number of pages (1 GiB).
pub const DEFAULT_MAX_PAGES: usize = 16 * 1024;

/// Alignment of every allocation.
const ALIGN: usize = 8;

/// Wrapper result type.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// A span of bytes inside an [`Arena`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ArenaRegion {
    offset: usize,
    len: usize,
}

impl ArenaRegion {
    fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Byte offset of the region in arena memory.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the region.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Returns if the two regions share at least one byte.
    pub fn overlaps(&self, other: &ArenaRegion) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// Returns the sub-span `[start, start + len)` of this region, if it fits.
    pub fn subregion(&self, start: usize, len: usize) -> Option<ArenaRegion> {
        let end = start.checked_add(len)?;
        if end > self.len {
            return None;
        }
        Some(Self::new(self.offset + start, len))
    }
}

/// Growable linear memory with explicit allocation and release.
#[derive(Debug)]
pub struct Arena {
    memory: RefCell<Vec<u8>>,

    /// Live allocations, offset to requested length.
    live: RefCell<BTreeMap<usize, usize>>,

    max_pages: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(1, DEFAULT_MAX_PAGES)
    }
}

impl Arena {
    /// Creates an arena with `initial_pages` of zeroed memory that may grow up
    /// to `max_pages`.
    pub fn new(initial_pages: usize, max_pages: usize) -> Self {
        let max_pages = max_pages.max(initial_pages);
        Self {
            memory: RefCell::new(vec![0; initial_pages * PAGE_SIZE]),
            live: RefCell::new(BTreeMap::new()),
            max_pages,
        }
    }

    /// Number of pages currently backing the arena.
    pub fn pages(&self) -> usize {
        self.byte_len() / PAGE_SIZE
    }

    /// Size of the backing memory in bytes.
    pub fn byte_len(&self) -> usize {
        self.memory.borrow().len()
    }

    /// Number of allocations that have not been released.
    pub fn live_allocations(&self) -> usize {
        self.live.borrow().len()
    }

    /// Total bytes held by live allocations, including alignment padding.
    pub fn allocated_bytes(&self) -> usize {
        self.live.borrow().values().map(|&len| aligned(len)).sum()
    }

    /// Allocates a zeroed region of `len` bytes.
    pub fn alloc(&self, len: usize) -> ArenaResult<ArenaRegion> {
        if len == 0 {
            return Err(ArenaError::ZeroSized);
        }

        let oom = ArenaError::OutOfMemory {
            requested: len,
            max_pages: self.max_pages,
        };
        let size = len.checked_next_multiple_of(ALIGN).ok_or(oom.clone())?;

        let mut live = self.live.try_borrow_mut().map_err(|_| ArenaError::Busy)?;

        // First fit in the gaps between live allocations.
        let mut cursor = 0;
        for (&off, &held) in live.iter() {
            if off - cursor >= size {
                break;
            }
            cursor = off + aligned(held);
        }

        let end = cursor.checked_add(size).ok_or(oom.clone())?;
        let mut memory = self.memory.try_borrow_mut().map_err(|_| ArenaError::Busy)?;
        if end > memory.len() {
            let pages = end.div_ceil(PAGE_SIZE);
            if pages > self.max_pages {
                warn!(%len, max_pages = %self.max_pages, "arena exhausted");
                return Err(oom);
            }
            debug!(from = %memory.len() / PAGE_SIZE, to = %pages, "growing arena");
            memory.resize(pages * PAGE_SIZE, 0);
        }

        memory[cursor..end].fill(0);
        live.insert(cursor, len);
        trace!(offset = %cursor, %len, "arena alloc");

        Ok(ArenaRegion::new(cursor, len))
    }

    /// Allocates a region and copies `bytes` into it.
    pub fn alloc_copy(&self, bytes: &[u8]) -> ArenaResult<ArenaRegion> {
        let region = self.alloc(bytes.len())?;
        self.write(region, 0, bytes)?;
        Ok(region)
    }

    /// Releases a live allocation.
    ///
    /// `region` must be exactly what [`Arena::alloc`] returned, not a
    /// subregion of it.
    pub fn release(&self, region: ArenaRegion) -> ArenaResult<()> {
        let mut live = self.live.try_borrow_mut().map_err(|_| ArenaError::Busy)?;
        match live.get(&region.offset) {
            Some(&len) if region.len == len => {
                live.remove(&region.offset);
                trace!(offset = %region.offset, len = %region.len, "arena release");
                Ok(())
            }
            _ => Err(unknown(region)),
        }
    }

    /// Acquires a scratch region that is released when the guard is dropped.
    pub fn scratch(&self, len: usize) -> ArenaResult<Scratch<'_>> {
        let region = self.alloc(len)?;
        Ok(Scratch {
            arena: self,
            region,
        })
    }

    /// Checks that `region` lies within a single live allocation.
    pub fn check_live(&self, region: ArenaRegion) -> ArenaResult<()> {
        let live = self.live.try_borrow().map_err(|_| ArenaError::Busy)?;
        match live.range(..=region.offset).next_back() {
            Some((&off, &len)) if region.end() <= off + len => Ok(()),
            _ => Err(unknown(region)),
        }
    }

    /// Copies `bytes` into `region` starting at `at`.
    pub fn write(&self, region: ArenaRegion, at: usize, bytes: &[u8]) -> ArenaResult<()> {
        let target = region
            .subregion(at, bytes.len())
            .ok_or(ArenaError::OutOfBounds {
                at,
                len: bytes.len(),
                region_len: region.len,
            })?;
        self.with_region_mut(target, |buf| buf.copy_from_slice(bytes))
    }

    /// Copies the contents of `region` out of the arena.
    pub fn read(&self, region: ArenaRegion) -> ArenaResult<Vec<u8>> {
        self.with_region(region, |buf| buf.to_vec())
    }

    /// Runs `f` over the bytes of `region`.
    ///
    /// The memory stays borrowed while `f` runs, so `f` cannot allocate from
    /// this arena.
    pub fn with_region<R>(&self, region: ArenaRegion, f: impl FnOnce(&[u8]) -> R) -> ArenaResult<R> {
        self.check_live(region)?;
        let memory = self.memory.try_borrow().map_err(|_| ArenaError::Busy)?;
        Ok(f(&memory[region.range()]))
    }

    /// Runs `f` over the bytes of `region`, mutably.
    pub fn with_region_mut<R>(
        &self,
        region: ArenaRegion,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> ArenaResult<R> {
        self.check_live(region)?;
        let mut memory = self.memory.try_borrow_mut().map_err(|_| ArenaError::Busy)?;
        Ok(f(&mut memory[region.range()]))
    }

    /// Runs `f` with `src` borrowed immutably and `dst` borrowed mutably.
    ///
    /// The regions must not overlap.
    pub fn with_split<R>(
        &self,
        src: ArenaRegion,
        dst: ArenaRegion,
        f: impl FnOnce(&[u8], &mut [u8]) -> R,
    ) -> ArenaResult<R> {
        self.check_live(src)?;
        self.check_live(dst)?;
        if src.overlaps(&dst) {
            return Err(ArenaError::Overlap);
        }

        let mut memory = self.memory.try_borrow_mut().map_err(|_| ArenaError::Busy)?;
        let res = if src.end() <= dst.offset {
            let (lo, hi) = memory.split_at_mut(dst.offset);
            f(&lo[src.range()], &mut hi[..dst.len])
        } else {
            let (lo, hi) = memory.split_at_mut(src.offset);
            f(&hi[..src.len], &mut lo[dst.range()])
        };
        Ok(res)
    }
}

/// Size an allocation of `len` bytes takes up, including padding.
fn aligned(len: usize) -> usize {
    len.next_multiple_of(ALIGN)
}

fn unknown(region: ArenaRegion) -> ArenaError {
    ArenaError::UnknownRegion {
        offset: region.offset,
        len: region.len,
    }
}

/// Scoped arena allocation, released on drop.
#[derive(Debug)]
pub struct Scratch<'a> {
    arena: &'a Arena,
    region: ArenaRegion,
}

impl<'a> Scratch<'a> {
    /// The arena this scratch space lives in.
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// The region held by this guard.
    pub fn region(&self) -> ArenaRegion {
        self.region
    }

    /// Copies `bytes` into the scratch region starting at `at`.
    pub fn write(&self, at: usize, bytes: &[u8]) -> ArenaResult<()> {
        self.arena.write(self.region, at, bytes)
    }

    /// Copies the scratch region out of the arena.
    pub fn read(&self) -> ArenaResult<Vec<u8>> {
        self.arena.read(self.region)
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.arena.release(self.region) {
            warn!(%e, offset = %self.region.offset, "failed to release scratch region");
        }
    }
}
