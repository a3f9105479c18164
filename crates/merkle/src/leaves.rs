//! Fixed-size leaf record storage.

use std::borrow::Cow;

use strata_arena::{Arena, ArenaRegion};

use crate::error::{MerkleError, MerkleResult};

/// Uniform view over a sequence of equal-sized, contiguous leaf records.
pub trait LeafVector {
    /// Number of records.
    fn len(&self) -> usize;

    /// Size of each record in bytes.
    fn element_size(&self) -> usize;

    /// Returns if there are no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of all records in bytes.
    fn byte_len(&self) -> usize {
        self.len() * self.element_size()
    }

    /// Returns the bytes of `count` records starting at `start`.
    fn to_bytes(&self, start: usize, count: usize) -> MerkleResult<Cow<'_, [u8]>>;

    /// Copies record `index` into the front of `dest`, returning the number of
    /// bytes written.
    fn copy_value(&self, index: usize, dest: &mut [u8]) -> MerkleResult<usize> {
        let size = self.element_size();
        let available = dest.len();
        let dest = dest
            .get_mut(..size)
            .ok_or(MerkleError::ValueSizeMismatch {
                len: available,
                element_size: size,
            })?;
        dest.copy_from_slice(&self.to_bytes(index, 1)?);
        Ok(size)
    }

    /// Returns a copy of record `index`.
    fn leaf(&self, index: usize) -> MerkleResult<Vec<u8>> {
        Ok(self.to_bytes(index, 1)?.into_owned())
    }

    /// The arena and region holding the records, if they live in an arena.
    fn arena_view(&self) -> Option<(&Arena, ArenaRegion)> {
        None
    }
}

/// Checks that `[start, start + count)` is a non-empty range of records.
fn check_range(len: usize, start: usize, count: usize) -> MerkleResult<()> {
    match start.checked_add(count) {
        Some(end) if count > 0 && end <= len => Ok(()),
        _ => Err(MerkleError::InvalidIndex(start)),
    }
}

fn check_element_size(len: usize, element_size: usize) -> MerkleResult<()> {
    if element_size == 0 || len % element_size != 0 {
        return Err(MerkleError::ValueSizeMismatch { len, element_size });
    }
    Ok(())
}

/// Leaf records in one exclusively-owned buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnedLeaves {
    bytes: Vec<u8>,
    element_size: usize,
}

impl OwnedLeaves {
    /// Packs a list of records, which must all have the same size.
    pub fn from_values<V: AsRef<[u8]>>(values: impl IntoIterator<Item = V>) -> MerkleResult<Self> {
        let mut values = values.into_iter();
        let first = values.next().ok_or(MerkleError::InvalidInput)?;
        let element_size = first.as_ref().len();
        check_element_size(element_size, element_size)?;

        let mut bytes = first.as_ref().to_vec();
        for v in values {
            let v = v.as_ref();
            if v.len() != element_size {
                return Err(MerkleError::ValueSizeMismatch {
                    len: v.len(),
                    element_size,
                });
            }
            bytes.extend_from_slice(v);
        }

        Ok(Self {
            bytes,
            element_size,
        })
    }

    /// Wraps a raw buffer of back-to-back records.
    pub fn from_buffer(bytes: Vec<u8>, element_size: usize) -> MerkleResult<Self> {
        check_element_size(bytes.len(), element_size)?;
        Ok(Self {
            bytes,
            element_size,
        })
    }

    /// The underlying buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Iterates over the records.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.bytes.chunks_exact(self.element_size)
    }
}

impl LeafVector for OwnedLeaves {
    fn len(&self) -> usize {
        self.bytes.len() / self.element_size
    }

    fn element_size(&self) -> usize {
        self.element_size
    }

    fn to_bytes(&self, start: usize, count: usize) -> MerkleResult<Cow<'_, [u8]>> {
        check_range(self.len(), start, count)?;
        let from = start * self.element_size;
        let to = from + count * self.element_size;
        Ok(Cow::Borrowed(&self.bytes[from..to]))
    }
}

/// Leaf records living in an [`Arena`].
///
/// The view never owns the region.  Whoever allocated it releases it, and
/// the borrow on the arena keeps the view from outliving it.
#[derive(Copy, Clone, Debug)]
pub struct ArenaLeaves<'a> {
    arena: &'a Arena,
    region: ArenaRegion,
    element_size: usize,
}

impl<'a> ArenaLeaves<'a> {
    /// Views an existing live region as records of `element_size` bytes.
    pub fn new(arena: &'a Arena, region: ArenaRegion, element_size: usize) -> MerkleResult<Self> {
        check_element_size(region.len(), element_size)?;
        arena.check_live(region)?;
        Ok(Self {
            arena,
            region,
            element_size,
        })
    }

    /// Copies `bytes` into a fresh region of `arena` and views it.
    ///
    /// The region belongs to the arena, release it through
    /// [`ArenaLeaves::region`] when done.
    pub fn from_buffer(arena: &'a Arena, bytes: &[u8], element_size: usize) -> MerkleResult<Self> {
        check_element_size(bytes.len(), element_size)?;
        let region = arena.alloc_copy(bytes)?;
        Ok(Self {
            arena,
            region,
            element_size,
        })
    }

    /// Region holding the records.
    pub fn region(&self) -> ArenaRegion {
        self.region
    }

    /// Arena holding the records.
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }
}

impl LeafVector for ArenaLeaves<'_> {
    fn len(&self) -> usize {
        self.region.len() / self.element_size
    }

    fn element_size(&self) -> usize {
        self.element_size
    }

    fn to_bytes(&self, start: usize, count: usize) -> MerkleResult<Cow<'_, [u8]>> {
        check_range(self.len(), start, count)?;
        let sub = self
            .region
            .subregion(start * self.element_size, count * self.element_size)
            .ok_or(MerkleError::InvalidIndex(start))?;
        Ok(Cow::Owned(self.arena.read(sub)?))
    }

    fn arena_view(&self) -> Option<(&Arena, ArenaRegion)> {
        Some((self.arena, self.region))
    }
}
