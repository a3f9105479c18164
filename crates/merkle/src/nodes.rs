//! Node buffer layout and the padding rules shared by every hash provider.
//!
//! Nodes are stored as a 1-indexed binary heap: slot 1 is the root, the
//! children of slot `i` are `2i` and `2i + 1`, and the parents of the leaves
//! occupy `[node_count / 2, node_count)`.  Slot 0 is unused.
//!
//! Leaves are paired left to right.  A trailing odd leaf is paired with an
//! all-zero digest, and any leaf-parent slot without leaves is filled with
//! `merge(ZERO, ZERO)`, so the root only depends on the logical leaf sequence.

use tracing::*;

use crate::error::{MerkleError, MerkleResult};
use crate::hasher::{HashProvider, MerkleHash};
use crate::leaves::LeafVector;

/// Geometry of the node buffer for a given depth and leaf count.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeLayout {
    depth: u32,
    node_count: usize,
    leaf_count: usize,
}

impl NodeLayout {
    /// Computes the layout of a tree of `depth` over `leaf_count` leaves.
    pub fn new(depth: u32, leaf_count: usize) -> MerkleResult<Self> {
        if depth >= usize::BITS - 1 {
            return Err(MerkleError::DepthTooLarge(depth));
        }
        let node_count = 1usize << depth;
        if depth == 0 || leaf_count == 0 || leaf_count > node_count {
            return Err(MerkleError::InvalidInput);
        }

        Ok(Self {
            depth,
            node_count,
            leaf_count,
        })
    }

    /// Depth of a tree over `leaf_count` leaves, `ceil(log2(leaf_count))`.
    ///
    /// A single leaf still gets one level, so that it has a parent to hold the
    /// root.
    pub fn depth_for(leaf_count: usize) -> u32 {
        leaf_count.next_power_of_two().trailing_zeros().max(1)
    }

    /// Tree depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of slots in the node buffer, `2^depth`.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of leaf-parent slots.
    pub fn parent_count(&self) -> usize {
        self.node_count / 2
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Leaf count rounded down to even.
    pub fn even_leaf_count(&self) -> usize {
        self.leaf_count & !1
    }

    /// Returns if the last leaf has no sibling.
    pub fn has_odd_tail(&self) -> bool {
        self.leaf_count & 1 == 1
    }

    /// Size of the node buffer in bytes for `node_size`-byte digests.
    pub fn byte_len(&self, node_size: usize) -> MerkleResult<usize> {
        self.node_count
            .checked_mul(node_size)
            .ok_or(MerkleError::DepthTooLarge(self.depth))
    }
}

/// Fills `nodes` with every internal node of the tree over `leaf_bytes`.
///
/// `nodes` must be exactly `layout.byte_len(HASH_LEN)` bytes and `leaf_bytes`
/// must hold `layout.leaf_count()` records of `element_size` bytes.
pub fn fill_nodes<P: HashProvider + ?Sized>(
    provider: &P,
    layout: &NodeLayout,
    leaf_bytes: &[u8],
    element_size: usize,
    nodes: &mut [u8],
) {
    let n = <P::Hash as MerkleHash>::HASH_LEN;
    let zero = <P::Hash as MerkleHash>::zero();
    let parent_count = layout.parent_count();
    let even = layout.even_leaf_count();

    let parents = &mut nodes[parent_count * n..];

    // First row of internal nodes, the parents of the leaves.
    let pairs = even / 2;
    provider.hash_pairs(
        &leaf_bytes[..even * element_size],
        2 * element_size,
        &mut parents[..pairs * n],
    );
    let mut filled = pairs;

    if layout.has_odd_tail() {
        let last = &leaf_bytes[even * element_size..(even + 1) * element_size];
        let h = provider.merge(last, zero.as_ref());
        parents[filled * n..(filled + 1) * n].copy_from_slice(h.as_ref());
        filled += 1;
    }

    if filled < parent_count {
        let null_parent = provider.merge(zero.as_ref(), zero.as_ref());
        for slot in parents[filled * n..].chunks_exact_mut(n) {
            slot.copy_from_slice(null_parent.as_ref());
        }
    }

    provider.merge_node_rows(nodes, parent_count);
}

/// Builds a node buffer on the heap.
pub(crate) fn build_nodes<P, L>(
    provider: &P,
    depth: u32,
    leaves: &L,
) -> MerkleResult<NodeBuffer<P::Hash>>
where
    P: HashProvider + ?Sized,
    L: LeafVector,
{
    let layout = NodeLayout::new(depth, leaves.len())?;
    let mut slab = vec![0; layout.byte_len(<P::Hash as MerkleHash>::HASH_LEN)?];
    let leaf_bytes = leaves.to_bytes(0, leaves.len())?;

    fill_nodes(provider, &layout, &leaf_bytes, leaves.element_size(), &mut slab);
    trace!(%depth, leaves = %leaves.len(), "filled node buffer");

    NodeBuffer::from_bytes(depth, &slab)
}

/// Internal nodes of a tree as a 1-indexed heap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeBuffer<H> {
    depth: u32,
    nodes: Vec<H>,
}

impl<H: MerkleHash> NodeBuffer<H> {
    /// Splits a raw slab of `2^depth` digests into nodes.
    pub(crate) fn from_bytes(depth: u32, bytes: &[u8]) -> MerkleResult<Self> {
        let node_count = NodeLayout::new(depth, 1)?.node_count();
        if bytes.len() != node_count * H::HASH_LEN {
            return Err(MerkleError::ValueSizeMismatch {
                len: bytes.len(),
                element_size: H::HASH_LEN,
            });
        }

        let nodes = bytes
            .chunks_exact(H::HASH_LEN)
            .map(H::from_slice)
            .collect::<Option<Vec<_>>>()
            .ok_or(MerkleError::InvalidInput)?;

        Ok(Self { depth, nodes })
    }

    /// Depth of the tree.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of slots, including the unused slot 0.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The root, slot 1.
    pub fn root(&self) -> &H {
        &self.nodes[1]
    }

    /// Returns the node in slot `index`.
    pub fn get(&self, index: usize) -> Option<&H> {
        self.nodes.get(index)
    }

    /// The parents of the leaves.
    pub fn leaf_parents(&self) -> &[H] {
        &self.nodes[self.nodes.len() / 2..]
    }

    /// All slots.
    pub fn as_slice(&self) -> &[H] {
        &self.nodes
    }
}
