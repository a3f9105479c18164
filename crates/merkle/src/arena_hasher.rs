//! BLAKE2s-256 provider that builds node buffers inside a linear memory arena.

use std::ptr;
use std::rc::Rc;

use blake2::Blake2s256;
use digest::Digest;
use strata_arena::{Arena, ArenaRegion, Scratch};
use tracing::*;

use crate::algorithm::{DIGEST_SIZE, HashAlgorithm};
use crate::error::MerkleResult;
use crate::hasher::HashProvider;
use crate::leaves::LeafVector;
use crate::nodes::{self, NodeBuffer, NodeLayout};

/// Arena-backed BLAKE2s-256 provider.
///
/// Produces exactly the same digests and node buffers as
/// [`Blake2sHasher`](crate::Blake2sHasher).  The difference is that tree
/// construction runs in arena memory with a single reused hasher state per
/// pass, and leaves that already live in the same arena are hashed in place.
///
/// Every scratch region acquired during a call is released before it returns.
#[derive(Clone, Debug, Default)]
pub struct ArenaBlake2sHasher {
    arena: Rc<Arena>,
}

impl ArenaBlake2sHasher {
    /// Creates a provider working in `arena`.
    pub fn new(arena: Rc<Arena>) -> Self {
        Self { arena }
    }

    /// The arena used for scratch space.
    pub fn arena(&self) -> &Rc<Arena> {
        &self.arena
    }

    /// Copies leaves from elsewhere into a scratch region of our arena.
    fn copy_in<L: LeafVector>(&self, leaves: &L) -> MerkleResult<Scratch<'_>> {
        let bytes = leaves.to_bytes(0, leaves.len())?;
        let scratch = self.arena.scratch(bytes.len())?;
        scratch.write(0, &bytes)?;
        Ok(scratch)
    }

    /// Returns our arena region holding `leaves` if they are already there.
    fn local_region<L: LeafVector>(&self, leaves: &L) -> Option<ArenaRegion> {
        match leaves.arena_view() {
            Some((owner, region)) if ptr::eq(owner, &*self.arena) => Some(region),
            _ => None,
        }
    }
}

impl HashProvider for ArenaBlake2sHasher {
    type Hash = [u8; DIGEST_SIZE];

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::ArenaBlake2s256
    }

    fn digest(&self, value: &[u8]) -> Self::Hash {
        Blake2s256::digest(value).into()
    }

    fn merge(&self, a: &[u8], b: &[u8]) -> Self::Hash {
        let mut state = Blake2s256::new();
        state.update(a);
        state.update(b);
        state.finalize().into()
    }

    fn hash_pairs(&self, values: &[u8], pair_width: usize, out: &mut [u8]) {
        let mut state = Blake2s256::new();
        for (pair, dst) in values
            .chunks_exact(pair_width)
            .zip(out.chunks_exact_mut(DIGEST_SIZE))
        {
            state.update(pair);
            dst.copy_from_slice(&state.finalize_reset());
        }
    }

    fn merge_node_rows(&self, nodes: &mut [u8], parent_count: usize) {
        let mut state = Blake2s256::new();
        for i in (1..parent_count).rev() {
            let src = 2 * i * DIGEST_SIZE;
            state.update(&nodes[src..src + 2 * DIGEST_SIZE]);
            let h = state.finalize_reset();
            nodes[i * DIGEST_SIZE..(i + 1) * DIGEST_SIZE].copy_from_slice(&h);
        }
    }

    fn build_merkle_nodes<L: LeafVector>(
        &self,
        depth: u32,
        leaves: &L,
    ) -> MerkleResult<NodeBuffer<Self::Hash>> {
        let layout = NodeLayout::new(depth, leaves.len())?;
        let node_scratch = self.arena.scratch(layout.byte_len(DIGEST_SIZE)?)?;

        let (leaf_region, copied) = match self.local_region(leaves) {
            Some(region) => (region, None),
            None => {
                let scratch = self.copy_in(leaves)?;
                (scratch.region(), Some(scratch))
            }
        };
        trace!(
            in_place = %copied.is_none(),
            pages = %self.arena.pages(),
            "building nodes in arena"
        );

        let element_size = leaves.element_size();
        self.arena
            .with_split(leaf_region, node_scratch.region(), |leaf_bytes, node_bytes| {
                nodes::fill_nodes(self, &layout, leaf_bytes, element_size, node_bytes)
            })?;

        let slab = node_scratch.read()?;
        NodeBuffer::from_bytes(depth, &slab)
    }
}
