//! Binary Merkle tree over fixed-size leaf records.
//!
//! The tree keeps its leaves and a heap-ordered node buffer, see
//! [`nodes`](crate::nodes) for the layout and padding rules.  It never changes
//! after construction.

use tracing::*;

use crate::algorithm::HashAlgorithm;
use crate::error::{MerkleError, MerkleResult};
use crate::hasher::{HashProvider, MerkleHash};
use crate::leaves::{LeafVector, OwnedLeaves};
use crate::nodes::{NodeBuffer, NodeLayout};
use crate::proof::{
    self, BatchMerkleProof, BatchPath, MerkleProof, map_indexes, normalize_indexes,
};

/// Immutable binary Merkle tree.
#[derive(Clone, Debug)]
pub struct MerkleTree<H, L = OwnedLeaves> {
    nodes: NodeBuffer<H>,
    leaves: L,
    algorithm: HashAlgorithm,
}

impl<H: MerkleHash> MerkleTree<H, OwnedLeaves> {
    /// Builds a tree from a list of equal-sized records.
    pub fn from_values<P, V>(values: impl IntoIterator<Item = V>, hasher: &P) -> MerkleResult<Self>
    where
        P: HashProvider<Hash = H>,
        V: AsRef<[u8]>,
    {
        Self::create(OwnedLeaves::from_values(values)?, hasher)
    }
}

impl<H: MerkleHash, L: LeafVector> MerkleTree<H, L> {
    /// Builds a tree over `leaves`.
    pub fn create<P>(leaves: L, hasher: &P) -> MerkleResult<Self>
    where
        P: HashProvider<Hash = H>,
    {
        if leaves.is_empty() {
            return Err(MerkleError::InvalidInput);
        }

        let depth = NodeLayout::depth_for(leaves.len());
        let nodes = hasher.build_merkle_nodes(depth, &leaves)?;
        debug!(
            %depth,
            leaves = %leaves.len(),
            algorithm = %hasher.algorithm(),
            "built merkle tree"
        );

        Ok(Self {
            nodes,
            leaves,
            algorithm: hasher.algorithm(),
        })
    }

    /// Async counterpart of [`MerkleTree::create`].
    ///
    /// Construction does not yield yet, this completes in a single poll.
    pub async fn create_async<P>(leaves: L, hasher: &P) -> MerkleResult<Self>
    where
        P: HashProvider<Hash = H>,
    {
        Self::create(leaves, hasher)
    }

    /// Number of levels between the root and the leaf-parent row.
    pub fn depth(&self) -> u32 {
        self.nodes.depth()
    }

    /// Size of a node in bytes.
    pub fn node_size(&self) -> usize {
        H::HASH_LEN
    }

    /// Algorithm the tree was built with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The root.
    pub fn root(&self) -> &H {
        self.nodes.root()
    }

    /// The internal node buffer.
    pub fn nodes(&self) -> &NodeBuffer<H> {
        &self.nodes
    }

    /// The leaf records.
    pub fn leaves(&self) -> &L {
        &self.leaves
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Returns a copy of leaf `index`.
    pub fn get_leaf(&self, index: usize) -> MerkleResult<Vec<u8>> {
        self.leaves.leaf(index)
    }

    /// Leaf `index`, or the zero digest for the missing partner of an odd
    /// tail leaf.
    fn leaf_or_zero(&self, index: usize) -> MerkleResult<Vec<u8>> {
        if index < self.leaves.len() {
            self.leaves.leaf(index)
        } else {
            Ok(H::zero().as_ref().to_vec())
        }
    }

    fn node(&self, index: usize) -> H {
        self.nodes.as_slice()[index]
    }

    /// Generates a proof for leaf `index`.
    pub fn prove(&self, index: usize) -> MerkleResult<MerkleProof<H>> {
        if index >= self.leaves.len() {
            return Err(MerkleError::InvalidIndex(index));
        }

        let leaf = self.leaves.leaf(index)?;
        let sibling = self.leaf_or_zero(index ^ 1)?;

        let mut cohashes = Vec::with_capacity(self.depth() as usize - 1);
        let mut index = (index + self.nodes.node_count()) >> 1;
        while index > 1 {
            cohashes.push(self.node(index ^ 1));
            index >>= 1;
        }

        Ok(MerkleProof::new(leaf, sibling, cohashes))
    }

    /// Generates a compressed proof for the leaves at `indexes`.
    ///
    /// Leaves are placed into the proof's values in the order they were
    /// requested.  Every internal node that a verifier can compute from other
    /// parts of the proof is left out.
    pub fn prove_batch(&self, indexes: &[usize]) -> MerkleResult<BatchMerkleProof<H>> {
        if indexes.is_empty() {
            return Err(MerkleError::NoIndexes);
        }

        let index_map = map_indexes(indexes, self.leaves.len() - 1)?;
        let pairs = normalize_indexes(indexes);
        let node_count = self.nodes.node_count();

        let mut values = vec![Vec::new(); indexes.len()];
        let mut paths = Vec::with_capacity(pairs.len());
        let mut level = Vec::with_capacity(pairs.len());
        for &index in &pairs {
            let v1 = self.leaf_or_zero(index)?;
            let v2 = self.leaf_or_zero(index + 1)?;

            let sibling_leaf = match (index_map.get(&index), index_map.get(&(index + 1))) {
                (Some(&p1), Some(&p2)) => {
                    values[p1] = v1;
                    values[p2] = v2;
                    None
                }
                (Some(&p1), None) => {
                    values[p1] = v1;
                    Some(v2)
                }
                (None, Some(&p2)) => {
                    values[p2] = v2;
                    Some(v1)
                }
                // Every pair comes from at least one requested index.
                (None, None) => return Err(MerkleError::InvalidIndex(index)),
            };

            paths.push(BatchPath::new(sibling_leaf, Vec::new()));
            level.push((index + node_count) >> 1);
        }

        for _ in 1..self.depth() {
            let mut next = Vec::with_capacity(level.len());
            let mut i = 0;
            while i < level.len() {
                let sibling_index = level[i] ^ 1;
                if level.get(i + 1) == Some(&sibling_index) {
                    i += 1;
                } else {
                    paths[i].cohashes.push(self.node(sibling_index));
                }

                next.push(sibling_index >> 1);
                i += 1;
            }
            level = next;
        }

        trace!(
            requested = %indexes.len(),
            pairs = %pairs.len(),
            nodes = %paths.iter().map(BatchPath::len).sum::<usize>(),
            "generated batch proof"
        );

        Ok(BatchMerkleProof::new(values, paths, self.depth()))
    }

    /// Checks a single-leaf proof against this tree's root.
    pub fn verify_proof<P>(&self, index: usize, proof: &MerkleProof<H>, hasher: &P) -> bool
    where
        P: HashProvider<Hash = H>,
    {
        proof::verify(self.root(), index, proof, hasher)
    }

    /// Checks a batch proof against this tree's root.
    pub fn verify_batch_proof<P>(
        &self,
        indexes: &[usize],
        proof: &BatchMerkleProof<H>,
        hasher: &P,
    ) -> bool
    where
        P: HashProvider<Hash = H>,
    {
        proof::verify_batch(self.root(), indexes, proof, hasher)
    }
}
