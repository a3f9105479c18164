//! Membership proofs and their verification.
//!
//! Verification only needs a [`HashProvider`] and never touches a tree.  Both
//! [`verify`] and [`verify_batch`] are total: any malformed or adversarial
//! proof produces `false`, never an error or a panic.

use std::collections::{BTreeMap, HashMap};

use tracing::*;

use crate::error::{MerkleError, MerkleResult};
use crate::hasher::{HashProvider, MerkleHash};

/// Proof for a single leaf.
///
/// Laid out as a flat list this is `[leaf, sibling, cohash...]`, see
/// [`MerkleProof::entries`].  The sibling is the raw neighbouring leaf record,
/// or the zero digest if the leaf is the unpaired last one.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleProof<H> {
    pub(crate) leaf: Vec<u8>,
    pub(crate) sibling: Vec<u8>,
    pub(crate) cohashes: Vec<H>,
}

impl<H: MerkleHash> MerkleProof<H> {
    /// Constructs a proof from its parts.
    pub fn new(leaf: Vec<u8>, sibling: Vec<u8>, cohashes: Vec<H>) -> Self {
        Self {
            leaf,
            sibling,
            cohashes,
        }
    }

    /// Rebuilds a proof from its flat list form.
    ///
    /// Returns `None` if there are fewer than two entries or if any entry past
    /// the first two is not digest-sized.
    pub fn from_entries(entries: &[Vec<u8>]) -> Option<Self> {
        let (leaf, rest) = entries.split_first()?;
        let (sibling, rest) = rest.split_first()?;
        let cohashes = rest
            .iter()
            .map(|e| H::from_slice(e))
            .collect::<Option<Vec<_>>>()?;
        Some(Self::new(leaf.clone(), sibling.clone(), cohashes))
    }

    /// The proven leaf record.
    pub fn leaf(&self) -> &[u8] {
        &self.leaf
    }

    /// The record paired with the proven leaf.
    pub fn sibling(&self) -> &[u8] {
        &self.sibling
    }

    /// Sibling nodes from the leaf-parent row up to just below the root.
    pub fn cohashes(&self) -> &[H] {
        &self.cohashes
    }

    /// Depth of the tree this proof was generated from.
    pub fn depth(&self) -> usize {
        self.cohashes.len() + 1
    }

    /// Flat list form, `[leaf, sibling, cohash...]`.
    pub fn entries(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(self.cohashes.len() + 2);
        out.push(self.leaf.clone());
        out.push(self.sibling.clone());
        out.extend(self.cohashes.iter().map(|h| h.as_ref().to_vec()));
        out
    }
}

/// The proof material for one leaf pair of a batch, `nodes[i]`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchPath<H> {
    /// The leaf of the pair that was not requested, if only one was.
    pub(crate) sibling_leaf: Option<Vec<u8>>,

    /// Sibling nodes this path contributes on the way up.
    pub(crate) cohashes: Vec<H>,
}

impl<H: MerkleHash> BatchPath<H> {
    /// Constructs a path from its parts.
    pub fn new(sibling_leaf: Option<Vec<u8>>, cohashes: Vec<H>) -> Self {
        Self {
            sibling_leaf,
            cohashes,
        }
    }

    /// The unrequested leaf of the pair, if any.
    pub fn sibling_leaf(&self) -> Option<&[u8]> {
        self.sibling_leaf.as_deref()
    }

    /// Sibling nodes consumed by this path.
    pub fn cohashes(&self) -> &[H] {
        &self.cohashes
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cohashes.len() + usize::from(self.sibling_leaf.is_some())
    }

    /// Returns if the path carries nothing, which is the case when both leaves
    /// of the pair were requested and every ancestor is covered by another
    /// path.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat list form, the sibling leaf (if any) followed by the cohashes.
    pub fn entries(&self) -> Vec<Vec<u8>> {
        self.sibling_leaf
            .iter()
            .cloned()
            .chain(self.cohashes.iter().map(|h| h.as_ref().to_vec()))
            .collect()
    }
}

/// Compressed proof for several leaves at once.
///
/// Internal nodes shared between the requested paths are included once, and
/// never at all if they can be computed from other parts of the proof.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchMerkleProof<H> {
    /// Requested leaf records, in request order.
    pub(crate) values: Vec<Vec<u8>>,

    /// One path per distinct leaf pair, in ascending pair order.
    pub(crate) paths: Vec<BatchPath<H>>,

    /// Depth of the source tree.
    pub(crate) depth: u32,
}

impl<H: MerkleHash> BatchMerkleProof<H> {
    /// Constructs a proof from its parts.
    pub fn new(values: Vec<Vec<u8>>, paths: Vec<BatchPath<H>>, depth: u32) -> Self {
        Self {
            values,
            paths,
            depth,
        }
    }

    /// Requested leaf records, in request order.
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// Per-pair proof material.
    pub fn paths(&self) -> &[BatchPath<H>] {
        &self.paths
    }

    /// Depth of the source tree.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Total number of entries across all paths.
    pub fn node_count(&self) -> usize {
        self.paths.iter().map(BatchPath::len).sum()
    }
}

/// Maps each requested index to its position in the request, rejecting
/// duplicates and indexes above `max_valid`.
pub(crate) fn map_indexes(indexes: &[usize], max_valid: usize) -> MerkleResult<HashMap<usize, usize>> {
    let mut map = HashMap::with_capacity(indexes.len());
    for (pos, &index) in indexes.iter().enumerate() {
        if index > max_valid {
            return Err(MerkleError::InvalidIndex(index));
        }
        if map.insert(index, pos).is_some() {
            return Err(MerkleError::DuplicateIndex(index));
        }
    }
    Ok(map)
}

/// Sorts the indexes and collapses each onto the left leaf of its pair.
pub(crate) fn normalize_indexes(indexes: &[usize]) -> Vec<usize> {
    let mut pairs: Vec<usize> = indexes.iter().map(|i| i & !1).collect();
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

/// Checks a single-leaf proof for position `index` against `root`.
pub fn verify<P: HashProvider>(
    root: &P::Hash,
    index: usize,
    proof: &MerkleProof<P::Hash>,
    hasher: &P,
) -> bool {
    let depth = proof.depth();
    if depth >= usize::BITS as usize {
        trace!(%depth, "proof too long");
        return false;
    }
    let leaf_span = 1usize << depth;
    if index >= leaf_span {
        trace!(%index, %depth, "index outside of proof range");
        return false;
    }

    let mut v = if index & 1 == 1 {
        hasher.merge(&proof.sibling, &proof.leaf)
    } else {
        hasher.merge(&proof.leaf, &proof.sibling)
    };

    let mut index = (index + leaf_span) >> 1;
    for co in &proof.cohashes {
        v = if index & 1 == 1 {
            hasher.merge(co.as_ref(), v.as_ref())
        } else {
            hasher.merge(v.as_ref(), co.as_ref())
        };
        index >>= 1;
    }

    <P::Hash as MerkleHash>::eq_ct(root, &v)
}

/// Checks a batch proof for the leaves at `indexes` against `root`.
///
/// `indexes` must be given in the same order as when the proof was generated,
/// since that order determines where each leaf sits in the proof's values.
pub fn verify_batch<P: HashProvider>(
    root: &P::Hash,
    indexes: &[usize],
    proof: &BatchMerkleProof<P::Hash>,
    hasher: &P,
) -> bool {
    match compute_batch_root(indexes, proof, hasher) {
        Some(computed) => <P::Hash as MerkleHash>::eq_ct(root, &computed),
        None => false,
    }
}

/// Reconstructs the root committed to by a batch proof, or `None` if the proof
/// does not fit the requested indexes.
fn compute_batch_root<P: HashProvider>(
    indexes: &[usize],
    proof: &BatchMerkleProof<P::Hash>,
    hasher: &P,
) -> Option<P::Hash> {
    let depth = proof.depth;
    if indexes.is_empty() || depth == 0 || depth >= usize::BITS - 1 {
        trace!(%depth, count = %indexes.len(), "unusable batch request");
        return None;
    }
    let offset = 1usize << depth;

    let index_map = match map_indexes(indexes, offset - 1) {
        Ok(m) => m,
        Err(e) => {
            trace!(%e, "rejecting batch indexes");
            return None;
        }
    };
    if proof.values.len() != indexes.len() {
        trace!(values = %proof.values.len(), "value count mismatch");
        return None;
    }

    let pairs = normalize_indexes(indexes);
    if pairs.len() != proof.paths.len() {
        trace!(pairs = %pairs.len(), paths = %proof.paths.len(), "path count mismatch");
        return None;
    }

    // Computed nodes keyed by their slot in the node buffer.
    let mut computed: BTreeMap<usize, P::Hash> = BTreeMap::new();
    let mut level = Vec::with_capacity(pairs.len());
    for (path, &index) in proof.paths.iter().zip(&pairs) {
        let left = index_map.get(&index).map(|&p| proof.values[p].as_slice());
        let right = index_map.get(&(index + 1)).map(|&p| proof.values[p].as_slice());
        let (v1, v2) = match (left, right, path.sibling_leaf()) {
            (Some(l), Some(r), None) => (l, r),
            (Some(l), None, Some(s)) => (l, s),
            (None, Some(r), Some(s)) => (s, r),
            _ => {
                trace!(%index, "leaf pair does not match proof");
                return None;
            }
        };

        let parent = (offset + index) >> 1;
        computed.insert(parent, hasher.merge(v1, v2));
        level.push(parent);
    }

    let mut pointers = vec![0usize; pairs.len()];
    for _ in 1..depth {
        let mut next = Vec::with_capacity(level.len());
        let mut i = 0;
        while i < level.len() {
            let pos = i;
            let node_index = level[pos];
            let sibling_index = node_index ^ 1;

            let sibling = if level.get(pos + 1) == Some(&sibling_index) {
                i += 1;
                computed.get(&sibling_index).copied()
            } else {
                let ptr = pointers[pos];
                pointers[pos] += 1;
                proof.paths[pos].cohashes.get(ptr).copied()
            };

            let (Some(node), Some(sibling)) = (computed.get(&node_index).copied(), sibling) else {
                trace!(%node_index, "missing node while ascending");
                return None;
            };

            let parent = if node_index & 1 == 1 {
                hasher.merge(sibling.as_ref(), node.as_ref())
            } else {
                hasher.merge(node.as_ref(), sibling.as_ref())
            };
            computed.insert(node_index >> 1, parent);
            next.push(node_index >> 1);
            i += 1;
        }
        level = next;
    }

    let unused = proof
        .paths
        .iter()
        .zip(&pointers)
        .any(|(path, &used)| used != path.cohashes.len());
    if unused {
        trace!("proof carries unused nodes");
        return None;
    }

    computed.get(&1).copied()
}
