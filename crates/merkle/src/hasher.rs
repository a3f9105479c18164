//! Hash types and the pluggable hash provider.

use std::fmt;
use std::marker::PhantomData;

use blake2::Blake2s256;
use digest::Digest;
use sha2::Sha256;

use crate::algorithm::HashAlgorithm;
use crate::error::MerkleResult;
use crate::leaves::LeafVector;
use crate::nodes::{self, NodeBuffer};

/// Fixed-size digest value stored in tree nodes.
pub trait MerkleHash: Copy + Clone + Eq + fmt::Debug + AsRef<[u8]> + 'static {
    /// Length of the hash in bytes.
    const HASH_LEN: usize;

    /// Returns a zero hash.
    fn zero() -> Self;

    /// Checks if two hashes are equal, attempting to do it in constant time.
    fn eq_ct(a: &Self, b: &Self) -> bool;

    /// Returns if a hash is the zero hash.
    fn is_zero(h: &Self) -> bool {
        Self::eq_ct(h, &Self::zero())
    }

    /// Reads a hash from a slice of exactly `HASH_LEN` bytes.
    fn from_slice(buf: &[u8]) -> Option<Self>;
}

impl<const LEN: usize> MerkleHash for [u8; LEN] {
    const HASH_LEN: usize = LEN;

    fn zero() -> Self {
        [0; LEN]
    }

    fn eq_ct(a: &Self, b: &Self) -> bool {
        // Accumulate instead of short-circuiting.  This is only a best effort,
        // the compiler is free to undo it.
        let mut acc = 0u8;
        for i in 0..LEN {
            acc |= a[i] ^ b[i];
        }

        acc == 0
    }

    fn from_slice(buf: &[u8]) -> Option<Self> {
        buf.try_into().ok()
    }
}

/// Capability that hashes leaves and internal nodes of a tree.
///
/// `merge(a, b)` must equal `digest(a || b)`.  Inputs are plain byte slices
/// because leaf records do not have to be digest-sized.
///
/// The bulk methods have defaults built on `merge`.  Providers may override
/// them with fused routines, but must produce identical bytes.
pub trait HashProvider {
    /// Digest type produced by this provider.
    type Hash: MerkleHash;

    /// Identifier of the algorithm.
    fn algorithm(&self) -> HashAlgorithm;

    /// Digest size in bytes.
    fn digest_size(&self) -> usize {
        <Self::Hash as MerkleHash>::HASH_LEN
    }

    /// Hashes an arbitrary byte string.
    fn digest(&self, value: &[u8]) -> Self::Hash;

    /// Hashes the concatenation of two values.
    fn merge(&self, a: &[u8], b: &[u8]) -> Self::Hash;

    /// Hashes every `pair_width`-byte chunk of `values`, writing one digest
    /// per chunk into `out`.  Each chunk is split in half and merged.
    fn hash_pairs(&self, values: &[u8], pair_width: usize, out: &mut [u8]) {
        let half = pair_width / 2;
        let outputs = out.chunks_exact_mut(self.digest_size());
        for (pair, dst) in values.chunks_exact(pair_width).zip(outputs) {
            let h = self.merge(&pair[..half], &pair[half..]);
            dst.copy_from_slice(h.as_ref());
        }
    }

    /// Computes slots `parent_count - 1` down to `1` of a heap-ordered node
    /// slab from their children.
    fn merge_node_rows(&self, nodes: &mut [u8], parent_count: usize) {
        let n = self.digest_size();
        for i in (1..parent_count).rev() {
            let src = 2 * i * n;
            let h = self.merge(&nodes[src..src + n], &nodes[src + n..src + 2 * n]);
            nodes[i * n..(i + 1) * n].copy_from_slice(h.as_ref());
        }
    }

    /// Builds the node buffer of a tree of `depth` over `leaves`.
    fn build_merkle_nodes<L: LeafVector>(
        &self,
        depth: u32,
        leaves: &L,
    ) -> MerkleResult<NodeBuffer<Self::Hash>> {
        nodes::build_nodes(self, depth, leaves)
    }
}

/// Digest implementations usable by [`DigestHasher`].
pub trait NamedDigest: Digest {
    /// Algorithm this digest implements.
    const ALGORITHM: HashAlgorithm;
}

impl NamedDigest for Sha256 {
    const ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;
}

impl NamedDigest for Blake2s256 {
    const ALGORITHM: HashAlgorithm = HashAlgorithm::Blake2s256;
}

/// Hash provider for an arbitrary [`Digest`] impl.
pub struct DigestHasher<D, const N: usize>(PhantomData<D>);

impl<D, const N: usize> DigestHasher<D, N> {
    /// Creates the provider.
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<D, const N: usize> Default for DigestHasher<D, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, const N: usize> Clone for DigestHasher<D, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D, const N: usize> Copy for DigestHasher<D, N> {}

impl<D, const N: usize> fmt::Debug for DigestHasher<D, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestHasher<{}>", N)
    }
}

impl<D: NamedDigest, const N: usize> HashProvider for DigestHasher<D, N> {
    type Hash = [u8; N];

    fn algorithm(&self) -> HashAlgorithm {
        D::ALGORITHM
    }

    fn digest(&self, value: &[u8]) -> Self::Hash {
        D::digest(value)
            .as_slice()
            .try_into()
            .expect("digest output length mismatch")
    }

    fn merge(&self, a: &[u8], b: &[u8]) -> Self::Hash {
        let mut context = D::new();
        context.update(a);
        context.update(b);

        context
            .finalize()
            .as_slice()
            .try_into()
            .expect("digest output length mismatch")
    }

    fn hash_pairs(&self, values: &[u8], pair_width: usize, out: &mut [u8]) {
        // A pair is already laid out as `a || b`, so hash it in one go.
        for (pair, dst) in values.chunks_exact(pair_width).zip(out.chunks_exact_mut(N)) {
            dst.copy_from_slice(&D::digest(pair));
        }
    }
}

/// SHA-256 hash provider.
pub type Sha256Hasher = DigestHasher<Sha256, 32>;

/// BLAKE2s-256 hash provider.
pub type Blake2sHasher = DigestHasher<Blake2s256, 32>;
