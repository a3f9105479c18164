//! Hash algorithm selection.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use strata_arena::Arena;

use crate::arena_hasher::ArenaBlake2sHasher;
use crate::error::{MerkleError, MerkleResult};
use crate::hasher::{Blake2sHasher, HashProvider, Sha256Hasher};
use crate::leaves::LeafVector;
use crate::nodes::NodeBuffer;

/// Digest size shared by every supported algorithm.
pub const DIGEST_SIZE: usize = 32;

/// Algorithms that can be used to hash tree nodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HashAlgorithm {
    /// SHA-256.
    #[cfg_attr(feature = "serde", serde(rename = "sha256"))]
    Sha256,

    /// BLAKE2s with 256-bit output.
    #[cfg_attr(feature = "serde", serde(rename = "blake2s256"))]
    Blake2s256,

    /// BLAKE2s-256 computed in bulk inside a linear memory arena.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "arenaBlake2s256", alias = "wasmBlake2s256")
    )]
    ArenaBlake2s256,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 3] = [Self::Sha256, Self::Blake2s256, Self::ArenaBlake2s256];

    /// Canonical name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake2s256 => "blake2s256",
            Self::ArenaBlake2s256 => "arenaBlake2s256",
        }
    }

    /// Digest size in bytes.
    pub fn digest_size(&self) -> usize {
        DIGEST_SIZE
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = MerkleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "blake2s256" => Ok(Self::Blake2s256),
            "arenaBlake2s256" | "wasmBlake2s256" => Ok(Self::ArenaBlake2s256),
            _ => Err(MerkleError::InvalidHashAlgorithm(s.to_owned())),
        }
    }
}

/// Options for constructing a hash provider.
#[derive(Clone, Debug, Default)]
pub struct HashOptions {
    accelerated: bool,
    arena: Option<Rc<Arena>>,
}

impl HashOptions {
    /// Plain software hashing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the arena-accelerated variant, with a private arena.
    pub fn accelerated(mut self) -> Self {
        self.accelerated = true;
        self
    }

    /// Requests the arena-accelerated variant running in `arena`.
    ///
    /// Leaves already stored in the same arena are hashed without copying.
    pub fn with_arena(mut self, arena: Rc<Arena>) -> Self {
        self.accelerated = true;
        self.arena = Some(arena);
        self
    }

    /// Returns if acceleration was requested.
    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }
}

/// Creates a hash provider for `algorithm`.
pub fn create_hash(algorithm: HashAlgorithm, options: &HashOptions) -> MerkleResult<AnyHasher> {
    let arena = || options.arena.clone().unwrap_or_default();
    match (algorithm, options.accelerated) {
        (HashAlgorithm::Sha256, false) => Ok(AnyHasher::Sha256(Sha256Hasher::new())),
        (HashAlgorithm::Sha256, true) => Err(MerkleError::InvalidHashAlgorithm(format!(
            "no accelerated variant of {algorithm}"
        ))),
        (HashAlgorithm::Blake2s256, false) => Ok(AnyHasher::Blake2s256(Blake2sHasher::new())),
        (HashAlgorithm::Blake2s256, true) | (HashAlgorithm::ArenaBlake2s256, _) => Ok(
            AnyHasher::ArenaBlake2s256(ArenaBlake2sHasher::new(arena())),
        ),
    }
}

/// Hash provider chosen at runtime.
#[derive(Clone, Debug)]
pub enum AnyHasher {
    /// SHA-256.
    Sha256(Sha256Hasher),

    /// BLAKE2s-256.
    Blake2s256(Blake2sHasher),

    /// Arena-accelerated BLAKE2s-256.
    ArenaBlake2s256(ArenaBlake2sHasher),
}

impl HashProvider for AnyHasher {
    type Hash = [u8; DIGEST_SIZE];

    fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(h) => h.algorithm(),
            Self::Blake2s256(h) => h.algorithm(),
            Self::ArenaBlake2s256(h) => h.algorithm(),
        }
    }

    fn digest(&self, value: &[u8]) -> Self::Hash {
        match self {
            Self::Sha256(h) => h.digest(value),
            Self::Blake2s256(h) => h.digest(value),
            Self::ArenaBlake2s256(h) => h.digest(value),
        }
    }

    fn merge(&self, a: &[u8], b: &[u8]) -> Self::Hash {
        match self {
            Self::Sha256(h) => h.merge(a, b),
            Self::Blake2s256(h) => h.merge(a, b),
            Self::ArenaBlake2s256(h) => h.merge(a, b),
        }
    }

    fn hash_pairs(&self, values: &[u8], pair_width: usize, out: &mut [u8]) {
        match self {
            Self::Sha256(h) => h.hash_pairs(values, pair_width, out),
            Self::Blake2s256(h) => h.hash_pairs(values, pair_width, out),
            Self::ArenaBlake2s256(h) => h.hash_pairs(values, pair_width, out),
        }
    }

    fn merge_node_rows(&self, nodes: &mut [u8], parent_count: usize) {
        match self {
            Self::Sha256(h) => h.merge_node_rows(nodes, parent_count),
            Self::Blake2s256(h) => h.merge_node_rows(nodes, parent_count),
            Self::ArenaBlake2s256(h) => h.merge_node_rows(nodes, parent_count),
        }
    }

    fn build_merkle_nodes<L: LeafVector>(
        &self,
        depth: u32,
        leaves: &L,
    ) -> MerkleResult<NodeBuffer<Self::Hash>> {
        match self {
            Self::Sha256(h) => h.build_merkle_nodes(depth, leaves),
            Self::Blake2s256(h) => h.build_merkle_nodes(depth, leaves),
            Self::ArenaBlake2s256(h) => h.build_merkle_nodes(depth, leaves),
        }
    }
}

/// Digests one value, or merges two.
pub type HashFunction = Box<dyn Fn(&[u8], Option<&[u8]>) -> [u8; DIGEST_SIZE]>;

/// Returns a plain hash function for `algorithm`.
pub fn hash_function(algorithm: HashAlgorithm) -> MerkleResult<HashFunction> {
    let hasher = create_hash(algorithm, &HashOptions::new())?;
    Ok(Box::new(move |a, b| match b {
        Some(b) => hasher.merge(a, b),
        None => hasher.digest(a),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(alg.name().parse::<HashAlgorithm>().unwrap(), alg);
            assert_eq!(alg.to_string(), alg.name());
            assert_eq!(alg.digest_size(), 32);
        }
        assert_eq!(
            "wasmBlake2s256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::ArenaBlake2s256
        );
    }

    #[test]
    fn unknown_algorithm() {
        assert_eq!(
            "md5".parse::<HashAlgorithm>(),
            Err(MerkleError::InvalidHashAlgorithm("md5".to_owned()))
        );
    }

    #[test]
    fn no_accelerated_sha256() {
        let err = create_hash(HashAlgorithm::Sha256, &HashOptions::new().accelerated()).unwrap_err();
        assert!(matches!(err, MerkleError::InvalidHashAlgorithm(_)));
    }

    #[test]
    fn accelerated_blake2s_selects_arena_variant() {
        let h = create_hash(HashAlgorithm::Blake2s256, &HashOptions::new().accelerated()).unwrap();
        assert_eq!(h.algorithm(), HashAlgorithm::ArenaBlake2s256);

        let h = create_hash(HashAlgorithm::Blake2s256, &HashOptions::new()).unwrap();
        assert_eq!(h.algorithm(), HashAlgorithm::Blake2s256);
    }

    #[test]
    fn hash_function_digests_and_merges() {
        let f = hash_function(HashAlgorithm::Sha256).unwrap();
        assert_eq!(f(b"abcd", None), f(b"ab", Some(b"cd")));
        assert_eq!(f(b"abc", None), Sha256Hasher::new().digest(b"abc"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_names() {
        let s = serde_json::to_string(&HashAlgorithm::Blake2s256).unwrap();
        assert_eq!(s, "\"blake2s256\"");
        let alg: HashAlgorithm = serde_json::from_str("\"wasmBlake2s256\"").unwrap();
        assert_eq!(alg, HashAlgorithm::ArenaBlake2s256);
    }
}
