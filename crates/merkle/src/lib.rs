//! Binary Merkle trees with single and compressed batch membership proofs.
//!
//! Trees are built over fixed-size leaf records with a pluggable
//! [`HashProvider`].  Leaves can live in an owned buffer ([`OwnedLeaves`]) or in
//! a linear memory arena ([`ArenaLeaves`]).
//!
//! ```rust,ignore
//! use strata_batch_merkle::prelude::*;
//!
//! let hasher = Sha256Hasher::new();
//! let tree = MerkleTree::from_values(leaves, &hasher)?;
//! let proof = tree.prove_batch(&[0, 1, 6])?;
//! assert!(verify_batch(tree.root(), &[0, 1, 6], &proof, &hasher));
//! ```
//!
//! # Modules
//!
//! - `hasher`: digest values and the [`HashProvider`] trait
//! - `algorithm`: runtime algorithm selection with [`create_hash`]
//! - `leaves`: the [`LeafVector`] storage backends
//! - `nodes`: node buffer layout shared by every provider
//! - `tree`: [`MerkleTree`] construction and proof generation
//! - `proof`: proof types and the [`verify`] / [`verify_batch`] functions
//! - `codec`: binary encoding of proofs

// stupid linter issue
#[cfg(test)]
use criterion as _;
#[cfg(all(test, not(feature = "serde")))]
use serde_json as _;

pub mod algorithm;
mod arena_hasher;
pub mod codec;
pub mod error;
pub mod hasher;
pub mod leaves;
pub mod nodes;
pub mod proof;
pub mod tree;

pub use algorithm::{AnyHasher, HashAlgorithm, HashOptions, create_hash, hash_function};
pub use arena_hasher::ArenaBlake2sHasher;
pub use error::{MerkleError, MerkleResult};
pub use hasher::{Blake2sHasher, HashProvider, MerkleHash, Sha256Hasher};
pub use leaves::{ArenaLeaves, LeafVector, OwnedLeaves};
pub use nodes::NodeBuffer;
pub use proof::{BatchMerkleProof, BatchPath, MerkleProof, verify, verify_batch};
pub use tree::MerkleTree;

/// A convenient prelude bringing common types into scope.
pub mod prelude {
    pub use crate::algorithm::{HashAlgorithm, HashOptions, create_hash};
    pub use crate::hasher::{Blake2sHasher, HashProvider, MerkleHash, Sha256Hasher};
    pub use crate::leaves::{LeafVector, OwnedLeaves};
    pub use crate::proof::{BatchMerkleProof, MerkleProof, verify, verify_batch};
    pub use crate::tree::MerkleTree;
}
