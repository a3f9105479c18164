//! Error type for tree construction and proof generation.

use strata_arena::ArenaError;
use thiserror::Error;

/// Errors raised while building trees and generating proofs.
///
/// Verification never returns these, it answers `false` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// Tree construction was given no leaves.
    #[error("no leaves provided")]
    InvalidInput,

    /// Index outside of the leaf range.
    #[error("invalid index: {0}")]
    InvalidIndex(usize),

    /// The same index was requested more than once in a batch.
    #[error("repeating index detected: {0}")]
    DuplicateIndex(usize),

    /// A batch proof was requested for an empty index set.
    #[error("no indexes requested")]
    NoIndexes,

    /// Unknown algorithm name, or no such variant of a known algorithm.
    #[error("invalid hash algorithm: {0}")]
    InvalidHashAlgorithm(String),

    /// Raw value buffer is not a whole number of elements.
    #[error("value buffer of {len} bytes cannot hold elements of {element_size} bytes")]
    ValueSizeMismatch {
        /// Length of the offending buffer.
        len: usize,

        /// Declared element size.
        element_size: usize,
    },

    /// Tree would need more levels than the index type can address.
    #[error("tree depth {0} too large")]
    DepthTooLarge(u32),

    /// Scratch or leaf storage in an arena failed.
    #[error("arena: {0}")]
    Arena(#[from] ArenaError),
}

/// Wrapper result type.
pub type MerkleResult<T> = Result<T, MerkleError>;
