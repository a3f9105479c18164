use thiserror::Error;

/// Errors from arena allocation and access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// Zero-length allocations are not handed out.
    #[error("zero-sized allocation")]
    ZeroSized,

    /// Growing the memory would exceed the configured page limit.
    #[error("out of memory (requested {requested} bytes, limit {max_pages} pages)")]
    OutOfMemory {
        /// Size of the failed request in bytes.
        requested: usize,

        /// Page cap of the arena.
        max_pages: usize,
    },

    /// The region is not (contained in) a live allocation.
    #[error("region at {offset} of {len} bytes is not live")]
    UnknownRegion {
        /// Start offset of the region.
        offset: usize,

        /// Length of the region.
        len: usize,
    },

    /// An access went past the end of its region.
    #[error("access of {len} bytes at {at} exceeds region of {region_len} bytes")]
    OutOfBounds {
        /// Offset within the region.
        at: usize,

        /// Bytes accessed.
        len: usize,

        /// Length of the region.
        region_len: usize,
    },

    /// Two regions that must be disjoint overlap.
    #[error("regions overlap")]
    Overlap,

    /// Memory is already borrowed by an in-progress access.
    #[error("arena memory is busy")]
    Busy,
}
