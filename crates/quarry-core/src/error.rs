//! Failure taxonomy shared by every allocator in the crate.

use thiserror::Error;

/// Recoverable and caller-error conditions surfaced by allocator operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No block or slot large enough for the request. The caller may grow
    /// the allocator via `extend` or abort the requesting operation.
    #[error("no block large enough for {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Zero or undersized capacity, or an otherwise unusable configuration.
    /// Raised at construction time, never later.
    #[error("invalid allocator configuration: {0}")]
    InvalidConfig(&'static str),

    /// The handle does not name a live allocation: it was already freed,
    /// its slot was recycled, or it belongs to a different allocator.
    #[error("stale or unknown allocation handle")]
    StaleHandle,
}

/// A broken structural invariant found by [`TreeHeap::audit`].
///
/// [`TreeHeap::audit`]: crate::heap::TreeHeap::audit
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// No block starts at an address the boundary-tag walk arrived at.
    #[error("no block found at {addr:#x}")]
    Hole { addr: usize },

    /// Blocks in a region do not tile its capacity exactly.
    #[error("region {region} blocks cover {covered} of {capacity} bytes")]
    Coverage {
        region: u32,
        covered: usize,
        capacity: usize,
    },

    /// A block's recorded `prev_size` disagrees with its left neighbor.
    #[error("block at {addr:#x} records prev_size {recorded}, left neighbor is {actual}")]
    BoundaryTag {
        addr: usize,
        recorded: usize,
        actual: usize,
    },

    /// Two physically adjacent blocks are both free.
    #[error("adjacent blocks at {left:#x} and {right:#x} are both free")]
    AdjacentFree { left: usize, right: usize },

    /// A `first`/`last` flag is set on the wrong block or missing.
    #[error("first/last flag wrong on block at {addr:#x}")]
    EdgeFlag { addr: usize },

    /// The red-black root is red.
    #[error("free-index root is red")]
    RedRoot,

    /// A red node has a red child.
    #[error("red block at {addr:#x} has a red child")]
    RedRed { addr: usize },

    /// Two root-to-leaf paths pass different numbers of black nodes.
    #[error("black-height mismatch under block at {addr:#x}: {left} vs {right}")]
    BlackHeight {
        addr: usize,
        left: usize,
        right: usize,
    },

    /// Keys in the free index are not ordered by block size.
    #[error("free index misordered at block {addr:#x}")]
    Misordered { addr: usize },

    /// A child's parent link does not point back at its parent.
    #[error("broken parent link at block {addr:#x}")]
    BadParentLink { addr: usize },

    /// A free block is not present in the free index, or vice versa.
    #[error("free block at {addr:#x} missing from the free index")]
    Unindexed { addr: usize },

    /// Recorded byte counters drifted from the measured totals.
    #[error("accounting drift for {counter}: recorded {recorded}, measured {measured}")]
    Accounting {
        counter: &'static str,
        recorded: usize,
        measured: usize,
    },
}
