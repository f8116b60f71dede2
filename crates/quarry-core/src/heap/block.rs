//! Block metadata for the tree heap.
//!
//! A block is a span of one region's byte page. The first [`HEADER_SIZE`]
//! bytes model the boundary-tag header; `size` always counts the full
//! extent including the header. Free blocks carry their red-black node
//! fields in the metadata enum instead of overlaying them on payload
//! bytes, and colour is an explicit field rather than a pointer bit.

use serde::Serialize;

/// Alignment every payload size is rounded up to.
pub const ALIGN: usize = 8;

/// Modeled boundary-tag header: two size words.
pub const HEADER_SIZE: usize = 16;

/// Smallest legal payload. A free block must be able to carry three
/// link words, which bounds how small a split remainder may be.
pub const MIN_PAYLOAD: usize = 24;

/// Smallest legal block extent.
pub const MIN_BLOCK: usize = HEADER_SIZE + MIN_PAYLOAD;

/// Handle to a live allocation in a [`TreeHeap`].
///
/// Carries the arena index plus the slot generation observed when the
/// block was handed out, so freed or recycled handles are rejected
/// instead of aliasing a later allocation.
///
/// [`TreeHeap`]: crate::heap::TreeHeap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Node colour in the free-block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
}

/// Red-black linkage of a free block. Links are arena indices.
#[derive(Debug, Clone, Copy)]
pub struct RbNode {
    pub parent: Option<u32>,
    pub left: Option<u32>,
    pub right: Option<u32>,
    pub color: Color,
}

impl RbNode {
    /// A detached red leaf, ready for insertion.
    pub fn detached() -> Self {
        Self {
            parent: None,
            left: None,
            right: None,
            color: Color::Red,
        }
    }
}

/// Whether a block is handed out or sitting in the free index.
#[derive(Debug, Clone, Copy)]
pub enum BlockState {
    Used,
    Free(RbNode),
}

/// One block of a region's byte page.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    /// Region page this block lives in.
    pub region: u32,
    /// Start of the block within the page.
    pub offset: usize,
    /// Full extent including the header.
    pub size: usize,
    /// Full extent of the left physical neighbor; 0 on the first block.
    pub prev_size: usize,
    /// First block of its region.
    pub first: bool,
    /// Last block of its region.
    pub last: bool,
    pub state: BlockState,
}

impl Block {
    pub fn is_free(&self) -> bool {
        matches!(self.state, BlockState::Free(_))
    }

    /// Bytes available to the caller.
    pub fn usable(&self) -> usize {
        self.size - HEADER_SIZE
    }
}

/// Arena cell: a block, or a vacant cell threaded on the slot free list.
#[derive(Debug, Clone, Copy)]
pub enum BlockEntry {
    Occupied(Block),
    Vacant { next_free: Option<u32> },
}

/// Arena slot with the generation counter that outlives its occupants.
#[derive(Debug, Clone, Copy)]
pub struct BlockSlot {
    pub generation: u32,
    pub entry: BlockEntry,
}

/// Rounds a payload request up to [`ALIGN`].
pub fn align_up(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}
