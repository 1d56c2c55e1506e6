use std::{mem, ptr::NonNull};

/// Header size of a block in bytes. Payload bytes start right after it.
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Smallest payload the allocator will ever give a block. Splitting stops
/// producing remainders below this, and allocation queries are clamped up to
/// it, so no header on a healthy chain carries a smaller capacity.
pub(crate) const BLOCK_MIN_CAPACITY: usize = 24;

/// This is the structure of a block. The fields of the header are the block's
/// metadata, content is placed after it.
///
/// ```text
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        |
/// |      capacity       |        | -> Header
/// +---------------------+        |
/// |    is_free (1b)     |        |
/// +---------------------+ <------+
/// |       Content       |        |
/// |         ...         |        |
/// |         ...         |        | -> Addressable content
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Blocks form a singly linked chain in heap address order. There is no
/// `prev` link, so nothing ever walks the chain backwards; a block can only
/// be reached by following `next` pointers from the chain's first header.
///
/// The header is `repr(C)` because we write it into raw mapped memory and
/// read it back through casts. Its size is a multiple of the pointer size,
/// so payloads inherit pointer alignment for free.
#[repr(C)]
pub(crate) struct BlockHeader {
    /// Next block of the chain, `None` at the chain's end.
    pub next: Option<NonNull<BlockHeader>>,
    /// Usable payload size in bytes, header overhead excluded.
    pub capacity: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
}

/// Total on-heap footprint of a block with payload capacity `capacity`.
#[inline]
pub(crate) fn size_from_capacity(capacity: usize) -> usize {
    BLOCK_HEADER_SIZE + capacity
}

/// Inverse of [`size_from_capacity`]. Only meaningful for sizes that hold at
/// least a header.
#[inline]
pub(crate) fn capacity_from_size(size: usize) -> usize {
    size - BLOCK_HEADER_SIZE
}

impl BlockHeader {
    /// Writes a free block header at `addr` spanning `size` bytes of memory,
    /// header included, chained to `next`.
    pub(crate) unsafe fn init(
        addr: NonNull<u8>,
        size: usize,
        next: Option<NonNull<BlockHeader>>,
    ) -> NonNull<BlockHeader> {
        let header = addr.cast::<BlockHeader>();

        unsafe {
            header.as_ptr().write(BlockHeader {
                next,
                capacity: capacity_from_size(size),
                is_free: true,
            });
        }

        header
    }

    /// Non-strict first-fit check against the payload capacity.
    #[inline]
    pub(crate) fn fits(&self, query: usize) -> bool {
        self.capacity >= query
    }

    /// Integrity check applied to every header the chain walk visits. The
    /// allocator never creates a block with less than [`BLOCK_MIN_CAPACITY`]
    /// payload bytes, so a smaller value means someone scribbled over the
    /// header.
    #[inline]
    pub(crate) fn is_mangled(&self) -> bool {
        self.capacity < BLOCK_MIN_CAPACITY
    }

    /// First payload byte of the block at `header`.
    #[inline]
    pub(crate) unsafe fn payload(header: NonNull<BlockHeader>) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(header.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE)) }
    }

    /// Recovers the header of the block whose payload starts at `payload`.
    ///
    /// The offset is fixed, so this is only valid for pointers previously
    /// produced by [`BlockHeader::payload`].
    #[inline]
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<BlockHeader> {
        unsafe { NonNull::new_unchecked(payload.as_ptr().sub(BLOCK_HEADER_SIZE)).cast() }
    }
}

/// Address immediately past the payload of `block`. This is where a
/// physically adjacent neighbour would start.
#[inline]
pub(crate) unsafe fn block_after(block: NonNull<BlockHeader>) -> *mut u8 {
    unsafe { BlockHeader::payload(block).as_ptr().add(block.as_ref().capacity) }
}

/// Whether `snd` starts exactly where `fst` ends. Blocks that live in
/// disjoint regions are chained but never contiguous, and such a boundary is
/// a hard barrier to merging.
#[inline]
pub(crate) unsafe fn blocks_contiguous(fst: NonNull<BlockHeader>, snd: NonNull<BlockHeader>) -> bool {
    unsafe { block_after(fst) == snd.as_ptr().cast::<u8>() }
}

unsafe fn mergeable(fst: NonNull<BlockHeader>, snd: NonNull<BlockHeader>) -> bool {
    unsafe { fst.as_ref().is_free && snd.as_ref().is_free && blocks_contiguous(fst, snd) }
}

/// Absorbs the immediate successor of `block` if both are free and
/// physically contiguous. On success the successor's header becomes payload
/// of the merged block and must not be touched again.
///
/// This is the single mutation step behind both the coalescing walk of the
/// search and the forward merge loop of `release`.
pub(crate) unsafe fn try_merge_with_next(mut block: NonNull<BlockHeader>) -> bool {
    unsafe {
        let Some(next) = block.as_ref().next else {
            return false;
        };

        if !mergeable(block, next) {
            return false;
        }

        let absorbed = BLOCK_HEADER_SIZE + next.as_ref().capacity;
        let successor = next.as_ref().next;

        let header = block.as_mut();
        header.capacity += absorbed;
        header.next = successor;

        true
    }
}

unsafe fn splittable(block: NonNull<BlockHeader>, query: usize) -> bool {
    unsafe {
        let header = block.as_ref();
        header.is_free && query + BLOCK_HEADER_SIZE + BLOCK_MIN_CAPACITY <= header.capacity
    }
}

/// Carves the unused tail of `block` into a new free block so it stays
/// available for future requests.
///
/// Splits only when the remainder still holds a header plus
/// [`BLOCK_MIN_CAPACITY`] payload bytes; otherwise the block keeps its full
/// capacity and the caller lives with the internal fragmentation. The new
/// block takes over the original successor, keeping the chain intact.
pub(crate) unsafe fn split_if_too_big(mut block: NonNull<BlockHeader>, query: usize) -> bool {
    unsafe {
        if !splittable(block, query) {
            return false;
        }

        let rest_addr = NonNull::new_unchecked(BlockHeader::payload(block).as_ptr().add(query));
        let rest_size = block.as_ref().capacity - query;
        let rest = BlockHeader::init(rest_addr, rest_size, block.as_ref().next);

        let header = block.as_mut();
        header.capacity = query;
        header.next = Some(rest);

        true
    }
}
