use std::{marker::PhantomData, ptr::NonNull};

use crate::{
    AllocError, CorruptedSnafu,
    block::{
        BLOCK_MIN_CAPACITY, BlockHeader, block_after, size_from_capacity, split_if_too_big,
        try_merge_with_next,
    },
    region::Region,
    search::{SearchOutcome, find_good_or_last},
};

/// Default placement hint for the first region. Low enough to sit well below
/// where common platforms put their own heaps, so the hint is usually
/// honoured; when it is not, the region lands wherever the OS prefers and
/// everything keeps working.
const DEFAULT_BASE: *mut u8 = 0x0404_0000 as *mut u8;

/// A process-private heap: the ordered chain of blocks rooted at its first
/// region.
///
/// Every heap is an independent handle. Two heaps never share blocks, so
/// creating one per test, or several per process, is fine. The price of the
/// raw chain pointers is that a `Heap` is neither `Send` nor `Sync`; all
/// calls against one heap must come from a single logical thread, and there
/// is no internal locking.
///
/// There is no teardown. Dropping the handle abandons the mappings to the
/// process, which matches how the heap is meant to live for the whole
/// process lifetime.
pub struct Heap {
    first: NonNull<BlockHeader>,
}

impl Heap {
    /// Bootstraps a heap with one region of at least `initial` bytes at the
    /// default base address hint. The size is advisory; it gets rounded up
    /// to the page size and to the minimum region size.
    pub fn init(initial: usize) -> Result<Self, AllocError> {
        Self::init_at(DEFAULT_BASE, initial)
    }

    /// Same as [`Heap::init`] with an explicit, page-aligned base address
    /// hint. Useful to root several heaps at predictable places.
    pub fn init_at(base: *mut u8, initial: usize) -> Result<Self, AllocError> {
        let region = Region::acquire(base, initial, false)?;

        Ok(Self {
            first: region.first_block(),
        })
    }

    /// Returns a pointer to at least `query` usable bytes.
    ///
    /// Walks the chain first-fit, coalescing free neighbours on the way.
    /// When the walk finds nothing, the heap grows by a fresh region and the
    /// request is served from there. Errors are worth telling apart:
    /// [`AllocError::Exhausted`] means the platform refused to hand out more
    /// memory, [`AllocError::Corrupted`] means the chain metadata is broken
    /// and the heap is beyond saving. The latter is never papered over by
    /// re-initializing; live allocations would be silently lost.
    pub fn allocate(&mut self, query: usize) -> Result<NonNull<u8>, AllocError> {
        // Tiny queries are served as minimum-capacity blocks. Without this
        // floor a zero-byte allocation would create a zero-capacity header,
        // indistinguishable from a trampled one.
        let query = query.max(BLOCK_MIN_CAPACITY);

        unsafe {
            let mut block = match find_good_or_last(self.first, query) {
                SearchOutcome::Found(block) => block,
                SearchOutcome::EndReached(last) => {
                    let grown = self.grow(last, query)?;
                    split_if_too_big(grown, query);
                    grown
                }
                SearchOutcome::Corrupted => return CorruptedSnafu.fail(),
            };

            block.as_mut().is_free = false;
            Ok(BlockHeader::payload(block))
        }
    }

    /// Extends the heap past `last`, the current end of the chain, with a
    /// region big enough for `query` payload bytes.
    ///
    /// The new region is requested right after `last`'s footprint. When the
    /// platform honours that hint and `last` is free, the region's block is
    /// merged into `last` on the spot and the fattened `last` serves the
    /// request; otherwise the chain simply continues into the disjoint
    /// region.
    unsafe fn grow(
        &mut self,
        mut last: NonNull<BlockHeader>,
        query: usize,
    ) -> Result<NonNull<BlockHeader>, AllocError> {
        unsafe {
            let wanted = block_after(last);
            let region = Region::acquire(wanted, size_from_capacity(query), true)?;

            let grown = region.first_block();
            split_if_too_big(grown, query);

            last.as_mut().next = Some(grown);

            if try_merge_with_next(last) {
                Ok(last)
            } else {
                Ok(grown)
            }
        }
    }

    /// Releases a block previously returned by [`Heap::allocate`].
    ///
    /// A null pointer is a safe no-op. The freed block absorbs any run of
    /// free contiguous successors right away; it does not merge into a free
    /// predecessor, which stays fragmented until a later walk visits the
    /// pair.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer obtained from [`Heap::allocate`] on
    /// this same heap that has not been released since. Anything else is
    /// undefined behavior, as with any malloc-style allocator; there is no
    /// way to detect it here.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };

        unsafe {
            let mut header = BlockHeader::from_payload(payload);
            header.as_mut().is_free = true;

            while try_merge_with_next(header) {}
        }
    }

    /// Read-only walk over the chain for inspection tooling. Takes the heap
    /// by shared reference, so no call through it can move, merge or split
    /// anything.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            current: Some(self.first),
            _heap: PhantomData,
        }
    }
}

/// One chain entry as seen by the diagnostic walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the block header.
    pub addr: *const u8,
    /// Usable payload bytes.
    pub capacity: usize,
    /// Whether the block is free.
    pub is_free: bool,
}

impl BlockInfo {
    /// Total bytes the block occupies on the heap, header included.
    pub fn footprint(&self) -> usize {
        size_from_capacity(self.capacity)
    }
}

/// Iterator behind [`Heap::blocks`].
pub struct Blocks<'a> {
    current: Option<NonNull<BlockHeader>>,
    _heap: PhantomData<&'a Heap>,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;

        unsafe {
            self.current = block.as_ref().next;

            Some(BlockInfo {
                addr: block.as_ptr().cast::<u8>().cast_const(),
                capacity: block.as_ref().capacity,
                is_free: block.as_ref().is_free,
            })
        }
    }
}
