use std::ptr::NonNull;

use snafu::OptionExt as _;

use crate::{
    AllocError, ExhaustedSnafu,
    block::BlockHeader,
    platform::{map_anywhere, map_at, page_size},
};

/// Hard floor for region sizes. Pathologically small OS requests are rounded
/// up to this, so a region always has room for a useful run of blocks.
pub(crate) const REGION_MIN_SIZE: usize = 2 * 4096;

/// A contiguous span of OS-backed memory.
///
/// The provider hands regions out already initialized as exactly one free
/// block spanning the whole usable size, so callers only ever splice that
/// first block onto the chain:
///
/// ```text
/// +--------------------------------------------------+
/// | +--------+------------------------------------+  |
/// | | Header |          free payload              |  |
/// | +--------+------------------------------------+  |
/// +--------------------------------------------------+
///   <-------------------- size --------------------->
/// ```
///
/// Regions are owned by the heap for its whole lifetime. There is no
/// region-level release; the mapping stays with the process until exit.
pub(crate) struct Region {
    /// Base address returned by the platform.
    pub addr: NonNull<u8>,
    /// Mapped size, page- and minimum-size rounded.
    pub size: usize,
    /// Whether this region extended a prior one or was the initial
    /// allocation.
    pub extends: bool,
}

impl Region {
    /// Maps a fresh region of at least `query` bytes, preferring `preferred`
    /// as its base address.
    ///
    /// The first attempt requires the platform to honour the address without
    /// relocating the mapping. When that placement is refused, usually
    /// because something else already lives there, the request is retried
    /// wherever the platform wants. Only a double refusal is an error.
    ///
    /// The returned span is zero-filled by the platform.
    pub(crate) fn acquire(
        preferred: *mut u8,
        query: usize,
        extends: bool,
    ) -> Result<Region, AllocError> {
        let size = actual_size(query);

        unsafe {
            let addr = map_at(preferred, size)
                .or_else(|| map_anywhere(size))
                .context(ExhaustedSnafu)?;

            BlockHeader::init(addr, size, None);

            Ok(Region { addr, size, extends })
        }
    }

    /// The single free block the region was initialized with.
    #[inline]
    pub(crate) fn first_block(&self) -> NonNull<BlockHeader> {
        self.addr.cast()
    }
}

/// Rounds a request up to the page size and to [`REGION_MIN_SIZE`].
fn actual_size(query: usize) -> usize {
    align(query, page_size()).max(REGION_MIN_SIZE)
}

/// Aligns `value` up to the next multiple of `to`. `to` must be a power of
/// two, which page sizes always are.
fn align(value: usize, to: usize) -> usize {
    (value + to - 1) & !(to - 1)
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;
    use crate::block::{BLOCK_HEADER_SIZE, BlockHeader};

    #[test]
    fn align_rounds_up_to_pages() {
        let page = page_size();

        assert_eq!(align(1, page), page);
        assert_eq!(align(page, page), page);
        assert_eq!(align(page + 1, page), 2 * page);
    }

    #[test]
    fn tiny_requests_get_the_minimum_region() {
        let region = Region::acquire(ptr::null_mut(), 1, false).unwrap();

        assert_eq!(region.size, REGION_MIN_SIZE.max(page_size()));
        assert_eq!(region.size % page_size(), 0);
    }

    #[test]
    fn requests_are_page_rounded() {
        let query = REGION_MIN_SIZE + 1;
        let region = Region::acquire(ptr::null_mut(), query, false).unwrap();

        assert!(region.size >= query);
        assert_eq!(region.size % page_size(), 0);
    }

    #[test]
    fn region_starts_as_one_free_block() {
        let region = Region::acquire(ptr::null_mut(), 10_000, true).unwrap();
        let block = region.first_block();

        unsafe {
            assert!(block.as_ref().is_free);
            assert!(block.as_ref().next.is_none());
            assert_eq!(block.as_ref().capacity, region.size - BLOCK_HEADER_SIZE);
        }

        assert!(region.extends);
    }

    #[test]
    fn fresh_region_payload_is_zeroed() {
        let region = Region::acquire(ptr::null_mut(), 4096, false).unwrap();

        unsafe {
            let payload = BlockHeader::payload(region.first_block());

            for offset in [0, 1, 128, region.size - BLOCK_HEADER_SIZE - 1] {
                assert_eq!(payload.as_ptr().add(offset).read(), 0);
            }
        }
    }
}
