use std::ptr::NonNull;

use crate::block::{BlockHeader, split_if_too_big, try_merge_with_next};

/// Outcome of one walk over the block chain.
pub(crate) enum SearchOutcome {
    /// A free block big enough for the query, already trimmed by the
    /// splitter.
    Found(NonNull<BlockHeader>),
    /// The walk fell off the end of the chain. Carries the last block so the
    /// heap can grow from it.
    EndReached(NonNull<BlockHeader>),
    /// A visited header failed its integrity check. Fatal; never produced by
    /// a healthy chain.
    Corrupted,
}

/// First-fit walk from `start`, coalescing as it goes.
///
/// Visited free blocks that are too small get one chance to absorb their
/// immediate neighbour. A successful merge re-examines the same, now larger,
/// block instead of advancing, so a run of small free neighbours collapses
/// into a single candidate within one walk. This makes the search mutate
/// chain topology as a side effect of looking, which is what keeps the
/// allocator to a single pass per call.
///
/// The walk never modifies anything else: a found block is split, not moved,
/// and used blocks are only stepped over.
pub(crate) unsafe fn find_good_or_last(start: NonNull<BlockHeader>, query: usize) -> SearchOutcome {
    let mut last = start;
    let mut current = Some(start);

    unsafe {
        while let Some(block) = current {
            if block.as_ref().is_mangled() {
                return SearchOutcome::Corrupted;
            }

            if block.as_ref().is_free {
                if block.as_ref().fits(query) {
                    split_if_too_big(block, query);
                    return SearchOutcome::Found(block);
                }

                if try_merge_with_next(block) {
                    // Same block again, one neighbour fatter.
                    continue;
                }
            }

            last = block;
            current = block.as_ref().next;
        }
    }

    SearchOutcome::EndReached(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BLOCK_HEADER_SIZE, tests::carve_chain};

    #[test]
    fn first_fit_returns_the_first_big_enough_block() {
        let mut buf = vec![0u64; 256];

        unsafe {
            let blocks = carve_chain(&mut buf, &[64, 300, 400]);
            blocks[0].as_ptr().as_mut().unwrap().is_free = false;

            // 300 fits, 400 would fit better, first fit takes 300.
            match find_good_or_last(blocks[0], 280) {
                SearchOutcome::Found(found) => assert_eq!(found, blocks[1]),
                _ => panic!("expected a hit"),
            }
        }
    }

    #[test]
    fn found_blocks_are_split_before_returning() {
        let mut buf = vec![0u64; 256];

        unsafe {
            let blocks = carve_chain(&mut buf, &[1024]);

            match find_good_or_last(blocks[0], 100) {
                SearchOutcome::Found(found) => {
                    assert_eq!(found.as_ref().capacity, 100);
                    let rest = found.as_ref().next.expect("no remainder");
                    assert_eq!(rest.as_ref().capacity, 1024 - 100 - BLOCK_HEADER_SIZE);
                }
                _ => panic!("expected a hit"),
            }
        }
    }

    #[test]
    fn small_free_neighbours_collapse_into_one_candidate() {
        let mut buf = vec![0u64; 256];

        unsafe {
            // No single block fits 150 bytes, the merged run does.
            let blocks = carve_chain(&mut buf, &[40, 40, 40, 64]);

            match find_good_or_last(blocks[0], 150) {
                SearchOutcome::Found(found) => {
                    assert_eq!(found, blocks[0]);
                    // 40 + 40 + 40 + two absorbed headers, then 150 carved
                    // off would leave too little for a split, so the block
                    // keeps the merged capacity.
                    assert_eq!(found.as_ref().capacity, 3 * 40 + 2 * BLOCK_HEADER_SIZE);
                    assert_eq!(found.as_ref().next, Some(blocks[3]));
                }
                _ => panic!("expected a hit"),
            }
        }
    }

    #[test]
    fn exhausted_walk_reports_the_last_block() {
        let mut buf = vec![0u64; 64];

        unsafe {
            let blocks = carve_chain(&mut buf, &[64, 64]);
            blocks[0].as_ptr().as_mut().unwrap().is_free = false;
            blocks[1].as_ptr().as_mut().unwrap().is_free = false;

            match find_good_or_last(blocks[0], 32) {
                SearchOutcome::EndReached(end) => assert_eq!(end, blocks[1]),
                _ => panic!("expected to reach the end"),
            }
        }
    }

    #[test]
    fn free_but_unmergeable_blocks_report_the_last_block() {
        let mut buf = vec![0u64; 64];

        unsafe {
            // Free blocks too small for the query, next one used, so neither
            // a fit nor a merge happens anywhere.
            let blocks = carve_chain(&mut buf, &[40, 64]);
            blocks[1].as_ptr().as_mut().unwrap().is_free = false;

            match find_good_or_last(blocks[0], 100) {
                SearchOutcome::EndReached(end) => assert_eq!(end, blocks[1]),
                _ => panic!("expected to reach the end"),
            }

            // The too-small block was left alone.
            assert_eq!(blocks[0].as_ref().capacity, 40);
        }
    }

    #[test]
    fn mangled_header_stops_the_walk() {
        let mut buf = vec![0u64; 64];

        unsafe {
            let blocks = carve_chain(&mut buf, &[64, 64]);
            blocks[0].as_ptr().as_mut().unwrap().is_free = false;
            blocks[1].as_ptr().as_mut().unwrap().capacity = 3;

            assert!(matches!(
                find_good_or_last(blocks[0], 32),
                SearchOutcome::Corrupted
            ));
        }
    }
}
