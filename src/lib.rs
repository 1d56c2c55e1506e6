//! A user-space dynamic memory allocator with `malloc`/`free` semantics,
//! built on anonymous virtual memory regions requested from the operating
//! system.
//!
//! Every allocation lives in a block: a small header followed by the payload
//! the caller gets a pointer to.
//!
//! ```text
//! +--------------------------------+
//! | Header | Actual memory block   |
//! +--------------------------------+
//!          ^
//!          +-- pointer returned to the caller
//! ```
//!
//! Blocks form one singly linked chain in address order, rooted at the
//! heap's first region. Allocation walks the chain first-fit, merging
//! adjacent free blocks as it passes them, and splits oversized hits so the
//! tail stays reusable. When the walk comes up empty the heap grows by
//! mapping a fresh region right after its current end; if the platform
//! honours that placement the new memory fuses seamlessly with a free tail
//! block, otherwise the chain continues into the disjoint region:
//!
//! ```text
//! +------------------------------------------+     +------------------+
//! | Region | Block | -> | Block | -> | Block | --> | Region | Block   |
//! +------------------------------------------+     +------------------+
//!                                            (chain link, not contiguous)
//! ```
//!
//! The whole mutable surface is two calls on a [`Heap`] handle:
//! [`Heap::allocate`] and [`Heap::release`]. [`Heap::blocks`] offers a
//! read-only walk for inspection tooling. A heap assumes a single logical
//! thread; the handle is neither `Send` nor `Sync` and there is no internal
//! locking.
//!
//! ```rust
//! use firstfit::Heap;
//!
//! let mut heap = Heap::init(8000).unwrap();
//! let ptr = heap.allocate(100).unwrap();
//!
//! unsafe {
//!     ptr.as_ptr().write(42);
//!     assert_eq!(ptr.as_ptr().read(), 42);
//!     heap.release(ptr.as_ptr());
//! }
//! ```

use snafu::Snafu;

mod block;
mod heap;
mod platform;
mod region;
mod search;

pub use heap::{BlockInfo, Blocks, Heap};

/// Failures an allocation can surface.
///
/// Callers and tests rely on telling "no memory available" apart from "the
/// heap is broken", so the two conditions never collapse into one variant.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The platform refused to hand out more memory, both at the preferred
    /// address and anywhere else.
    #[snafu(display("the platform could not supply more memory"))]
    Exhausted,

    /// A block header on the chain failed its integrity check. The heap is
    /// in an unknown state and no further allocation will be attempted
    /// against it.
    #[snafu(display("heap metadata is corrupted"))]
    Corrupted,
}
