#![no_std]

//! A heap allocator over a single caller-provided memory region.
//!
//! The region is handed in as a byte slice and partitioned into blocks, each
//! a one-word header followed by an 8-byte-aligned payload. No call ever
//! reaches an underlying system allocator, and the region never grows; once
//! it is exhausted, allocations fail until something is freed.
//!
//! Two policies share the block format:
//!
//! - [`Heap`] — the explicit free-list allocator. Free blocks are threaded
//!   into a doubly-linked list stored inside their own payloads, giving
//!   first-fit allocation in O(free blocks), O(1) list updates, and forward
//!   coalescing on free, split, and resize.
//! - [`ImplicitHeap`] — the implicit variant. No list: a linear scan of
//!   every block, and no coalescing. Simpler, slower, kept as a baseline.
//!
//! Block references are byte offsets into the region rather than raw
//! pointers, so every access stays bounds-checked and each heap is an
//! ordinary value that tests can construct independently. `None` plays the
//! role of the null pointer.
//!
//! ```
//! use freelist_heap::Heap;
//!
//! let mut region = [0u8; 128];
//! let mut heap = Heap::new(&mut region).unwrap();
//!
//! let p = heap.alloc(10).unwrap();
//! heap.data_mut(p)[..10].copy_from_slice(b"0123456789");
//!
//! // Grows in place here: everything right of the block is free.
//! let p = heap.realloc(Some(p), 40).unwrap();
//! assert_eq!(&heap.data(p)[..10], b"0123456789");
//!
//! heap.free(Some(p));
//! assert!(heap.validate().0.is_valid());
//! ```
//!
//! The allocators are strictly single-caller: nothing here locks, and a
//! shared heap needs an external mutex around the whole region. Consistency
//! checking ([`Heap::validate`]) is O(region) and meant for tests and
//! diagnostics, never for production control flow.

mod freelist;
mod header;
mod heap;
mod implicit;
mod validate;

pub use header::{ALIGNMENT, HEADER_SIZE, MIN_ALLOC};
pub use heap::{Heap, InitError, MAX_REQUEST_SIZE, MIN_HEAP_SIZE};
pub use implicit::{ImplicitHeap, MIN_IMPLICIT_HEAP_SIZE};
pub use validate::{Stats, Validity};
