//! The allocation engine: a first-fit, split-and-coalesce heap over a
//! caller-provided region.
//!
//! The region is a plain byte slice, always partitioned exactly into blocks:
//! one header word followed by an aligned payload, with the last block ending
//! at the region end. "Pointers" handed to callers are byte offsets of block
//! payloads within the region; `None` plays the role of the null pointer.
//! Offsets keep every access bounds-checked and let each test own an
//! independent heap.

use core::cmp;
use core::fmt;

use log::{debug, trace};

use crate::freelist::FreeList;
use crate::header::{self, Header, ALIGNMENT, HEADER_SIZE};

/// Largest single request the engine will honor. Anything bigger is rejected
/// up front, independent of how much free space remains.
pub const MAX_REQUEST_SIZE: usize = 1 << 30;

/// Smallest viable region: one header, a minimum payload, and room for the
/// free-list link words.
pub const MIN_HEAP_SIZE: usize = 3 * ALIGNMENT;

/// Why a region was refused at initialization. Non-retryable; the caller must
/// supply a different region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The region cannot hold even one minimal block.
    TooSmall { size: usize },
    /// The region length is not a multiple of the alignment unit.
    Unaligned { size: usize },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InitError::TooSmall { size } => {
                write!(f, "region of {} bytes is below the minimum of {}", size, MIN_HEAP_SIZE)
            }
            InitError::Unaligned { size } => {
                write!(f, "region of {} bytes is not a multiple of {}", size, ALIGNMENT)
            }
        }
    }
}

/// An explicit-free-list heap over a borrowed region.
///
/// All operations run to completion synchronously; a single logical caller
/// drives them. Failed requests leave the heap untouched and able to satisfy
/// smaller ones.
pub struct Heap<'a> {
    pub(crate) mem: &'a mut [u8],
    pub(crate) free_list: FreeList,
}

impl<'a> Heap<'a> {
    /// Take over `mem`, establishing one free block spanning the whole
    /// region.
    pub fn new(mem: &'a mut [u8]) -> Result<Heap<'a>, InitError> {
        if mem.len() < MIN_HEAP_SIZE {
            return Err(InitError::TooSmall { size: mem.len() });
        }
        if mem.len() % ALIGNMENT != 0 {
            return Err(InitError::Unaligned { size: mem.len() });
        }

        header::write(mem, 0, Header::new(mem.len() - HEADER_SIZE, true));
        let mut free_list = FreeList::default();
        free_list.push_front(mem, 0);
        debug!(
            "heap over {} bytes, initial free payload {}",
            mem.len(),
            mem.len() - HEADER_SIZE
        );
        Ok(Heap { mem, free_list })
    }

    /// Total bytes under management.
    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Allocate `size` bytes and return the payload offset.
    ///
    /// Returns `None` for a zero-size or oversized request, or when no free
    /// block is large enough (out of memory). Out of memory is not an error
    /// in usage: the heap stays valid and can satisfy smaller requests.
    pub fn alloc(&mut self, size: usize) -> Option<usize> {
        if size == 0 || size > MAX_REQUEST_SIZE {
            return None;
        }
        let request = header::round_up(size, ALIGNMENT);
        let block = self.free_list.first_fit(self.mem, request)?;
        let payload = header::read(self.mem, block).payload();
        trace!("alloc({}): block {} of payload {}", size, block, payload);

        // The last block is the only one left that can absorb future growth;
        // carve the request out of it rather than handing the whole thing
        // over, whenever the remainder is big enough to stand alone.
        if self.is_last(block) && payload >= request + 3 * HEADER_SIZE {
            self.split(block, request);
            return Some(block + HEADER_SIZE);
        }

        header::write(self.mem, block, Header::new(payload, false));
        self.free_list.remove(self.mem, block);
        Some(block + HEADER_SIZE)
    }

    /// Release an allocation. No-op on `None`.
    ///
    /// The offset is invalidated; the engine does not detect later use of it.
    pub fn free(&mut self, ptr: Option<usize>) {
        let ptr = match ptr {
            None => return,
            Some(ptr) => ptr,
        };
        let block = ptr - HEADER_SIZE;
        let h = header::read(self.mem, block);
        debug_assert!(!h.is_free(), "double free of block {}", block);
        trace!("free({}): payload {}", ptr, h.payload());

        header::write(self.mem, block, Header::new(h.payload(), true));
        self.free_list.push_front(self.mem, block);
        self.coalesce(block);
    }

    /// Resize an allocation, in place when the blocks to its right allow it.
    ///
    /// A `None` pointer behaves as `alloc(new_size)`; a zero `new_size`
    /// behaves as `free(ptr)` and returns `None`. When the allocation has to
    /// move, the payload is copied. On failure the old allocation is left
    /// intact and still owned by the caller.
    pub fn realloc(&mut self, ptr: Option<usize>, new_size: usize) -> Option<usize> {
        let ptr = match ptr {
            None => return self.alloc(new_size),
            Some(ptr) => ptr,
        };
        if new_size == 0 {
            self.free(Some(ptr));
            return None;
        }

        let request = header::round_up(new_size, ALIGNMENT);
        let block = ptr - HEADER_SIZE;
        let old_payload = header::read(self.mem, block).payload();
        trace!("realloc({}, {}): payload {}", ptr, new_size, old_payload);

        // Grow rightward while the block still falls short and its immediate
        // neighbor is free. Each merge strictly grows the payload, so this
        // terminates.
        while header::read(self.mem, block).payload() < request {
            match self.next_block(block) {
                Some(next) if header::read(self.mem, next).is_free() => self.coalesce(block),
                _ => break,
            }
        }

        let payload = header::read(self.mem, block).payload();
        if payload >= request {
            let last = self.is_last(block);
            if last && request + 3 * HEADER_SIZE < payload {
                // Trim the excess off the tail block instead of keeping it:
                // the tail is the one block that must stay reclaimable.
                let rest = ptr + request;
                header::write(self.mem, block, Header::new(request, false));
                header::write(
                    self.mem,
                    rest,
                    Header::new(payload - request - HEADER_SIZE, true),
                );
                self.free_list.push_front(self.mem, rest);
            } else if !last && payload >= request + 3 * HEADER_SIZE {
                self.split(block, request);
            }
            return Some(ptr);
        }

        // Still short even after coalescing: move the allocation. The old
        // block stays live if the new allocation fails.
        let new_ptr = self.alloc(new_size)?;
        let preserved = cmp::min(old_payload, new_size);
        self.mem.copy_within(ptr..ptr + preserved, new_ptr);
        self.free(Some(ptr));
        debug!("realloc({}, {}): moved to {}", ptr, new_size, new_ptr);
        Some(new_ptr)
    }

    /// The payload bytes of a live allocation.
    pub fn data(&self, ptr: usize) -> &[u8] {
        let h = header::read(self.mem, ptr - HEADER_SIZE);
        debug_assert!(!h.is_free(), "data access to free block {}", ptr - HEADER_SIZE);
        &self.mem[ptr..ptr + h.payload()]
    }

    /// The payload bytes of a live allocation, mutably.
    pub fn data_mut(&mut self, ptr: usize) -> &mut [u8] {
        let h = header::read(self.mem, ptr - HEADER_SIZE);
        debug_assert!(!h.is_free(), "data access to free block {}", ptr - HEADER_SIZE);
        &mut self.mem[ptr..ptr + h.payload()]
    }

    /// Carve a used block of exactly `request` payload out of `block` and
    /// leave the remainder as a new free block. The remainder is pushed onto
    /// the free list and immediately offered to merge with whatever follows
    /// it, which covers the case where the original right neighbor was
    /// already free.
    fn split(&mut self, block: usize, request: usize) {
        let h = header::read(self.mem, block);
        debug_assert!(h.payload() >= request + 3 * HEADER_SIZE);
        trace!(
            "split block {} of payload {} at {}",
            block,
            h.payload(),
            request
        );

        // A free block being split is no longer the same free entity; drop
        // it from the list before the headers change.
        if h.is_free() {
            self.free_list.remove(self.mem, block);
        }
        let rest = block + HEADER_SIZE + request;
        header::write(self.mem, block, Header::new(request, false));
        header::write(
            self.mem,
            rest,
            Header::new(h.payload() - request - HEADER_SIZE, true),
        );
        self.free_list.push_front(self.mem, rest);
        self.coalesce(rest);
    }

    /// Absorb the immediate right neighbor if it is free.
    ///
    /// Left neighbors are never touched: every free and every split runs a
    /// forward coalesce on its own block, which handles the leftward case
    /// from the left neighbor's side.
    fn coalesce(&mut self, block: usize) {
        let next = match self.next_block(block) {
            None => return,
            Some(next) => next,
        };
        let nh = header::read(self.mem, next);
        if !nh.is_free() {
            return;
        }
        trace!("coalesce {} <- {}", block, next);

        self.free_list.remove(self.mem, next);
        let h = header::read(self.mem, block);
        header::write(
            self.mem,
            block,
            Header::new(h.payload() + nh.payload() + HEADER_SIZE, h.is_free()),
        );
    }

    /// The block following `block` in address order, or `None` for the last
    /// block.
    pub(crate) fn next_block(&self, block: usize) -> Option<usize> {
        let next = block + HEADER_SIZE + header::read(self.mem, block).payload();
        if next >= self.mem.len() {
            None
        } else {
            Some(next)
        }
    }

    fn is_last(&self, block: usize) -> bool {
        self.next_block(block).is_none()
    }
}

/// A human-readable dump: one line per block in address order. For
/// diagnostics only; no format guarantees.
impl fmt::Display for Heap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut at = 0;
        while at < self.mem.len() {
            let h = header::read(self.mem, at);
            writeln!(
                f,
                "block @{:>6}: payload {:>6} {}",
                at,
                h.payload(),
                if h.is_free() { "free" } else { "used" }
            )?;
            at += HEADER_SIZE + h.payload();
        }
        Ok(())
    }
}
