//! The implicit-list variant: same block headers, no free list.
//!
//! Allocation walks every block in address order, free or used, so it is
//! O(all blocks) instead of O(free blocks), and freed blocks are never
//! coalesced. It satisfies the same interface as [`Heap`](crate::Heap) with
//! less machinery: a simpler policy for small regions or as a baseline to
//! measure the explicit list against.

use core::cmp;
use core::fmt;

use log::trace;

use crate::header::{self, Header, ALIGNMENT, HEADER_SIZE};
use crate::heap::{InitError, MAX_REQUEST_SIZE};

/// Smallest viable region for the implicit variant: one header plus a
/// minimal payload. No list links to make room for.
pub const MIN_IMPLICIT_HEAP_SIZE: usize = 2 * ALIGNMENT;

/// An implicit-list heap over a borrowed region.
pub struct ImplicitHeap<'a> {
    mem: &'a mut [u8],
}

impl<'a> ImplicitHeap<'a> {
    /// Take over `mem`, establishing one free block spanning the whole
    /// region.
    pub fn new(mem: &'a mut [u8]) -> Result<ImplicitHeap<'a>, InitError> {
        if mem.len() < MIN_IMPLICIT_HEAP_SIZE {
            return Err(InitError::TooSmall { size: mem.len() });
        }
        if mem.len() % ALIGNMENT != 0 {
            return Err(InitError::Unaligned { size: mem.len() });
        }
        header::write(mem, 0, Header::new(mem.len() - HEADER_SIZE, true));
        Ok(ImplicitHeap { mem })
    }

    /// Total bytes under management.
    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Allocate `size` bytes, scanning every block for the first free one
    /// that fits. The last block is split when the remainder can hold at
    /// least a header and a minimal payload.
    pub fn alloc(&mut self, size: usize) -> Option<usize> {
        if size == 0 || size > MAX_REQUEST_SIZE {
            return None;
        }
        let request = header::round_up(size, ALIGNMENT);

        let mut at = 0;
        while at < self.mem.len() {
            let h = header::read(self.mem, at);
            let payload = h.payload();
            let last = at + HEADER_SIZE + payload == self.mem.len();

            if last {
                if !h.is_free() || request > payload {
                    return None;
                }
                if payload >= request + 2 * HEADER_SIZE {
                    // Split: a new header right after the request keeps the
                    // rest of the tail allocatable.
                    header::write(self.mem, at, Header::new(request, false));
                    header::write(
                        self.mem,
                        at + HEADER_SIZE + request,
                        Header::new(payload - request - HEADER_SIZE, true),
                    );
                } else {
                    header::write(self.mem, at, Header::new(payload, false));
                }
                trace!("implicit alloc({}): tail block {}", size, at);
                return Some(at + HEADER_SIZE);
            }

            if h.is_free() && payload >= request {
                header::write(self.mem, at, Header::new(payload, false));
                trace!("implicit alloc({}): reusing block {}", size, at);
                return Some(at + HEADER_SIZE);
            }
            at += HEADER_SIZE + payload;
        }
        None
    }

    /// Release an allocation: the flag flips back to free, nothing else
    /// moves. No-op on `None`.
    pub fn free(&mut self, ptr: Option<usize>) {
        let ptr = match ptr {
            None => return,
            Some(ptr) => ptr,
        };
        let block = ptr - HEADER_SIZE;
        let h = header::read(self.mem, block);
        debug_assert!(!h.is_free(), "double free of block {}", block);
        header::write(self.mem, block, Header::new(h.payload(), true));
    }

    /// Resize an allocation. Without coalescing there is no growing in
    /// place: the data always moves to a fresh block.
    pub fn realloc(&mut self, ptr: Option<usize>, new_size: usize) -> Option<usize> {
        let ptr = match ptr {
            None => return self.alloc(new_size),
            Some(ptr) => ptr,
        };
        if new_size == 0 {
            self.free(Some(ptr));
            return None;
        }

        let old_payload = header::read(self.mem, ptr - HEADER_SIZE).payload();
        let new_ptr = self.alloc(new_size)?;
        let preserved = cmp::min(old_payload, new_size);
        self.mem.copy_within(ptr..ptr + preserved, new_ptr);
        self.free(Some(ptr));
        Some(new_ptr)
    }

    /// The payload bytes of a live allocation.
    pub fn data(&self, ptr: usize) -> &[u8] {
        let h = header::read(self.mem, ptr - HEADER_SIZE);
        &self.mem[ptr..ptr + h.payload()]
    }

    /// The payload bytes of a live allocation, mutably.
    pub fn data_mut(&mut self, ptr: usize) -> &mut [u8] {
        let h = header::read(self.mem, ptr - HEADER_SIZE);
        &mut self.mem[ptr..ptr + h.payload()]
    }

    /// Whether the blocks still partition the region exactly, with sane
    /// header words throughout.
    pub fn validate(&self) -> bool {
        let mut at = 0;
        while at < self.mem.len() {
            let word = header::read_word(self.mem, at);
            if word & 0b111 > 1 {
                return false;
            }
            let end = at + HEADER_SIZE + header::read(self.mem, at).payload();
            if end > self.mem.len() {
                return false;
            }
            at = end;
        }
        at == self.mem.len()
    }
}

/// One line per block in address order, same as the explicit heap's dump.
impl fmt::Display for ImplicitHeap<'_> {
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
