//! O(n) consistency checking over the whole region and the free list.
//!
//! Validation is for tests and diagnostics. The engine never calls it: every
//! operation assumes it is handed a valid heap, and a caller that corrupts
//! the region out-of-band surfaces here, after the fact.

use crate::freelist::FreeList;
use crate::header::{self, ALIGNMENT, HEADER_SIZE, MIN_ALLOC};
use crate::heap::Heap;

/// A representation of every invalid state found in a heap, one counter per
/// invariant class, so the report names what broke rather than just saying
/// "false".
#[derive(Debug, Default)]
pub struct Validity {
    /// Blocks extending past the end of the region. The address walk stops
    /// at the first one.
    pub overruns: usize,

    /// Header words whose flag bits are neither "free" nor "used". Any other
    /// value means the word was overwritten.
    pub bad_flags: usize,

    /// Free blocks too small to hold their own list links.
    pub undersized_free: usize,

    /// The address walk did not land exactly on the region end: the blocks
    /// no longer partition the region.
    pub partition_broken: bool,

    /// Free-list entries whose header is not marked free.
    pub unfree_listed: usize,

    /// List entries whose links disagree: `a.next == b` but `b.prev != a`.
    pub asymmetric_links: usize,

    /// The list and the flags disagree as a whole: the number of entries
    /// reachable from the head differs from the number of free blocks in the
    /// region. Covers missing blocks, stray entries, and cycles.
    pub membership_broken: bool,

    /// Offset of the first block that broke an invariant, if any.
    pub first_fault: Option<usize>,
}

impl Validity {
    /// A simple check that no invariant class tripped.
    pub fn is_valid(&self) -> bool {
        self.overruns == 0
            && self.bad_flags == 0
            && self.undersized_free == 0
            && !self.partition_broken
            && self.unfree_listed == 0
            && self.asymmetric_links == 0
            && !self.membership_broken
    }

    fn fault(&mut self, at: usize) {
        if self.first_fault.is_none() {
            self.first_fault = Some(at);
        }
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

/// Aggregate numbers from a validation walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of blocks partitioning the region.
    pub blocks: usize,
    /// How many of them are free.
    pub free_blocks: usize,
    /// Free payload bytes, headers excluded.
    pub free_bytes: usize,
    /// Largest single free payload.
    pub largest_free: usize,
}

impl Heap<'_> {
    /// Walk every block in address order, then the whole free list, and
    /// report each broken invariant separately.
    ///
    /// Read-only, so calling it twice with no intervening mutation returns
    /// the same result.
    pub fn validate(&self) -> (Validity, Stats) {
        let mut validity = Validity::default();
        let mut stats = Stats::default();
        let len = self.mem.len();

        let mut at = 0;
        while at < len {
            let word = header::read_word(self.mem, at);
            let h = header::read(self.mem, at);
            if word & 0b111 > 1 {
                validity.bad_flags += 1;
                validity.fault(at);
            }
            let end = at + HEADER_SIZE + h.payload();
            if end > len {
                validity.overruns += 1;
                validity.fault(at);
                break;
            }

            stats.blocks += 1;
            if h.is_free() {
                stats.free_blocks += 1;
                stats.free_bytes += h.payload();
                if h.payload() > stats.largest_free {
                    stats.largest_free = h.payload();
                }
                if h.payload() < MIN_ALLOC {
                    validity.undersized_free += 1;
                    validity.fault(at);
                }
            }
            at = end;
        }
        if at != len {
            validity.partition_broken = true;
        }

        // The list walk is bounded by the block count, so a corrupted cycle
        // still terminates and gets reported as a membership mismatch.
        let mut listed = 0;
        let mut prev = None;
        let mut cursor = self.free_list.head();
        while let Some(block) = cursor {
            if listed >= stats.blocks {
                validity.membership_broken = true;
                validity.fault(block);
                break;
            }
            listed += 1;

            if block % ALIGNMENT != 0 || block + HEADER_SIZE + MIN_ALLOC > len {
                validity.membership_broken = true;
                validity.fault(block);
                break;
            }
            if !header::read(self.mem, block).is_free() {
                validity.unfree_listed += 1;
                validity.fault(block);
            }
            if FreeList::prev(self.mem, block) != prev {
                validity.asymmetric_links += 1;
                validity.fault(block);
            }
            prev = Some(block);
            cursor = FreeList::next(self.mem, block);
        }
        if listed != stats.free_blocks {
            validity.membership_broken = true;
        }

        (validity, stats)
    }
}
