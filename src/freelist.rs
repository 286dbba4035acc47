//! The explicit free list.
//!
//! Free blocks are threaded into an unordered doubly-linked list, giving the
//! engine O(free blocks) allocation instead of a walk over every block. The
//! links live inside the free block's own payload: a payload is never smaller
//! than [`MIN_ALLOC`](crate::MIN_ALLOC), which is exactly room for a `prev`
//! and a `next` word. Links are byte offsets of block headers within the
//! region; a sentinel word marks the ends of the list.
//!
//! The list is kept in insertion order, not address order: the most recently
//! freed block (or split remainder) is scanned first.

use crate::header::{self, ALIGNMENT, HEADER_SIZE};

/// Sentinel link meaning "no block".
const NONE: u64 = u64::MAX;

/// Byte offsets of the link words, relative to the block header.
const PREV: usize = HEADER_SIZE;
const NEXT: usize = HEADER_SIZE + ALIGNMENT;

/// Head of the intrusive free list. All real state lives in the region; this
/// is just the entry point.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<usize>,
}

impl FreeList {
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn prev(mem: &[u8], block: usize) -> Option<usize> {
        decode(header::read_word(mem, block + PREV))
    }

    pub fn next(mem: &[u8], block: usize) -> Option<usize> {
        decode(header::read_word(mem, block + NEXT))
    }

    fn set_prev(mem: &mut [u8], block: usize, link: Option<usize>) {
        header::write_word(mem, block + PREV, encode(link));
    }

    fn set_next(mem: &mut [u8], block: usize, link: Option<usize>) {
        header::write_word(mem, block + NEXT, encode(link));
    }

    /// Insert `block` at the head of the list, O(1).
    ///
    /// Callers flip the header flag as part of the same logical operation:
    /// list membership and the free flag always change together.
    pub fn push_front(&mut self, mem: &mut [u8], block: usize) {
        Self::set_prev(mem, block, None);
        Self::set_next(mem, block, self.head);
        if let Some(old_head) = self.head {
            Self::set_prev(mem, old_head, Some(block));
        }
        self.head = Some(block);
    }

    /// Unlink `block` from wherever it sits, O(1).
    ///
    /// The block's own link words name its neighbors, so the sole, head, and
    /// interior/tail cases all patch the same way.
    pub fn remove(&mut self, mem: &mut [u8], block: usize) {
        let prev = Self::prev(mem, block);
        let next = Self::next(mem, block);
        match prev {
            None => self.head = next,
            Some(prev) => Self::set_next(mem, prev, next),
        }
        if let Some(next) = next {
            Self::set_prev(mem, next, prev);
        }
    }

    /// First-fit search: the first listed block whose payload holds at least
    /// `min_payload` bytes, in list order. O(list length).
    pub fn first_fit(&self, mem: &[u8], min_payload: usize) -> Option<usize> {
        let mut cursor = self.head;
        while let Some(block) = cursor {
            let h = header::read(mem, block);
            debug_assert!(h.is_free(), "used block {} on the free list", block);
            if h.payload() >= min_payload {
                return Some(block);
            }
            cursor = Self::next(mem, block);
        }
        None
    }
}

fn encode(link: Option<usize>) -> u64 {
    match link {
        None => NONE,
        Some(offset) => offset as u64,
    }
}

fn decode(word: u64) -> Option<usize> {
    if word == NONE {
        None
    } else {
        Some(word as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;

    use test_log::test;

    // Lay out three free blocks of payload 24 at offsets 0, 32, and 64.
    fn arena() -> [u8; 96] {
        let mut mem = [0u8; 96];
        for &at in &[0, 32, 64] {
            header::write(&mut mem, at, Header::new(24, true));
        }
        mem
    }

    fn collect(list: &FreeList, mem: &[u8], out: &mut [Option<usize>]) {
        let mut cursor = list.head();
        for slot in out.iter_mut() {
            *slot = cursor;
            if let Some(block) = cursor {
                cursor = FreeList::next(mem, block);
            }
        }
    }

    #[test]
    fn push_front_orders_by_recency() {
        let mut mem = arena();
        let mut list = FreeList::default();
        list.push_front(&mut mem, 0);
        list.push_front(&mut mem, 32);
        list.push_front(&mut mem, 64);

        let mut found = [None; 4];
        collect(&list, &mem, &mut found);
        assert_eq!(found, [Some(64), Some(32), Some(0), None]);

        // Links are symmetric.
        assert_eq!(FreeList::prev(&mem, 64), None);
        assert_eq!(FreeList::prev(&mem, 32), Some(64));
        assert_eq!(FreeList::prev(&mem, 0), Some(32));
    }

    #[test]
    fn remove_interior() {
        let mut mem = arena();
        let mut list = FreeList::default();
        list.push_front(&mut mem, 0);
        list.push_front(&mut mem, 32);
        list.push_front(&mut mem, 64);

        list.remove(&mut mem, 32);
        let mut found = [None; 3];
        collect(&list, &mem, &mut found);
        assert_eq!(found, [Some(64), Some(0), None]);
        assert_eq!(FreeList::prev(&mem, 0), Some(64));
    }

    #[test]
    fn remove_head_and_tail() {
        let mut mem = arena();
        let mut list = FreeList::default();
        list.push_front(&mut mem, 0);
        list.push_front(&mut mem, 32);
        list.push_front(&mut mem, 64);

        list.remove(&mut mem, 64);
        assert_eq!(list.head(), Some(32));
        assert_eq!(FreeList::prev(&mem, 32), None);

        list.remove(&mut mem, 0);
        let mut found = [None; 2];
        collect(&list, &mem, &mut found);
        assert_eq!(found, [Some(32), None]);
    }

    #[test]
    fn remove_sole_element_empties_list() {
        let mut mem = arena();
        let mut list = FreeList::default();
        list.push_front(&mut mem, 32);
        list.remove(&mut mem, 32);
        assert_eq!(list.head(), None);
    }

    #[test]
    fn first_fit_takes_list_order() {
        let mut mem = arena();
        header::write(&mut mem, 32, Header::new(24, true));
        let mut list = FreeList::default();
        list.push_front(&mut mem, 0);
        list.push_front(&mut mem, 32);

        // Both fit; the most recently pushed wins.
        assert_eq!(list.first_fit(&mem, 16), Some(32));
        // Nothing holds 32 bytes.
        assert_eq!(list.first_fit(&mem, 32), None);
        // An empty list never fits.
        assert_eq!(FreeList::default().first_fit(&mem, 8), None);
    }
}
