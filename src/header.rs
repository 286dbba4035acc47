//! The block header codec.
//!
//! Every block in a managed region begins with a single aligned word holding
//! the block's payload size and its free/used flag. Payload sizes are always
//! multiples of [`ALIGNMENT`], which leaves the low three bits of the word
//! spare: a free block stores the bare size, a used block stores `size + 1`.
//! No separate flag field, no extra space.

use core::convert::TryInto;

use static_assertions::const_assert;

/// The alignment unit. Block offsets and payload sizes are always multiples
/// of this.
pub const ALIGNMENT: usize = 8;

/// Size of a block header, in bytes: exactly one alignment unit.
pub const HEADER_SIZE: usize = ALIGNMENT;

/// The smallest payload ever carved out. Two alignment units, so that the
/// block can host the two free-list link words once it is freed.
pub const MIN_ALLOC: usize = 2 * ALIGNMENT;

const FLAG_MASK: u64 = 0b111;

const_assert!(ALIGNMENT.is_power_of_two());
const_assert!(HEADER_SIZE == core::mem::size_of::<u64>());
const_assert!(MIN_ALLOC >= 2 * ALIGNMENT);

/// A decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header(u64);

impl Header {
    pub fn new(payload: usize, free: bool) -> Header {
        debug_assert!(
            payload % ALIGNMENT == 0,
            "unaligned payload size {}",
            payload
        );
        Header(payload as u64 | if free { 0 } else { 1 })
    }

    /// Usable bytes following the header.
    pub fn payload(self) -> usize {
        (self.0 & !FLAG_MASK) as usize
    }

    /// True iff the low flag bits are all clear.
    pub fn is_free(self) -> bool {
        self.0 & FLAG_MASK == 0
    }
}

/// Read the header stored at byte offset `at` of the region.
pub(crate) fn read(mem: &[u8], at: usize) -> Header {
    Header(read_word(mem, at))
}

/// Store a header at byte offset `at` of the region.
pub(crate) fn write(mem: &mut [u8], at: usize, header: Header) {
    write_word(mem, at, header.0);
}

/// Read one native-endian word from the region. Also used for the free-list
/// link words, which live in free payloads.
pub(crate) fn read_word(mem: &[u8], at: usize) -> u64 {
    let bytes = mem[at..at + HEADER_SIZE]
        .try_into()
        .expect("a word is HEADER_SIZE bytes");
    u64::from_ne_bytes(bytes)
}

/// Store one native-endian word into the region.
pub(crate) fn write_word(mem: &mut [u8], at: usize, word: u64) {
    mem[at..at + HEADER_SIZE].copy_from_slice(&word.to_ne_bytes());
}

/// Round `size` up to the next multiple of `unit`, with a floor of
/// [`MIN_ALLOC`]. Saturates instead of wrapping on absurd sizes.
pub(crate) fn round_up(size: usize, unit: usize) -> usize {
    debug_assert!(unit.is_power_of_two());
    let rounded = size.saturating_add(unit - 1) & !(unit - 1);
    if rounded < MIN_ALLOC {
        MIN_ALLOC
    } else {
        rounded
    }
}
