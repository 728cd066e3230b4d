//! Word-level primitives for the instruction set.
//!
//! Everything in the machine is a 32-bit [`Word`]: registers, memory cells
//! and encoded instructions. This module holds the widths shared by the bus,
//! the cache and the decoder, plus the bit-field helpers in [`fields`].

pub mod fields;

pub use fields::Reg;

/// The universal storage unit.
pub type Word = u32;

/// Bytes per word. The PC advances by this much per fetch.
pub const WORD_BYTES: Word = 4;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 32;

/// Register written by JAL with the return address.
pub const LINK_REGISTER: Reg = Reg(31);

/// Default memory size in words (4096 bytes).
pub const DEFAULT_MEMORY_WORDS: usize = 1024;

/// Round a byte address down to the start of its word.
#[inline]
pub const fn align_word(address: Word) -> Word {
    address & !(WORD_BYTES - 1)
}
