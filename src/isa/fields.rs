//! Bit-field extraction for 32-bit instruction words.
//!
//! Layout (bit 31 on the left):
//! ```text
//!  31    26 25  21 20  16 15  11 10   6 5     0
//! | opcode |  rs  |  rt  |  rd  | shamt | funct |   R-type
//! | opcode |  rs  |  rt  |      immediate       |   I-type
//! | opcode |            target                  |   J-type
//! ```

use std::fmt;
use serde::{Serialize, Deserialize};
use super::Word;

/// Mask for a 5-bit register field.
pub const REG_MASK: Word = 0x1F;
/// Mask for the 6-bit opcode and funct fields.
pub const OPCODE_MASK: Word = 0x3F;
/// Mask for the 16-bit immediate field.
pub const IMM_MASK: Word = 0xFFFF;
/// Mask for the 26-bit jump target field.
pub const TARGET_MASK: Word = 0x03FF_FFFF;

const OPCODE_SHIFT: u32 = 26;
const RS_SHIFT: u32 = 21;
const RT_SHIFT: u32 = 16;
const RD_SHIFT: u32 = 11;

/// A register index, always in `0..32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Reg(pub u8);

impl Reg {
    /// Build a register index from any integer, keeping the low 5 bits.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self((index & REG_MASK) as u8)
    }

    /// The register number as an array index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Bits [31:26].
#[inline]
pub const fn opcode(word: Word) -> u8 {
    ((word >> OPCODE_SHIFT) & OPCODE_MASK) as u8
}

/// Bits [25:21].
#[inline]
pub const fn rs(word: Word) -> Reg {
    Reg::new(word >> RS_SHIFT)
}

/// Bits [20:16].
#[inline]
pub const fn rt(word: Word) -> Reg {
    Reg::new(word >> RT_SHIFT)
}

/// Bits [15:11].
#[inline]
pub const fn rd(word: Word) -> Reg {
    Reg::new(word >> RD_SHIFT)
}

/// Bits [5:0].
#[inline]
pub const fn funct(word: Word) -> u8 {
    (word & OPCODE_MASK) as u8
}

/// Bits [15:0], zero-extended.
#[inline]
pub const fn imm(word: Word) -> u16 {
    (word & IMM_MASK) as u16
}

/// Bits [25:0].
#[inline]
pub const fn target(word: Word) -> Word {
    word & TARGET_MASK
}

/// Bits [4:0], the CACHE control code.
#[inline]
pub const fn cache_code(word: Word) -> u8 {
    (word & REG_MASK) as u8
}

/// Pack an R-type word.
pub const fn pack_r(rs: Reg, rt: Reg, rd: Reg, funct: u8) -> Word {
    ((rs.0 as Word) << RS_SHIFT)
        | ((rt.0 as Word) << RT_SHIFT)
        | ((rd.0 as Word) << RD_SHIFT)
        | (funct as Word & OPCODE_MASK)
}

/// Pack an I-type word.
pub const fn pack_i(opcode: u8, rs: Reg, rt: Reg, imm: u16) -> Word {
    ((opcode as Word & OPCODE_MASK) << OPCODE_SHIFT)
        | ((rs.0 as Word) << RS_SHIFT)
        | ((rt.0 as Word) << RT_SHIFT)
        | imm as Word
}

/// Pack a J-type word. Also used for CACHE and HALT, whose payload sits in
/// the low bits.
pub const fn pack_j(opcode: u8, payload: Word) -> Word {
    ((opcode as Word & OPCODE_MASK) << OPCODE_SHIFT) | (payload & TARGET_MASK)
}
