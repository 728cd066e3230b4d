//! Register file.
//!
//! 32 general-purpose words and the program counter. Register 0 is an
//! ordinary register here; writes to it stick.

use crate::isa::{Reg, Word, REGISTER_COUNT, WORD_BYTES};
use serde::{Serialize, Deserialize};

/// The CPU register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General-purpose registers R0-R31.
    pub gpr: [Word; REGISTER_COUNT],

    /// Byte address of the next instruction to fetch.
    pub pc: Word,
}

impl Registers {
    /// All registers and the PC zeroed.
    pub fn new() -> Self {
        Self {
            gpr: [0; REGISTER_COUNT],
            pc: 0,
        }
    }

    pub fn reset(&mut self) {
        self.gpr = [0; REGISTER_COUNT];
        self.pc = 0;
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> Word {
        self.gpr[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Reg, value: Word) {
        self.gpr[reg.index()] = value;
    }

    /// Move the PC to the next sequential word.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> Word {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(WORD_BYTES);
        old
    }

    /// Set the program counter to an absolute byte address.
    pub fn jump(&mut self, address: Word) {
        self.pc = address;
    }

    /// Move the PC by `words` instructions relative to its current value.
    pub fn branch(&mut self, words: Word) {
        self.pc = self.pc.wrapping_add(words.wrapping_mul(WORD_BYTES));
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_pc() {
        let mut regs = Registers::new();
        regs.pc = 8;

        let old = regs.advance_pc();
        assert_eq!(old, 8);
        assert_eq!(regs.pc, 12);
    }

    #[test]
    fn test_register_zero_is_writable() {
        let mut regs = Registers::new();
        regs.set(Reg(0), 99);
        assert_eq!(regs.get(Reg(0)), 99);
    }

    #[test]
    fn test_branch_scales_by_word() {
        let mut regs = Registers::new();
        regs.pc = 4;
        regs.branch(3);
        assert_eq!(regs.pc, 16);

        regs.jump(0x100);
        assert_eq!(regs.pc, 0x100);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.set(Reg(5), 1);
        regs.pc = 40;
        regs.reset();
        assert_eq!(regs, Registers::new());
    }
}
