//! Instruction decoder.
//!
//! Turns a raw 32-bit word into an [`Instruction`] and back. Decoding never
//! fails: words with an opcode or funct outside the table decode to
//! [`Instruction::Unrecognized`], which the CPU executes as a no-op.

use crate::isa::{fields, Reg, Word};
use serde::{Serialize, Deserialize};

/// Opcode and funct values.
pub mod opcodes {
    /// R-type instructions; the operation is in the funct field.
    pub const SPECIAL: u8 = 0x00;
    pub const J: u8 = 0x02;
    pub const JAL: u8 = 0x03;
    /// Not BNE. Decodes as unrecognized.
    pub const BEQ_RESERVED: u8 = 0x04;
    pub const BNE: u8 = 0x05;
    pub const ADDI: u8 = 0x08;
    pub const LW: u8 = 0x23;
    pub const SW: u8 = 0x2B;
    pub const CACHE: u8 = 0x3A;
    pub const HALT: u8 = 0x3F;

    pub const FUNCT_ADD: u8 = 0x20;
    pub const FUNCT_SUB: u8 = 0x22;
    pub const FUNCT_SLT: u8 = 0x2A;
}

/// Decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== ALU ====================

    /// rd := rs + rt
    Add { rd: Reg, rs: Reg, rt: Reg },

    /// rd := rs - rt
    Sub { rd: Reg, rs: Reg, rt: Reg },

    /// rd := 1 if rs < rt (signed) else 0
    Slt { rd: Reg, rs: Reg, rt: Reg },

    /// rt := rs + imm (imm zero-extended)
    Addi { rt: Reg, rs: Reg, imm: u16 },

    // ==================== Control Flow ====================

    /// if rs != rt then PC := PC + offset * 4
    Bne { rs: Reg, rt: Reg, offset: u16 },

    /// PC := target << 2
    J { target: Word },

    /// R31 := PC; PC := target << 2
    Jal { target: Word },

    /// Stop the CPU.
    Halt,

    // ==================== Memory ====================

    /// rt := MEM[rs + offset]
    Lw { rt: Reg, rs: Reg, offset: u16 },

    /// MEM[rs + offset] := rt
    Sw { rt: Reg, rs: Reg, offset: u16 },

    /// Cache control: 0 off, 1 on, 2 flush.
    Cache { code: u8 },

    // ==================== Other ====================

    /// Opcode or funct outside the table. Executes as a no-op.
    Unrecognized(Word),
}

/// Decode a 32-bit instruction word.
pub fn decode(word: Word) -> Instruction {
    use opcodes::*;

    let rs = fields::rs(word);
    let rt = fields::rt(word);

    match fields::opcode(word) {
        SPECIAL => {
            let rd = fields::rd(word);
            match fields::funct(word) {
                FUNCT_ADD => Instruction::Add { rd, rs, rt },
                FUNCT_SUB => Instruction::Sub { rd, rs, rt },
                FUNCT_SLT => Instruction::Slt { rd, rs, rt },
                _ => Instruction::Unrecognized(word),
            }
        }
        ADDI => Instruction::Addi { rt, rs, imm: fields::imm(word) },
        BNE => Instruction::Bne { rs, rt, offset: fields::imm(word) },
        J => Instruction::J { target: fields::target(word) },
        JAL => Instruction::Jal { target: fields::target(word) },
        LW => Instruction::Lw { rt, rs, offset: fields::imm(word) },
        SW => Instruction::Sw { rt, rs, offset: fields::imm(word) },
        HALT => Instruction::Halt,
        CACHE => Instruction::Cache { code: fields::cache_code(word) },
        _ => Instruction::Unrecognized(word),
    }
}

/// Encode an instruction back to a word.
///
/// Fields wider than their slot are truncated, so `encode(decode(w))` keeps
/// every bit the decoder looks at.
pub fn encode(instr: &Instruction) -> Word {
    use opcodes::*;

    match *instr {
        Instruction::Add { rd, rs, rt } => fields::pack_r(rs, rt, rd, FUNCT_ADD),
        Instruction::Sub { rd, rs, rt } => fields::pack_r(rs, rt, rd, FUNCT_SUB),
        Instruction::Slt { rd, rs, rt } => fields::pack_r(rs, rt, rd, FUNCT_SLT),
        Instruction::Addi { rt, rs, imm } => fields::pack_i(ADDI, rs, rt, imm),
        Instruction::Bne { rs, rt, offset } => fields::pack_i(BNE, rs, rt, offset),
        Instruction::J { target } => fields::pack_j(J, target),
        Instruction::Jal { target } => fields::pack_j(JAL, target),
        Instruction::Lw { rt, rs, offset } => fields::pack_i(LW, rs, rt, offset),
        Instruction::Sw { rt, rs, offset } => fields::pack_i(SW, rs, rt, offset),
        Instruction::Cache { code } => fields::pack_j(CACHE, (code as Word) & fields::REG_MASK),
        Instruction::Halt => fields::pack_j(HALT, 0),
        Instruction::Unrecognized(word) => word,
    }
}
