//! Disassembler.
//!
//! Renders encoded words in the assembler's own syntax, so the output of
//! `disassemble_word` can be fed back to `assemble`.

use crate::isa::{Word, WORD_BYTES};
use crate::cpu::decode::{decode, Instruction};

/// Disassemble a single word to text.
pub fn disassemble_word(word: Word) -> String {
    format_instruction(&decode(word))
}

/// Disassemble a slice of words laid out from byte address `base`.
pub fn disassemble(words: &[Word], base: Word) -> String {
    let mut output = String::new();
    output.push_str("; minimips disassembly\n");
    output.push_str("; ---------------------\n\n");

    for (i, &word) in words.iter().enumerate() {
        let address = base.wrapping_add(i as Word * WORD_BYTES);
        output.push_str(&format!("{:04x}: {:08x}  {}\n", address, word, disassemble_word(word)));
    }

    output
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    match instr {
        // ALU
        Instruction::Add { rd, rs, rt } => format!("ADD,{},{},{}", rd, rs, rt),
        Instruction::Sub { rd, rs, rt } => format!("SUB,{},{},{}", rd, rs, rt),
        Instruction::Slt { rd, rs, rt } => format!("SLT,{},{},{}", rd, rs, rt),
        Instruction::Addi { rt, rs, imm } => format!("ADDI,{},{},{}", rt, rs, imm),

        // Control
        Instruction::Bne { rs, rt, offset } => format!("BNE,{},{},{}", rs, rt, offset),
        Instruction::J { target } => format!("J,{}", target),
        Instruction::Jal { target } => format!("JAL,{}", target),
        Instruction::Halt => "HALT".to_string(),

        // Memory
        Instruction::Lw { rt, rs, offset } => format!("LW,{},{}({})", rt, offset, rs),
        Instruction::Sw { rt, rs, offset } => format!("SW,{},{}({})", rt, offset, rs),
        Instruction::Cache { code } => format!("CACHE,{}", code),

        Instruction::Unrecognized(word) => format!("??? {:#010x}", word),
    }
}
