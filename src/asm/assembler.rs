//! Assembler for instruction files.
//!
//! One instruction per line, fields separated by commas:
//! ```text
//! ; Comment
//! ADDI,R1,R0,5        ; R1 := R0 + 5
//! ADD,R3,R1,R2        ; R3 := R1 + R2
//! BNE,R1,R2,2         ; skip two words if R1 != R2
//! LW,R4,8(R1)         ; R4 := MEM[R1 + 8]
//! SW,R4,R1,12         ; MEM[R1 + 12] := R4
//! CACHE,1             ; cache on
//! J,0
//! HALT
//! ```
//!
//! Register operands drop their first character and keep the low five bits of
//! the number that follows (`R7`, `r7` and `$7` are all register 7). Literals
//! are decimal or `0x` hex and are truncated to the width of their field.

use crate::isa::{fields, Reg, Word};
use crate::cpu::decode::{Instruction, encode};
use thiserror::Error;

/// Assemble source text to encoded words.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblerError> {
    Ok(parse_program(source)?.iter().map(encode).collect())
}

/// Parse source text to decoded instructions, one per non-blank line.
pub fn parse_program(source: &str) -> Result<Vec<Instruction>, AssemblerError> {
    let mut program = Vec::new();
    for (line_num, line) in source.lines().enumerate() {
        if let Some(instr) = parse_line(line, line_num + 1)? {
            program.push(instr);
        }
    }
    Ok(program)
}

/// Parse one line. Blank and comment-only lines yield `None`.
pub fn parse_line(line: &str, line_num: usize) -> Result<Option<Instruction>, AssemblerError> {
    // Remove inline comments
    let line = match line.find([';', '#']) {
        Some(idx) => &line[..idx],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut parts: Vec<&str> = line.split(',').map(str::trim).collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    let mnemonic = parts[0].to_uppercase();
    let ops = Operands {
        mnemonic: &mnemonic,
        args: &parts[1..],
        line: line_num,
    };

    let instr = match mnemonic.as_str() {
        "ADD" | "SUB" | "SLT" => {
            ops.expect(3)?;
            let (rd, rs, rt) = (ops.reg(0)?, ops.reg(1)?, ops.reg(2)?);
            match mnemonic.as_str() {
                "ADD" => Instruction::Add { rd, rs, rt },
                "SUB" => Instruction::Sub { rd, rs, rt },
                _ => Instruction::Slt { rd, rs, rt },
            }
        }

        "ADDI" => {
            ops.expect(3)?;
            Instruction::Addi { rt: ops.reg(0)?, rs: ops.reg(1)?, imm: ops.imm16(2)? }
        }

        "BNE" => {
            ops.expect(3)?;
            Instruction::Bne { rs: ops.reg(0)?, rt: ops.reg(1)?, offset: ops.imm16(2)? }
        }

        "J" | "JAL" => {
            ops.expect(1)?;
            let target = ops.literal(0)? as Word & fields::TARGET_MASK;
            if mnemonic == "J" {
                Instruction::J { target }
            } else {
                Instruction::Jal { target }
            }
        }

        "LW" | "SW" => {
            let (rt, rs, offset) = ops.memory_operands()?;
            if mnemonic == "LW" {
                Instruction::Lw { rt, rs, offset }
            } else {
                Instruction::Sw { rt, rs, offset }
            }
        }

        "CACHE" => {
            ops.expect(1)?;
            let code = (ops.literal(0)? as Word & fields::REG_MASK) as u8;
            Instruction::Cache { code }
        }

        "HALT" => {
            ops.expect(0)?;
            Instruction::Halt
        }

        _ => return Err(AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: parts[0].to_string(),
        }),
    };

    Ok(Some(instr))
}

/// Operand list of one line, with the context needed for error messages.
struct Operands<'a> {
    mnemonic: &'a str,
    args: &'a [&'a str],
    line: usize,
}

impl Operands<'_> {
    fn expect(&self, count: usize) -> Result<(), AssemblerError> {
        if self.args.len() != count {
            return Err(AssemblerError::OperandCount {
                line: self.line,
                mnemonic: self.mnemonic.to_string(),
                expected: count,
                found: self.args.len(),
            });
        }
        Ok(())
    }

    fn reg(&self, i: usize) -> Result<Reg, AssemblerError> {
        parse_register(self.args[i]).ok_or_else(|| AssemblerError::BadRegister {
            line: self.line,
            text: self.args[i].to_string(),
        })
    }

    fn literal(&self, i: usize) -> Result<i64, AssemblerError> {
        parse_literal(self.args[i]).ok_or_else(|| AssemblerError::BadLiteral {
            line: self.line,
            text: self.args[i].to_string(),
        })
    }

    fn imm16(&self, i: usize) -> Result<u16, AssemblerError> {
        Ok((self.literal(i)? as Word & fields::IMM_MASK) as u16)
    }

    /// `Rt,offset(Rs)` or `Rt,Rs,offset`.
    fn memory_operands(&self) -> Result<(Reg, Reg, u16), AssemblerError> {
        match self.args.len() {
            2 => {
                let rt = self.reg(0)?;
                let text = self.args[1];
                let bad = || AssemblerError::BadLiteral { line: self.line, text: text.to_string() };

                let open = text.find('(').ok_or_else(bad)?;
                let inner = text[open + 1..].strip_suffix(')').ok_or_else(bad)?;
                let rs = parse_register(inner.trim()).ok_or_else(|| AssemblerError::BadRegister {
                    line: self.line,
                    text: inner.to_string(),
                })?;
                let offset_text = text[..open].trim();
                let offset = if offset_text.is_empty() {
                    0
                } else {
                    parse_literal(offset_text).ok_or_else(bad)?
                };
                Ok((rt, rs, (offset as Word & fields::IMM_MASK) as u16))
            }
            3 => Ok((self.reg(0)?, self.reg(1)?, self.imm16(2)?)),
            found => Err(AssemblerError::OperandCount {
                line: self.line,
                mnemonic: self.mnemonic.to_string(),
                expected: 2,
                found,
            }),
        }
    }
}

/// Parse a register name: everything after the first character is the number.
pub fn parse_register(text: &str) -> Option<Reg> {
    let mut chars = text.chars();
    chars.next()?;
    let number: i64 = chars.as_str().parse().ok()?;
    Some(Reg::new(number as Word))
}

/// Parse a decimal or `0x` hex literal, optionally negative.
pub fn parse_literal(text: &str) -> Option<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} takes {expected} operands, found {found}")]
    OperandCount { line: usize, mnemonic: String, expected: usize, found: usize },

    #[error("bad register on line {line}: {text:?}")]
    BadRegister { line: usize, text: String },

    #[error("bad literal on line {line}: {text:?}")]
    BadLiteral { line: usize, text: String },
}
