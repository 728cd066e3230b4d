//! # minimips
//!
//! A small MIPS-like instruction-set simulator.
//!
//! The machine is a 32-register CPU running an 11-instruction subset of MIPS
//! against a flat word-addressable memory, with an optional write-through
//! cache sitting between them. The CPU borrows the bus and the cache; the
//! caller builds both and keeps them alive for the run:
//!
//! ```
//! use minimips::{assemble, Cache, Cpu, MemoryBus, MemoryImage};
//! use std::collections::BTreeMap;
//!
//! let program = assemble("ADDI,R1,R0,5\nADDI,R2,R0,10\nADD,R3,R1,R2\nHALT").unwrap();
//! let image = MemoryImage::new(BTreeMap::new(), program);
//!
//! let mut bus = MemoryBus::default();
//! let mut cache = Cache::new();
//! let mut cpu = Cpu::new(&mut bus, &mut cache);
//! cpu.reset(&image).unwrap();
//! cpu.run().unwrap();
//!
//! assert_eq!(cpu.regs.gpr[3], 15);
//! ```

pub mod isa;
pub mod cpu;
pub mod asm;
pub mod report;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use isa::{Reg, Word};
pub use cpu::{Bus, BusError, Cache, CacheControl, Cpu, CpuError, CpuState, Instruction, MemoryBus, Registers};
pub use asm::{assemble, disassemble, load_image, AssemblerError, LoadError, MemoryImage};
pub use report::Report;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
