//! CPU emulation.
//!
//! This module implements the whole machine:
//! - a flat word-addressable memory bus
//! - an optional write-through cache in front of it
//! - 32 general-purpose registers and a byte-addressed PC
//! - an 11-instruction MIPS-like instruction set

pub mod bus;
pub mod cache;
pub mod registers;
pub mod decode;
pub mod execute;

pub use bus::{Bus, BusError, MemoryBus};
pub use cache::{Cache, CacheControl, CacheStats};
pub use registers::Registers;
pub use decode::{Instruction, decode, encode};
pub use execute::{Cpu, CpuError, CpuState};
