//! Loader, assembler and disassembler.
//!
//! This module provides:
//! - An assembler for comma-separated instruction files
//! - A parser for binary-addressed data files
//! - Memory image layout (data first, program after)
//! - A hex word image format and a disassembler

pub mod assembler;
pub mod data;
pub mod disasm;
pub mod hexfile;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use data::{load_data, parse_data, DataError};
pub use disasm::{disassemble, disassemble_word};
pub use hexfile::{load_words, save_words, HexFileError};
pub use image::{load_image, LoadError, MemoryImage};
