//! Memory images: initial data plus a program.
//!
//! The program is laid out immediately after the data: instruction `i` lands
//! at word index `data.len() + i`. Execution starts at that first program
//! word, so the data region is never fetched as code. A data address at or
//! past `data.len()` is overwritten by the program.

use std::collections::BTreeMap;
use std::path::Path;
use crate::isa::{Word, WORD_BYTES};
use crate::asm::{assembler, data, hexfile};
use crate::asm::assembler::AssemblerError;
use crate::asm::data::DataError;
use crate::asm::hexfile::HexFileError;
use thiserror::Error;

/// Everything the loader hands to the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    /// Initial memory by raw word index.
    pub data: BTreeMap<usize, Word>,
    /// Encoded program words.
    pub program: Vec<Word>,
}

impl MemoryImage {
    pub fn new(data: BTreeMap<usize, Word>, program: Vec<Word>) -> Self {
        Self { data, program }
    }

    /// Word index of the first program word.
    pub fn program_base(&self) -> usize {
        self.data.len()
    }

    /// Byte address of the first program word.
    pub fn entry_pc(&self) -> Word {
        self.program_base() as Word * WORD_BYTES
    }

    /// Data and program merged into one index -> value map.
    pub fn cells(&self) -> BTreeMap<usize, Word> {
        let base = self.program_base();
        let mut cells = self.data.clone();
        cells.extend(self.program.iter().enumerate().map(|(i, &w)| (base + i, w)));
        cells
    }
}

/// Load a program (and optional data file) from disk.
///
/// Files ending in `.hex` are read as word images; anything else is
/// assembled as an instruction file.
pub fn load_image(data_path: Option<&Path>, program_path: &Path) -> Result<MemoryImage, LoadError> {
    let data = match data_path {
        Some(path) => data::load_data(path)?,
        None => BTreeMap::new(),
    };

    let program = if program_path.extension().is_some_and(|ext| ext == "hex") {
        hexfile::load_words(program_path)?
    } else {
        let source = std::fs::read_to_string(program_path)
            .map_err(|e| LoadError::IoError(e.to_string()))?;
        assembler::assemble(&source)?
    };

    log::info!(
        "loaded {} data words and {} instructions (entry {:#x})",
        data.len(),
        program.len(),
        data.len() * WORD_BYTES as usize
    );

    Ok(MemoryImage::new(data, program))
}

/// Errors that can occur while loading a memory image.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("data file: {0}")]
    Data(#[from] DataError),

    #[error("assembly error: {0}")]
    Assembler(#[from] AssemblerError),

    #[error("word image: {0}")]
    HexFile(#[from] HexFileError),
}
