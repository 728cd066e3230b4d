//! Memory bus.
//!
//! A flat array of words. Run-time accesses are byte-addressed and resolve to
//! the word at `address / 4`; the initial load path writes raw word indices.

use std::collections::BTreeMap;
use crate::isa::{Word, WORD_BYTES, DEFAULT_MEMORY_WORDS};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Backing store seen by the cache.
///
/// `MemoryBus` is the only production implementation. The trait exists so the
/// cache can be exercised against a counting mock.
#[cfg_attr(test, mockall::automock)]
pub trait Bus {
    /// Read the word containing `address`.
    fn read(&self, address: Word) -> Result<Word, BusError>;

    /// Write the word containing `address`.
    fn write(&mut self, address: Word, value: Word) -> Result<(), BusError>;

    /// Number of addressable words.
    fn words(&self) -> usize;

    /// Number of addressable bytes.
    fn byte_len(&self) -> u64 {
        self.words() as u64 * WORD_BYTES as u64
    }
}

/// Word-addressable main memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryBus {
    cells: Vec<Word>,
}

impl MemoryBus {
    /// Create a bus with `words` zeroed cells.
    pub fn new(words: usize) -> Self {
        Self {
            cells: vec![0; words],
        }
    }

    /// Store initial values by raw word index (not divided by 4).
    ///
    /// Stops at the first index that does not fit; earlier entries stay written.
    pub fn load(&mut self, values: &BTreeMap<usize, Word>) -> Result<(), BusError> {
        for (&index, &value) in values {
            let words = self.cells.len();
            let cell = self.cells.get_mut(index).ok_or(BusError::IndexOutOfRange {
                index,
                words,
            })?;
            *cell = value;
        }
        Ok(())
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Copy out `count` words starting at word index `start`, clipped to the
    /// end of memory.
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }

    /// All cells in index order.
    pub fn as_slice(&self) -> &[Word] {
        &self.cells
    }

    /// Word at a raw index, if it exists.
    pub fn peek(&self, index: usize) -> Option<Word> {
        self.cells.get(index).copied()
    }

    fn index_of(&self, address: Word) -> Result<usize, BusError> {
        let index = (address / WORD_BYTES) as usize;
        if index >= self.cells.len() {
            return Err(BusError::OutOfRange {
                address,
                index,
                words: self.cells.len(),
            });
        }
        Ok(index)
    }
}

impl Bus for MemoryBus {
    #[inline]
    fn read(&self, address: Word) -> Result<Word, BusError> {
        let index = self.index_of(address)?;
        Ok(self.cells[index])
    }

    #[inline]
    fn write(&mut self, address: Word, value: Word) -> Result<(), BusError> {
        let index = self.index_of(address)?;
        self.cells[index] = value;
        Ok(())
    }

    fn words(&self) -> usize {
        self.cells.len()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WORDS)
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();

        f.debug_struct("MemoryBus")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors raised by bus accesses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A byte address resolved to a word index past the end of memory.
    #[error("address {address:#010x} (word {index}) out of range (memory has {words} words)")]
    OutOfRange { address: Word, index: usize, words: usize },

    /// An initial-load index past the end of memory.
    #[error("load index {index} out of range (memory has {words} words)")]
    IndexOutOfRange { index: usize, words: usize },
}
