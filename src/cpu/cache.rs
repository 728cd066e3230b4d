//! Write-through cache between the CPU and the bus.
//!
//! The cache is a plain map from word-aligned byte address to word. There is
//! no eviction: every address touched while the cache is enabled stays
//! resident until the next flush or disable. That is a known limitation of
//! this model, fine for the small programs it runs.

use std::collections::HashMap;
use crate::cpu::bus::{Bus, BusError};
use crate::isa::{align_word, Word};
use serde::{Serialize, Deserialize};

/// Operation selected by a CACHE instruction's control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheControl {
    /// Code 0: turn the cache off and drop every entry.
    Disable,
    /// Code 1: turn the cache on.
    Enable,
    /// Code 2: drop every entry, leave the enabled flag alone.
    Flush,
}

impl CacheControl {
    /// Map a control code. Codes other than 0, 1, 2 select nothing.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(CacheControl::Disable),
            1 => Some(CacheControl::Enable),
            2 => Some(CacheControl::Flush),
            _ => None,
        }
    }

    /// The control code for this operation.
    pub fn code(self) -> u32 {
        match self {
            CacheControl::Disable => 0,
            CacheControl::Enable => 1,
            CacheControl::Flush => 2,
        }
    }
}

/// Hit/miss counters. Only accesses made while enabled are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of counted reads that hit, or `None` before any read.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

/// Write-through cache. Starts disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    enabled: bool,
    entries: HashMap<Word, Word>,
    stats: CacheStats,
}

impl Cache {
    /// Create a disabled, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a raw control code. Unknown codes are ignored.
    pub fn set_state(&mut self, code: u32) {
        match CacheControl::from_code(code) {
            Some(control) => self.apply(control),
            None => log::debug!("cache: ignoring unknown control code {}", code),
        }
    }

    /// Apply a control operation.
    pub fn apply(&mut self, control: CacheControl) {
        match control {
            CacheControl::Disable => {
                self.enabled = false;
                self.entries.clear();
            }
            CacheControl::Enable => self.enabled = true,
            CacheControl::Flush => self.entries.clear(),
        }
        log::debug!("cache: {:?} -> enabled={} entries={}", control, self.enabled, self.entries.len());
    }

    /// Read through the cache.
    ///
    /// A hit never touches the bus. A miss is counted, then reads the bus and,
    /// while enabled, keeps the value for next time.
    pub fn read<B: Bus + ?Sized>(&mut self, address: Word, bus: &B) -> Result<Word, BusError> {
        let key = align_word(address);

        if self.enabled {
            if let Some(&value) = self.entries.get(&key) {
                self.stats.hits += 1;
                return Ok(value);
            }
            // A faulting read still counts as a miss.
            self.stats.misses += 1;
        }

        let value = bus.read(address)?;
        if self.enabled {
            self.entries.insert(key, value);
        }
        Ok(value)
    }

    /// Write through to the bus, updating the entry while enabled.
    pub fn write<B: Bus + ?Sized>(&mut self, address: Word, value: Word, bus: &mut B) -> Result<(), BusError> {
        bus.write(address, value)?;
        if self.enabled {
            self.entries.insert(align_word(address), value);
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the word containing `address` is resident.
    pub fn contains(&self, address: Word) -> bool {
        self.entries.contains_key(&align_word(address))
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Back to the power-on state: disabled, empty, counters zeroed.
    pub fn reset(&mut self) {
        self.enabled = false;
        self.entries.clear();
        self.stats = CacheStats::default();
    }
}
