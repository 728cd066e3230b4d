//! Final machine state report.
//!
//! Captured once the CPU stops: the whole register file, PC and state, the
//! cache's status and counters, and the first words of memory.

use std::fmt;
use crate::isa::{Word, REGISTER_COUNT};
use crate::cpu::{Bus, CacheStats, Cpu, CpuState, MemoryBus};
use serde::{Serialize, Deserialize};

/// Number of leading memory words included in a report.
pub const REPORT_MEMORY_WORDS: usize = 16;

/// Snapshot of the machine after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub state: CpuState,
    pub cycles: u64,
    pub pc: Word,
    pub registers: Vec<Word>,
    pub cache_enabled: bool,
    pub cache_entries: usize,
    pub cache_stats: CacheStats,
    pub memory: Vec<Word>,
}

impl Report {
    /// Snapshot a CPU and the memory it ran against.
    pub fn capture(cpu: &Cpu<'_, MemoryBus>) -> Self {
        let bus = cpu.bus();
        let cache = cpu.cache();
        let count = REPORT_MEMORY_WORDS.min(bus.words());

        Self {
            state: cpu.state,
            cycles: cpu.cycles,
            pc: cpu.regs.pc,
            registers: cpu.regs.gpr.to_vec(),
            cache_enabled: cache.is_enabled(),
            cache_entries: cache.len(),
            cache_stats: cache.stats(),
            memory: bus.as_slice()[..count].to_vec(),
        }
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State:  {:?}", self.state)?;
        writeln!(f, "Cycles: {}", self.cycles)?;
        writeln!(f, "PC:     {:#010x}", self.pc)?;
        writeln!(f)?;

        writeln!(f, "Registers:")?;
        for row in 0..REGISTER_COUNT / 4 {
            for col in 0..4 {
                let i = row * 4 + col;
                write!(f, "  R{:<2} = {:#010x} ({:>11})", i, self.registers[i], self.registers[i] as i32)?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        write!(f, "Cache:  {}", if self.cache_enabled { "enabled" } else { "disabled" })?;
        write!(f, ", {} entries, {} hits, {} misses", self.cache_entries, self.cache_stats.hits, self.cache_stats.misses)?;
        if let Some(rate) = self.cache_stats.hit_rate() {
            write!(f, " ({:.1}% hit rate)", rate * 100.0)?;
        }
        writeln!(f)?;
        writeln!(f)?;

        writeln!(f, "Memory[0..{}]:", self.memory.len())?;
        for (i, chunk) in self.memory.chunks(4).enumerate() {
            write!(f, "  {:04x}:", i * 16)?;
            for word in chunk {
                write!(f, " {:08x}", word)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::asm::MemoryImage;
    use crate::cpu::Cache;
    use std::collections::BTreeMap;

    #[test]
    fn test_capture_after_run() {
        let program = assemble("CACHE,1\nADDI,R1,R0,7\nSW,R1,R0,60\nLW,R2,60(R0)\nHALT").unwrap();
        let image = MemoryImage::new(BTreeMap::new(), program);
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        let mut cpu = Cpu::new(&mut bus, &mut cache);
        cpu.reset(&image).unwrap();
        cpu.run().unwrap();

        let report = Report::capture(&cpu);

        assert_eq!(report.state, CpuState::Halted);
        assert_eq!(report.cycles, 5);
        assert_eq!(report.registers.len(), 32);
        assert_eq!(report.registers[1], 7);
        assert_eq!(report.registers[2], 7);
        assert_eq!(report.memory.len(), 16);
        assert_eq!(report.memory[15], 7);
        assert!(report.cache_enabled);
        // LW hit the entry SW wrote.
        assert_eq!(report.cache_stats.hits, 1);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut bus = MemoryBus::new(4);
        let mut cache = Cache::new();
        let cpu = Cpu::new(&mut bus, &mut cache);
        let report = Report::capture(&cpu);

        let json = report.to_json().unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.memory.len(), 4);
    }

    #[test]
    fn test_text_rendering() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        let mut cpu = Cpu::new(&mut bus, &mut cache);
        cpu.regs.gpr[31] = 0xFFFF_FFFF;

        let text = Report::capture(&cpu).to_string();
        assert!(text.contains("R31 = 0xffffffff (         -1)"));
        assert!(text.contains("Cache:  disabled, 0 entries"));
        assert!(text.contains("Memory[0..16]:"));
    }
}
