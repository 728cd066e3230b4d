//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! The CPU borrows its bus and cache for its whole life; the caller owns them.

use crate::isa::{Word, WORD_BYTES, LINK_REGISTER};
use crate::cpu::{Bus, Cache, MemoryBus, Registers};
use crate::cpu::bus::BusError;
use crate::cpu::decode::{self, Instruction};
use crate::asm::MemoryImage;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU executed HALT.
    Halted,
    /// PC left the addressable range; execution stopped without a fault.
    PcOutOfRange,
    /// A bus access failed.
    Faulted,
}

/// The CPU.
pub struct Cpu<'a, B: Bus = MemoryBus> {
    /// CPU registers.
    pub regs: Registers,
    /// Current execution state.
    pub state: CpuState,
    /// Retired instruction count.
    pub cycles: u64,
    bus: &'a mut B,
    cache: &'a mut Cache,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl<'a, B: Bus> Cpu<'a, B> {
    /// Create a CPU with zeroed registers, borrowing `bus` and `cache`.
    pub fn new(bus: &'a mut B, cache: &'a mut Cache) -> Self {
        Self {
            regs: Registers::new(),
            state: CpuState::Running,
            cycles: 0,
            bus,
            cache,
            last_instr: None,
        }
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. A bus error
    /// leaves the CPU in [`CpuState::Faulted`].
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let raw = match self.fetch() {
            Ok(raw) => raw,
            Err(e) => return Err(self.fault(e)),
        };
        let instr = decode::decode(raw);

        log::trace!("execute: {:?}", instr);
        if let Err(e) = self.execute(instr) {
            return Err(self.fault(e));
        }

        self.cycles += 1;
        self.last_instr = Some(instr);

        if self.state == CpuState::Running && !self.pc_in_range() {
            log::warn!("PC {:#010x} out of range, stopping", self.regs.pc);
            self.state = CpuState::PcOutOfRange;
        }

        Ok(instr)
    }

    /// Run until halt, out-of-range PC, or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.guard_pc() {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.cycles < limit && self.guard_pc() {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Read the word at PC through the cache and advance PC.
    fn fetch(&mut self) -> Result<Word, BusError> {
        let pc = self.regs.pc;
        let raw = self.cache.read(pc, &*self.bus)?;
        log::trace!("fetch: {:#034b} from {:#010x}", raw, pc);
        self.regs.advance_pc();
        Ok(raw)
    }

    /// Execute a decoded instruction. PC already points at the next word.
    fn execute(&mut self, instr: Instruction) -> Result<(), BusError> {
        match instr {
            // ==================== ALU ====================

            Instruction::Add { rd, rs, rt } => {
                let value = self.regs.get(rs).wrapping_add(self.regs.get(rt));
                self.regs.set(rd, value);
            }

            Instruction::Sub { rd, rs, rt } => {
                let value = self.regs.get(rs).wrapping_sub(self.regs.get(rt));
                self.regs.set(rd, value);
            }

            Instruction::Slt { rd, rs, rt } => {
                let less = (self.regs.get(rs) as i32) < (self.regs.get(rt) as i32);
                self.regs.set(rd, less as Word);
            }

            Instruction::Addi { rt, rs, imm } => {
                let value = self.regs.get(rs).wrapping_add(imm as Word);
                self.regs.set(rt, value);
            }

            // ==================== Control Flow ====================

            Instruction::Bne { rs, rt, offset } => {
                if self.regs.get(rs) != self.regs.get(rt) {
                    self.regs.branch(offset as Word);
                }
            }

            Instruction::J { target } => {
                self.regs.jump(target.wrapping_mul(WORD_BYTES));
            }

            Instruction::Jal { target } => {
                let ret = self.regs.pc;
                self.regs.set(LINK_REGISTER, ret);
                self.regs.jump(target.wrapping_mul(WORD_BYTES));
            }

            Instruction::Halt => {
                self.state = CpuState::Halted;
            }

            // ==================== Memory ====================

            Instruction::Lw { rt, rs, offset } => {
                let address = self.regs.get(rs).wrapping_add(offset as Word);
                let value = self.cache.read(address, &*self.bus)?;
                self.regs.set(rt, value);
            }

            Instruction::Sw { rt, rs, offset } => {
                let address = self.regs.get(rs).wrapping_add(offset as Word);
                self.cache.write(address, self.regs.get(rt), &mut *self.bus)?;
            }

            Instruction::Cache { code } => {
                self.enable_cache(code as u32);
            }

            // ==================== Other ====================

            Instruction::Unrecognized(word) => {
                log::debug!("ignoring unrecognized instruction {:#010x}", word);
            }
        }

        Ok(())
    }

    /// Enable, disable or flush the cache by control code.
    pub fn enable_cache(&mut self, code: u32) {
        self.cache.set_state(code);
    }

    fn fault(&mut self, e: BusError) -> CpuError {
        log::error!("bus fault at PC {:#010x}: {}", self.regs.pc, e);
        self.state = CpuState::Faulted;
        CpuError::Bus(e)
    }

    /// True while running with PC inside memory. Stops the CPU otherwise.
    fn guard_pc(&mut self) -> bool {
        if self.state != CpuState::Running {
            return false;
        }
        if !self.pc_in_range() {
            log::warn!("PC {:#010x} out of range, stopping", self.regs.pc);
            self.state = CpuState::PcOutOfRange;
            return false;
        }
        true
    }

    fn pc_in_range(&self) -> bool {
        (self.regs.pc as u64) < self.bus.byte_len()
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    pub fn bus(&self) -> &B {
        &*self.bus
    }

    pub fn cache(&self) -> &Cache {
        &*self.cache
    }
}

impl Cpu<'_, MemoryBus> {
    /// Restore power-on state and reload `image`.
    ///
    /// If the image does not fit in memory the CPU is left `Faulted` with
    /// whatever part of the image was loaded.
    pub fn reset(&mut self, image: &MemoryImage) -> Result<(), BusError> {
        self.cache.reset();
        self.regs.reset();
        self.cycles = 0;
        self.last_instr = None;
        self.bus.clear();

        if let Err(e) = self.bus.load(&image.cells()) {
            log::error!("image does not fit in memory: {}", e);
            self.state = CpuState::Faulted;
            return Err(e);
        }

        self.regs.pc = image.entry_pc();
        self.state = CpuState::Running;
        Ok(())
    }
}

impl<B: Bus> std::fmt::Debug for Cpu<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::isa::Reg;
    use std::collections::BTreeMap;
    use proptest::prelude::*;

    fn load(bus: &mut MemoryBus, instructions: &[Instruction]) {
        let cells: BTreeMap<usize, Word> = instructions
            .iter()
            .enumerate()
            .map(|(i, instr)| (i, encode(instr)))
            .collect();
        bus.load(&cells).unwrap();
    }

    fn addi(rt: u8, rs: u8, imm: u16) -> Instruction {
        Instruction::Addi { rt: Reg(rt), rs: Reg(rs), imm }
    }

    #[test]
    fn test_cpu_halt() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[Instruction::Halt]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.gpr, [0; 32]);
        assert_eq!(cpu.regs.pc, 4);
    }

    #[test]
    fn test_halt_leaves_registers_and_memory() {
        let mut bus = MemoryBus::new(8);
        let mut cache = Cache::new();
        bus.load(&BTreeMap::from([(0, encode(&Instruction::Halt)), (3, 7), (7, 99)])).unwrap();
        let mut cpu = Cpu::new(&mut bus, &mut cache);
        cpu.regs.gpr[31] = 0xDEAD_BEEF;
        cpu.regs.gpr[4] = 12;

        let registers = cpu.regs.gpr;
        let memory = cpu.bus().as_slice().to_vec();

        cpu.step().unwrap();

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.gpr, registers);
        assert_eq!(cpu.bus().as_slice(), &memory[..]);
    }

    #[test]
    fn test_add_immediates_end_to_end() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            addi(1, 0, 5),
            addi(2, 0, 10),
            Instruction::Add { rd: Reg(3), rs: Reg(1), rt: Reg(2) },
            Instruction::Halt,
        ]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.gpr[1], 5);
        assert_eq!(cpu.regs.gpr[2], 10);
        assert_eq!(cpu.regs.gpr[3], 15);
        assert!(!cpu.is_running());
    }

    #[test]
    fn test_halt_stops_before_following_instructions() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[Instruction::Halt, addi(1, 0, 1)]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        assert_eq!(cpu.run().unwrap(), 1);
        assert_eq!(cpu.regs.gpr[1], 0);
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Halted)));
    }

    #[test]
    fn test_bne_taken_is_relative_to_next_pc() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            addi(1, 0, 1),
            Instruction::Bne { rs: Reg(1), rt: Reg(0), offset: 2 },
        ]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.step().unwrap();
        cpu.step().unwrap();

        // Fetched at 4, next PC 8, plus 2 words.
        assert_eq!(cpu.regs.pc, 16);
    }

    #[test]
    fn test_bne_not_taken_falls_through() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[Instruction::Bne { rs: Reg(1), rt: Reg(2), offset: 7 }]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 4);
    }

    #[test]
    fn test_bne_skips_instruction() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            addi(1, 0, 1),
            Instruction::Bne { rs: Reg(1), rt: Reg(0), offset: 1 },
            addi(2, 0, 99), // skipped
            Instruction::Halt,
        ]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 3);
        assert_eq!(cpu.regs.gpr[2], 0);
    }

    #[test]
    fn test_jump_and_link() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            Instruction::Jal { target: 3 },
            Instruction::Halt,
            Instruction::Halt,
            addi(5, 0, 1),
            Instruction::J { target: 1 },
        ]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 12);
        assert_eq!(cpu.regs.gpr[31], 4);

        cpu.run().unwrap();
        assert_eq!(cpu.regs.gpr[5], 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 8);
    }

    #[test]
    fn test_jump_target_truncates_to_32_bits() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[Instruction::J { target: 0x03FF_FFFF }]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 0x0FFF_FFFC);
        assert_eq!(cpu.state, CpuState::PcOutOfRange);
    }

    #[test]
    fn test_load_store_roundtrip_with_and_without_cache() {
        for code in [0u8, 1] {
            let mut bus = MemoryBus::default();
            let mut cache = Cache::new();
            load(&mut bus, &[
                Instruction::Cache { code },
                addi(1, 0, 0x200),
                addi(2, 0, 1234),
                Instruction::Sw { rt: Reg(2), rs: Reg(1), offset: 8 },
                Instruction::Lw { rt: Reg(3), rs: Reg(1), offset: 8 },
                Instruction::Halt,
            ]);
            let mut cpu = Cpu::new(&mut bus, &mut cache);

            cpu.run().unwrap();

            assert_eq!(cpu.regs.gpr[3], 1234);
            assert_eq!(cpu.bus().read(0x208).unwrap(), 1234);
            assert_eq!(cpu.cache().is_enabled(), code == 1);
        }
    }

    #[test]
    fn test_fetch_goes_through_cache() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            Instruction::Cache { code: 1 },
            Instruction::J { target: 2 },
            Instruction::Halt,
        ]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.run().unwrap();

        // CACHE itself was fetched while disabled; J and HALT were cached.
        assert!(!cpu.cache().contains(0));
        assert!(cpu.cache().contains(4));
        assert!(cpu.cache().contains(8));
        assert_eq!(cpu.cache().stats().misses, 2);
    }

    #[test]
    fn test_unknown_opcode_is_noop() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        let cells = BTreeMap::from([
            (0, 0x0F << 26),
            (1, (1 << 11) | 0x24),
            (2, encode(&Instruction::Halt)),
        ]);
        bus.load(&cells).unwrap();
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        assert_eq!(cpu.run().unwrap(), 3);
        assert_eq!(cpu.regs.gpr, [0; 32]);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_pc_out_of_range_stops_without_error() {
        let mut bus = MemoryBus::new(4);
        let mut cache = Cache::new();
        let mut cpu = Cpu::new(&mut bus, &mut cache);
        cpu.regs.pc = 16;

        assert_eq!(cpu.run(), Ok(0));
        assert_eq!(cpu.state, CpuState::PcOutOfRange);
        assert!(!cpu.is_running());
    }

    #[test]
    fn test_running_off_the_end_stops() {
        // All-zero memory decodes as an unknown funct and is skipped.
        let mut bus = MemoryBus::new(4);
        let mut cache = Cache::new();
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        assert_eq!(cpu.run(), Ok(4));
        assert_eq!(cpu.state, CpuState::PcOutOfRange);
        assert_eq!(cpu.regs.pc, 16);
    }

    #[test]
    fn test_load_fault_is_fatal() {
        let mut bus = MemoryBus::new(8);
        let mut cache = Cache::new();
        load(&mut bus, &[
            addi(1, 0, 0x1000),
            Instruction::Lw { rt: Reg(2), rs: Reg(1), offset: 0 },
            Instruction::Halt,
        ]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        let err = cpu.run().unwrap_err();

        assert!(matches!(err, CpuError::Bus(BusError::OutOfRange { address: 0x1000, .. })));
        assert_eq!(cpu.state, CpuState::Faulted);
        assert_eq!(cpu.cycles, 1);
    }

    #[test]
    fn test_run_limited() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[Instruction::J { target: 0 }]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        assert_eq!(cpu.run_limited(10), Ok(10));
        assert!(cpu.is_running());
        assert_eq!(cpu.last_instruction(), Some(Instruction::J { target: 0 }));
    }

    fn cache_word(code: Word) -> Word {
        ((decode::opcodes::CACHE as Word) << 26) | code
    }

    #[test]
    fn test_cache_flush_instruction() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            Instruction::Cache { code: 1 },
            Instruction::J { target: 2 },
        ]);
        // 34 keeps only its low five bits: flush.
        bus.load(&BTreeMap::from([(2, cache_word(34)), (3, encode(&Instruction::Halt))])).unwrap();
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.cache().len(), 1);

        assert_eq!(cpu.step().unwrap(), Instruction::Cache { code: 2 });
        assert!(cpu.cache().is_enabled());
        assert!(cpu.cache().is_empty());

        cpu.run().unwrap();
        assert!(cpu.is_halted());
        assert!(cpu.cache().contains(12));
    }

    #[test]
    fn test_unknown_cache_code_is_noop() {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[
            Instruction::Cache { code: 1 },
            Instruction::J { target: 2 },
        ]);
        bus.load(&BTreeMap::from([(2, cache_word(5)), (3, cache_word(37))])).unwrap();
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.step().unwrap(), Instruction::Cache { code: 5 });
        assert!(cpu.cache().is_enabled());
        assert_eq!(cpu.cache().len(), 2);

        assert_eq!(cpu.step().unwrap(), Instruction::Cache { code: 5 });
        assert!(cpu.cache().is_enabled());
        assert_eq!(cpu.cache().len(), 3);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_reset_rejects_oversized_image() {
        let image = MemoryImage::new(
            BTreeMap::from([(0, 1), (1, 2), (2, 3)]),
            vec![encode(&Instruction::Halt), encode(&Instruction::Halt)],
        );
        let mut bus = MemoryBus::new(4);
        let mut cache = Cache::new();
        cache.set_state(1);
        let mut cpu = Cpu::new(&mut bus, &mut cache);
        cpu.regs.gpr[5] = 9;
        cpu.regs.pc = 8;
        cpu.cycles = 3;

        assert_eq!(
            cpu.reset(&image),
            Err(BusError::IndexOutOfRange { index: 4, words: 4 })
        );
        assert_eq!(cpu.state, CpuState::Faulted);
        assert_eq!(cpu.regs.gpr, [0; 32]);
        assert_eq!(cpu.regs.pc, 0);
        assert_eq!(cpu.cycles, 0);
        assert!(!cpu.cache().is_enabled());
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Faulted)));
    }

    #[test]
    fn test_reset_reloads_image() {
        let image = MemoryImage::new(
            BTreeMap::from([(0, 3)]),
            vec![encode(&addi(1, 0, 2)), encode(&Instruction::Halt)],
        );
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        let mut cpu = Cpu::new(&mut bus, &mut cache);

        cpu.reset(&image).unwrap();
        assert_eq!(cpu.regs.pc, 4);
        cpu.run().unwrap();
        assert_eq!(cpu.regs.gpr[1], 2);

        cpu.reset(&image).unwrap();
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.gpr[1], 0);
        assert_eq!(cpu.cycles, 0);
    }

    fn run_single(instr: Instruction, setup: &[(usize, Word)]) -> Registers {
        let mut bus = MemoryBus::default();
        let mut cache = Cache::new();
        load(&mut bus, &[instr]);
        let mut cpu = Cpu::new(&mut bus, &mut cache);
        for &(reg, value) in setup {
            cpu.regs.gpr[reg] = value;
        }
        cpu.step().unwrap();
        cpu.regs.clone()
    }

    proptest! {
        #[test]
        fn prop_alu_writes_only_rd(
            rs in 0u8..32, rt in 0u8..32, rd in 0u8..32,
            a in any::<u32>(), b in any::<u32>(),
            op in 0usize..3
        ) {
            let (rs, rt, rd) = (Reg(rs), Reg(rt), Reg(rd));
            let instr = match op {
                0 => Instruction::Add { rd, rs, rt },
                1 => Instruction::Sub { rd, rs, rt },
                _ => Instruction::Slt { rd, rs, rt },
            };
            let mut before = Registers::new();
            before.set(rs, a);
            before.set(rt, b);
            let (x, y) = (before.get(rs), before.get(rt));

            let after = run_single(instr, &[(rs.index(), before.get(rs)), (rt.index(), before.get(rt))]);

            let expected = match op {
                0 => x.wrapping_add(y),
                1 => x.wrapping_sub(y),
                _ => ((x as i32) < (y as i32)) as Word,
            };
            prop_assert_eq!(after.get(rd), expected);
            for i in 0..32 {
                if i != rd.index() {
                    prop_assert_eq!(after.gpr[i], before.gpr[i]);
                }
            }
        }

        #[test]
        fn prop_addi_zero_extends(rs in 0u8..32, rt in 0u8..32, a in any::<u32>(), imm in any::<u16>()) {
            let after = run_single(addi(rt, rs, imm), &[(rs as usize, a)]);
            prop_assert_eq!(after.gpr[rt as usize], a.wrapping_add(imm as Word));
        }

        #[test]
        fn prop_bne_target(a in any::<u32>(), b in any::<u32>(), offset in 0u16..200) {
            let after = run_single(
                Instruction::Bne { rs: Reg(1), rt: Reg(2), offset },
                &[(1, a), (2, b)],
            );
            let expected = if a != b { 4 + offset as Word * 4 } else { 4 };
            prop_assert_eq!(after.pc, expected);
        }
    }
}
