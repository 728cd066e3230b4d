//! Debugger application state and logic.

use std::collections::HashSet;
use crate::{Cache, Cpu, MemoryBus, MemoryImage, Word};
use crate::isa::WORD_BYTES;
use crate::asm::disasm::{disassemble_word, format_instruction};

/// Debugger application state.
pub struct DebuggerApp<'a> {
    /// The CPU being debugged.
    pub cpu: Cpu<'a>,
    /// Image to reload on reset.
    pub image: MemoryImage,
    /// Breakpoints (by byte address).
    pub breakpoints: HashSet<Word>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in words.
    pub mem_scroll: usize,
    /// Run past a breakpoint at the PC `run` started from.
    resuming: bool,
}

impl<'a> DebuggerApp<'a> {
    /// Create a debugger and load `image` into the CPU's memory.
    pub fn new(mut cpu: Cpu<'a>, image: MemoryImage) -> Self {
        let status = match cpu.reset(&image) {
            Ok(()) => "Ready. Press 's' to step, 'r' to run, 'q' to quit.".to_string(),
            Err(e) => format!("Failed to load image: {}", e),
        };

        Self {
            cpu,
            image,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status,
            mem_scroll: 0,
            resuming: false,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step() {
            Ok(instr) => {
                self.status = format!("PC={:04x}: {}", pc, format_instruction(&instr));
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.resuming = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Stopped ({:?}) after {} cycles", self.cpu.state, self.cpu.cycles);
            return;
        }

        // Check for breakpoint
        let pc = self.cpu.regs.pc;
        if !std::mem::take(&mut self.resuming) && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:04x}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:04x}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:04x}", pc);
        }
    }

    /// Reset CPU, cache and memory to the loaded image.
    pub fn reset(&mut self) {
        self.running = false;
        self.status = match self.cpu.reset(&self.image) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Reset failed: {}", e),
        };
    }

    /// Get disassembly around current PC: (byte address, text, is_current).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(Word, String, bool)> {
        let bus = self.cpu.bus();
        let pc_index = (self.cpu.regs.pc / WORD_BYTES) as usize;
        let start = pc_index.saturating_sub(lines / 2);

        bus.dump(start, lines)
            .into_iter()
            .map(|(index, word)| {
                let address = index as Word * WORD_BYTES;
                (address, disassemble_word(word), address == self.cpu.regs.pc)
            })
            .collect()
    }

    /// Scroll the memory view, clamped to memory size.
    pub fn scroll_memory(&mut self, delta: isize) {
        let max = self.cpu.bus().as_slice().len().saturating_sub(1);
        self.mem_scroll = self.mem_scroll.saturating_add_signed(delta).min(max);
    }
}

/// Run the debugger with a program.
pub fn run_debugger(image: MemoryImage, memory_words: usize) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut bus = MemoryBus::new(memory_words);
    let mut cache = Cache::new();
    let mut app = DebuggerApp::new(Cpu::new(&mut bus, &mut cache), image);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        KeyCode::PageUp => app.scroll_memory(-16),
                        KeyCode::PageDown => app.scroll_memory(16),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
