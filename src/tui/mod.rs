//! TUI debugger for the simulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register file and PC view
//! - Cache status and hit/miss counters
//! - Memory view
//! - Step/run/breakpoint controls
//! - Disassembly view

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
