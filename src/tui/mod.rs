//! TUI debugger for the simulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Program listing with the current instruction highlighted
//! - Registers, latches, zero flag and tick counter
//! - Data memory view and the output produced so far
//! - Step/run/breakpoint controls

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
