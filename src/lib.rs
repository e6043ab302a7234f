//! # Accumulator machine simulator
//!
//! A tick-accurate simulator for a small microprogrammed register machine,
//! plus the assembler that targets it.
//!
//! Every instruction is executed as a short sequence of datapath signals
//! (address latch, buffer latch, register latch, memory write) separated by
//! clock ticks, so tick counts match what the hardware would take.

pub mod isa;
pub mod cpu;
pub mod asm;
pub mod sim;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use isa::{MachineCode, Opcode, Operation, ProgramImage, load_image, save_image};
pub use cpu::{ControlUnit, DataPath, CpuError, StepOutcome};
pub use asm::{translate, disassemble, TranslateError};
pub use sim::{simulate, run_source, SimConfig, SimReport, StopReason};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
