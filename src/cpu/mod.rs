//! Execution engine.
//!
//! The machine is split the way a microprogrammed processor is:
//! - [`ControlUnit`]: program counter, tick counter, instruction decode
//! - [`DataPath`]: registers, data memory, address/buffer latches, I/O ports
//! - [`Alu`]: integer operations and the shared zero flag

pub mod alu;
pub mod datapath;
pub mod control;

pub use alu::{Alu, AluError};
pub use datapath::{DataPath, DataPathError, decode_output};
pub use control::{ControlUnit, CpuError, MachineSnapshot, StepOutcome};
