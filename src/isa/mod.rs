//! Instruction set and memory model.
//!
//! Every word of the machine, whether it lives in program memory or in
//! data memory, is a [`MachineCode`]: an index, a tag and a list of integer
//! arguments. Program words carry instruction opcodes; data words carry one
//! of the `NUMBER`/`STRING`/`BUFFER` tags and a single mutable payload.

pub mod image;

use serde::{Serialize, Deserialize};
use std::fmt;

pub use image::{ProgramImage, ImageError, load_image, save_image};

/// Operand value that reads the next input character on `LOAD_V`.
pub const INPUT_MAP: i64 = 0;

/// Operand value that appends to the output on `STORE_V`.
pub const OUTPUT_MAP: i64 = 1;

/// ALU operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Cmp,
    Add,
    Mul,
    Mod,
}

/// Instruction and data tags.
///
/// Serialized as the lowercase mnemonic (`"load_v"`, `"jz_r"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    // ==================== Control Flow ====================

    /// Stop the program.
    Hlt,
    /// `[v]` jump to address.
    Jmp,
    /// `[v]` jump if the zero flag is set.
    Jz,
    /// `[v] [r]` jump if the register holds 0.
    JzR,

    // ==================== Transfer ====================

    /// `[r] [v]` register := literal.
    Mov,
    /// `[r] [v]` register := memory at literal address.
    LoadV,
    /// `[r] [r]` register := memory at register address.
    LoadR,
    /// `[v] [r]` memory at literal address := register.
    StoreV,
    /// `[r] [r]` memory at register address := register.
    StoreR,
    /// `[r] [r]` increment the pointer register, then load through it.
    Next,

    // ==================== Arithmetic ====================

    /// `[r] [v]` set the zero flag if register == literal.
    Cmp,
    /// `[r]` register += 1.
    Inc,
    /// `[v] [v] [r]` memory[a] := memory[b] + register.
    AddMmr,
    /// `[r] [r] [v]` register := register mod literal.
    ModRrv,
    /// `[r] [v] [r]` register := literal * register.
    Linear,
    /// `[r] [v] [r]` register += literal * register.
    LinearCont,

    // ==================== Data ====================

    Number,
    String,
    Buffer,
}

/// Shape of a single instruction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Register index.
    Reg,
    /// Literal value, label or address.
    Val,
}

impl Opcode {
    /// Every tag, in declaration order.
    pub const ALL: [Opcode; 19] = [
        Opcode::Hlt, Opcode::Jmp, Opcode::Jz, Opcode::JzR,
        Opcode::Mov, Opcode::LoadV, Opcode::LoadR, Opcode::StoreV, Opcode::StoreR, Opcode::Next,
        Opcode::Cmp, Opcode::Inc, Opcode::AddMmr, Opcode::ModRrv, Opcode::Linear, Opcode::LinearCont,
        Opcode::Number, Opcode::String, Opcode::Buffer,
    ];

    /// Lowercase mnemonic used by the assembler and the image format.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "hlt",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::JzR => "jz_r",
            Opcode::Mov => "mov",
            Opcode::LoadV => "load_v",
            Opcode::LoadR => "load_r",
            Opcode::StoreV => "store_v",
            Opcode::StoreR => "store_r",
            Opcode::Next => "next",
            Opcode::Cmp => "cmp",
            Opcode::Inc => "inc",
            Opcode::AddMmr => "add_mmr",
            Opcode::ModRrv => "mod_rrv",
            Opcode::Linear => "linear",
            Opcode::LinearCont => "linear_cont",
            Opcode::Number => "number",
            Opcode::String => "string",
            Opcode::Buffer => "buffer",
        }
    }

    /// Look up a tag by mnemonic, ignoring case.
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        let lower = text.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|op| op.mnemonic() == lower)
    }

    /// Tags that may only appear in the data segment.
    pub fn is_data(self) -> bool {
        matches!(self, Opcode::Number | Opcode::String | Opcode::Buffer)
    }

    /// Opcodes resolved directly by the control unit.
    pub fn is_control_flow(self) -> bool {
        matches!(self, Opcode::Hlt | Opcode::Jmp | Opcode::Jz | Opcode::JzR)
    }

    /// Argument layout expected by this opcode.
    pub fn signature(self) -> &'static [ArgKind] {
        use ArgKind::{Reg, Val};
        match self {
            Opcode::Hlt => &[],
            Opcode::Jmp | Opcode::Jz => &[Val],
            Opcode::JzR => &[Val, Reg],
            Opcode::Mov | Opcode::LoadV | Opcode::Cmp => &[Reg, Val],
            Opcode::LoadR | Opcode::StoreR | Opcode::Next => &[Reg, Reg],
            Opcode::StoreV => &[Val, Reg],
            Opcode::Inc => &[Reg],
            Opcode::AddMmr => &[Val, Val, Reg],
            Opcode::ModRrv => &[Reg, Reg, Val],
            Opcode::Linear | Opcode::LinearCont => &[Reg, Val, Reg],
            Opcode::Number | Opcode::String | Opcode::Buffer => &[Val],
        }
    }

    /// Signal sequence executed by the control unit for this opcode.
    ///
    /// Returns `None` for control flow and data tags. Every sequence is
    /// followed by the program counter advance and one final tick.
    pub fn micro_program(self) -> Option<&'static [MicroStep]> {
        use MicroStep::*;
        use Step::{First, Second};
        let program: &'static [MicroStep] = match self {
            Opcode::Mov | Opcode::Inc => &[LatchRegister(First)],
            Opcode::LoadV | Opcode::LoadR => &[
                LatchDataAddress(First), Tick,
                LatchRegister(First),
            ],
            Opcode::StoreV | Opcode::StoreR => &[
                LatchDataAddress(First), Tick,
                Write,
            ],
            Opcode::Next => &[
                LatchRegister(First), Tick,
                LatchDataAddress(First), Tick,
                LatchRegister(Second),
            ],
            Opcode::Cmp => &[Compare],
            Opcode::AddMmr => &[
                LatchDataAddress(First), Tick,
                LatchBufferRegister(First), Tick,
                LatchDataAddress(Second), Tick,
                Write,
            ],
            Opcode::ModRrv | Opcode::Linear => &[
                LatchBufferRegister(First), Tick,
                LatchRegister(First),
            ],
            Opcode::LinearCont => &[
                LatchBufferRegister(First), Tick,
                LatchBufferRegister(Second), Tick,
                LatchRegister(First),
            ],
            _ => return None,
        };
        Some(program)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic().to_ascii_uppercase();
        f.pad(&name)
    }
}

/// Selects which half of a two-step signal runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    First,
    Second,
}

/// One entry of an opcode's micro-program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicroStep {
    LatchDataAddress(Step),
    LatchBufferRegister(Step),
    LatchRegister(Step),
    Write,
    /// `CMP register, literal` through the ALU.
    Compare,
    /// Advance the clock by one tick.
    Tick,
}

/// Memory-mapped I/O ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    Input,
    Output,
}

/// A decoded memory operand: either a real cell or one of the ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    Port(Port),
    Address(i64),
}

/// One word of program or data memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineCode {
    pub index: usize,
    pub opcode: Opcode,
    #[serde(default)]
    pub args: Vec<i64>,
}

impl MachineCode {
    /// Create a new word.
    pub fn new(index: usize, opcode: Opcode, args: Vec<i64>) -> Self {
        Self { index, opcode, args }
    }

    /// Argument at `position`, if present.
    #[inline]
    pub fn arg(&self, position: usize) -> Option<i64> {
        self.args.get(position).copied()
    }

    /// Payload of a data cell.
    #[inline]
    pub fn value(&self) -> i64 {
        self.args.first().copied().unwrap_or(0)
    }

    /// Overwrite the payload of a data cell.
    pub fn set_value(&mut self, value: i64) {
        match self.args.first_mut() {
            Some(slot) => *slot = value,
            None => self.args.push(value),
        }
    }

    /// Source operand of a `LOAD_V`; the input port when it equals [`INPUT_MAP`].
    pub fn load_source(&self) -> Option<OperandKind> {
        if self.opcode != Opcode::LoadV {
            return None;
        }
        self.arg(1).map(|value| match value {
            INPUT_MAP => OperandKind::Port(Port::Input),
            addr => OperandKind::Address(addr),
        })
    }

    /// Destination operand of a `STORE_V`; the output port when it equals [`OUTPUT_MAP`].
    pub fn store_target(&self) -> Option<OperandKind> {
        if self.opcode != Opcode::StoreV {
            return None;
        }
        self.arg(0).map(|value| match value {
            OUTPUT_MAP => OperandKind::Port(Port::Output),
            addr => OperandKind::Address(addr),
        })
    }
}

impl fmt::Display for MachineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        for (i, arg) in self.args.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, arg)?;
        }
        Ok(())
    }
}
