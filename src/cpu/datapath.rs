//! Datapath: registers, data memory, latches and the I/O queues.
//!
//! Each public `latch_*`/`signal_*` method is one micro-signal. The control
//! unit calls them in the order given by [`Opcode::micro_program`] and
//! advances the clock between them.

use crate::cpu::alu::{Alu, AluError};
use crate::isa::{MachineCode, Opcode, Operation, OperandKind, Port, Step};
use serde::{Serialize, Deserialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

/// The machine datapath.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPath {
    data_memory: Vec<MachineCode>,
    registers: Vec<i64>,
    data_address: i64,
    buffer_register: i64,
    alu: Alu,
    input_buffer: VecDeque<char>,
    output_buffer: Vec<i64>,
}

impl DataPath {
    /// Create a datapath over `data_memory` with `registers` zeroed registers.
    pub fn new(
        data_memory: Vec<MachineCode>,
        registers: usize,
        input: impl IntoIterator<Item = char>,
    ) -> Result<Self, DataPathError> {
        if registers == 0 {
            return Err(DataPathError::NoRegisters);
        }
        Ok(Self {
            data_memory,
            registers: vec![0; registers],
            data_address: 0,
            buffer_register: 0,
            alu: Alu::new(),
            input_buffer: input.into_iter().collect(),
            output_buffer: Vec::new(),
        })
    }

    // ==================== Signals ====================

    /// Latch the data address register from the instruction's address operand.
    ///
    /// `ADD_MMR` uses [`Step::First`] for its source cell and
    /// [`Step::Second`] for its destination cell.
    pub fn latch_data_address(&mut self, instr: &MachineCode, step: Step) -> Result<(), DataPathError> {
        const SIGNAL: &str = "latch_data_address";
        self.data_address = match (instr.opcode, step) {
            (Opcode::LoadV, Step::First) => operand(instr, 1)?,
            (Opcode::LoadR | Opcode::Next, Step::First) => self.register(operand(instr, 1)?)?,
            (Opcode::StoreV, Step::First) => operand(instr, 0)?,
            (Opcode::StoreR, Step::First) => self.register(operand(instr, 0)?)?,
            (Opcode::AddMmr, Step::First) => operand(instr, 1)?,
            (Opcode::AddMmr, Step::Second) => operand(instr, 0)?,
            (Opcode::LoadV | Opcode::LoadR | Opcode::Next | Opcode::StoreV | Opcode::StoreR, _) => {
                return Err(DataPathError::InvalidStep { opcode: instr.opcode, signal: SIGNAL, step });
            }
            (opcode, _) => return Err(DataPathError::InvalidOpcode { opcode, signal: SIGNAL }),
        };
        Ok(())
    }

    /// Latch the buffer register.
    pub fn latch_buffer_register(&mut self, instr: &MachineCode, step: Step) -> Result<(), DataPathError> {
        const SIGNAL: &str = "latch_buffer_register";
        self.buffer_register = match (instr.opcode, step) {
            (Opcode::AddMmr, Step::First) => self.read_cell()?,
            (Opcode::ModRrv | Opcode::Linear | Opcode::LinearCont, Step::First) => operand(instr, 1)?,
            (Opcode::LinearCont, Step::Second) => {
                let factor = self.register(operand(instr, 2)?)?;
                self.alu(Operation::Mul, self.buffer_register, factor)?
            }
            (Opcode::AddMmr | Opcode::ModRrv | Opcode::Linear, _) => {
                return Err(DataPathError::InvalidStep { opcode: instr.opcode, signal: SIGNAL, step });
            }
            (opcode, _) => return Err(DataPathError::InvalidOpcode { opcode, signal: SIGNAL }),
        };
        Ok(())
    }

    /// Compute and latch the destination register.
    ///
    /// A `LOAD_V` from the input port consumes one input character instead
    /// of reading memory, whatever the data address register holds.
    pub fn latch_register(&mut self, instr: &MachineCode, step: Step) -> Result<(), DataPathError> {
        const SIGNAL: &str = "latch_register";

        if let Some(OperandKind::Port(Port::Input)) = instr.load_source() {
            let dest = self.register_index(operand(instr, 0)?)?;
            let code = self.signal_input()?;
            self.registers[dest] = code;
            return Ok(());
        }

        let (dest, value) = match (instr.opcode, step) {
            (Opcode::Mov, Step::First) => (operand(instr, 0)?, operand(instr, 1)?),
            (Opcode::LoadV | Opcode::LoadR, Step::First) => (operand(instr, 0)?, self.read_cell()?),
            (Opcode::Next, Step::First) => {
                let pointer = operand(instr, 1)?;
                let current = self.register(pointer)?;
                (pointer, self.alu(Operation::Add, current, 1)?)
            }
            (Opcode::Next, Step::Second) => (operand(instr, 0)?, self.read_cell()?),
            (Opcode::Inc, Step::First) => {
                let dest = operand(instr, 0)?;
                let current = self.register(dest)?;
                (dest, self.alu(Operation::Add, current, 1)?)
            }
            (Opcode::ModRrv, Step::First) => {
                let source = self.register(operand(instr, 1)?)?;
                (operand(instr, 0)?, self.alu(Operation::Mod, source, operand(instr, 2)?)?)
            }
            (Opcode::Linear, Step::First) => {
                let factor = self.register(operand(instr, 2)?)?;
                (operand(instr, 0)?, self.alu(Operation::Mul, self.buffer_register, factor)?)
            }
            (Opcode::LinearCont, Step::First) => {
                let dest = operand(instr, 0)?;
                let acc = self.register(dest)?;
                (dest, self.alu(Operation::Add, self.buffer_register, acc)?)
            }
            (Opcode::Mov | Opcode::LoadV | Opcode::LoadR | Opcode::Inc | Opcode::ModRrv
                | Opcode::Linear | Opcode::LinearCont, _) => {
                return Err(DataPathError::InvalidStep { opcode: instr.opcode, signal: SIGNAL, step });
            }
            (opcode, _) => return Err(DataPathError::InvalidOpcode { opcode, signal: SIGNAL }),
        };

        let dest = self.register_index(dest)?;
        self.registers[dest] = value;
        Ok(())
    }

    /// Write to the latched data cell, or to the output port.
    pub fn signal_write(&mut self, instr: &MachineCode) -> Result<(), DataPathError> {
        if let Some(OperandKind::Port(Port::Output)) = instr.store_target() {
            let value = self.register(operand(instr, 1)?)?;
            self.signal_output(value);
            return Ok(());
        }

        let value = match instr.opcode {
            Opcode::StoreV | Opcode::StoreR => self.register(operand(instr, 1)?)?,
            Opcode::AddMmr => {
                let addend = self.register(operand(instr, 2)?)?;
                self.alu(Operation::Add, self.buffer_register, addend)?
            }
            opcode => return Err(DataPathError::InvalidOpcode { opcode, signal: "signal_write" }),
        };
        self.write_cell(value)
    }

    /// `CMP register, literal`: set the flag without storing anything.
    pub fn signal_compare(&mut self, instr: &MachineCode) -> Result<(), DataPathError> {
        if instr.opcode != Opcode::Cmp {
            return Err(DataPathError::InvalidOpcode { opcode: instr.opcode, signal: "signal_compare" });
        }
        let left = self.register(operand(instr, 0)?)?;
        self.alu(Operation::Cmp, left, operand(instr, 1)?)?;
        Ok(())
    }

    /// Run the ALU, latching the zero flag.
    pub fn alu(&mut self, op: Operation, left: i64, right: i64) -> Result<i64, DataPathError> {
        Ok(self.alu.execute(op, left, right)?)
    }

    /// The zero flag.
    #[inline]
    pub fn zero(&self) -> bool {
        self.alu.zero()
    }

    // ==================== I/O ====================

    fn signal_input(&mut self) -> Result<i64, DataPathError> {
        let symbol = self.input_buffer.pop_front().ok_or(DataPathError::EndOfInput)?;
        let code = symbol as u32 as i64;
        if code == 0 {
            debug!("input: <end>");
        } else {
            debug!("input: {}", symbol);
        }
        Ok(code)
    }

    fn signal_output(&mut self, value: i64) {
        self.output_buffer.push(value);
        debug!("output: {} << {}", decode_output(&self.output_buffer), value);
    }

    // ==================== State access ====================

    /// Register value by (operand-encoded) index.
    pub fn register(&self, index: i64) -> Result<i64, DataPathError> {
        Ok(self.registers[self.register_index(index)?])
    }

    /// Overwrite a register, e.g. to preload a pointer before a run.
    pub fn set_register(&mut self, index: i64, value: i64) -> Result<(), DataPathError> {
        let index = self.register_index(index)?;
        self.registers[index] = value;
        Ok(())
    }

    /// All registers.
    pub fn registers(&self) -> &[i64] {
        &self.registers
    }

    /// Data memory cells.
    pub fn data_memory(&self) -> &[MachineCode] {
        &self.data_memory
    }

    /// Current data address latch.
    pub fn data_address(&self) -> i64 {
        self.data_address
    }

    /// Current buffer register latch.
    pub fn buffer_register(&self) -> i64 {
        self.buffer_register
    }

    /// Codes emitted to the output port so far.
    pub fn output(&self) -> &[i64] {
        &self.output_buffer
    }

    /// Characters not yet consumed from the input port.
    pub fn pending_input(&self) -> usize {
        self.input_buffer.len()
    }

    fn register_index(&self, index: i64) -> Result<usize, DataPathError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.registers.len())
            .ok_or(DataPathError::RegisterOutOfRange { register: index, count: self.registers.len() })
    }

    fn cell_index(&self) -> Result<usize, DataPathError> {
        usize::try_from(self.data_address)
            .ok()
            .filter(|&i| i < self.data_memory.len())
            .ok_or(DataPathError::AddressOutOfRange { address: self.data_address, size: self.data_memory.len() })
    }

    fn read_cell(&self) -> Result<i64, DataPathError> {
        Ok(self.data_memory[self.cell_index()?].value())
    }

    fn write_cell(&mut self, value: i64) -> Result<(), DataPathError> {
        let index = self.cell_index()?;
        self.data_memory[index].set_value(value);
        Ok(())
    }
}

fn operand(instr: &MachineCode, position: usize) -> Result<i64, DataPathError> {
    instr.arg(position).ok_or(DataPathError::MissingOperand {
        index: instr.index,
        opcode: instr.opcode,
        position,
    })
}

/// Render output codes as text: codes below 256 as characters, anything
/// else as its decimal value.
pub fn decode_output(codes: &[i64]) -> String {
    let mut text = String::new();
    for &code in codes {
        match u8::try_from(code) {
            Ok(byte) => text.push(char::from(byte)),
            Err(_) => text.push_str(&code.to_string()),
        }
    }
    text
}

/// Errors raised by datapath signals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataPathError {
    #[error("register count must be positive")]
    NoRegisters,

    #[error("{opcode} has no {signal} rule")]
    InvalidOpcode { opcode: Opcode, signal: &'static str },

    #[error("{opcode} has no {step:?} step for {signal}")]
    InvalidStep { opcode: Opcode, signal: &'static str, step: Step },

    #[error("instruction {index} ({opcode}) is missing operand {position}")]
    MissingOperand { index: usize, opcode: Opcode, position: usize },

    #[error("register {register} out of range ({count} registers)")]
    RegisterOutOfRange { register: i64, count: usize },

    #[error("data address {address} out of range ({size} cells)")]
    AddressOutOfRange { address: i64, size: usize },

    #[error("end of input")]
    EndOfInput,

    #[error("ALU error: {0}")]
    Alu(#[from] AluError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{INPUT_MAP, OUTPUT_MAP};

    fn cells(values: &[i64]) -> Vec<MachineCode> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| MachineCode::new(i, Opcode::Number, vec![v]))
            .collect()
    }

    fn instr(opcode: Opcode, args: &[i64]) -> MachineCode {
        MachineCode::new(0, opcode, args.to_vec())
    }

    fn datapath(values: &[i64], input: &str) -> DataPath {
        DataPath::new(cells(values), 4, input.chars()).unwrap()
    }

    #[test]
    fn test_register_count_must_be_positive() {
        assert_eq!(DataPath::new(Vec::new(), 0, "".chars()).unwrap_err(), DataPathError::NoRegisters);
    }

    #[test]
    fn test_mov_and_load() {
        let mut dp = datapath(&[1234, 1234, 42], "");
        dp.latch_register(&instr(Opcode::Mov, &[0, 5]), Step::First).unwrap();
        assert_eq!(dp.registers()[0], 5);

        let load = instr(Opcode::LoadV, &[1, 2]);
        dp.latch_data_address(&load, Step::First).unwrap();
        dp.latch_register(&load, Step::First).unwrap();
        assert_eq!(dp.registers()[1], 42);
    }

    #[test]
    fn test_load_from_input_port_bypasses_memory() {
        let mut dp = datapath(&[1234, 1234], "A");
        let load = instr(Opcode::LoadV, &[2, INPUT_MAP]);
        dp.latch_data_address(&load, Step::First).unwrap();
        assert_eq!(dp.data_address(), 0);
        dp.latch_register(&load, Step::First).unwrap();
        assert_eq!(dp.registers()[2], 'A' as i64);
        assert_eq!(dp.pending_input(), 0);
    }

    #[test]
    fn test_end_of_input_leaves_state_untouched() {
        let mut dp = datapath(&[1234, 1234, 7], "");
        dp.set_register(0, 99).unwrap();
        let before = (dp.registers().to_vec(), dp.data_memory().to_vec());

        let load = instr(Opcode::LoadV, &[0, INPUT_MAP]);
        dp.latch_data_address(&load, Step::First).unwrap();
        assert_eq!(dp.latch_register(&load, Step::First), Err(DataPathError::EndOfInput));

        assert_eq!(dp.registers(), before.0.as_slice());
        assert_eq!(dp.data_memory(), before.1.as_slice());
    }

    #[test]
    fn test_store_to_output_port() {
        let mut dp = datapath(&[1234, 1234], "");
        dp.set_register(3, 'z' as i64).unwrap();
        let store = instr(Opcode::StoreV, &[OUTPUT_MAP, 3]);
        dp.latch_data_address(&store, Step::First).unwrap();
        dp.signal_write(&store).unwrap();
        assert_eq!(dp.output(), &['z' as i64]);
        assert_eq!(dp.data_memory()[1].value(), 1234);
    }

    #[test]
    fn test_store_through_register() {
        let mut dp = datapath(&[1234, 1234, 0, 0], "");
        dp.set_register(0, 3).unwrap();
        dp.set_register(1, -8).unwrap();
        let store = instr(Opcode::StoreR, &[0, 1]);
        dp.latch_data_address(&store, Step::First).unwrap();
        dp.signal_write(&store).unwrap();
        assert_eq!(dp.data_memory()[3].value(), -8);
    }

    #[test]
    fn test_next_increments_then_loads() {
        let mut dp = datapath(&[1234, 1234, 7, 8, 9], "");
        dp.set_register(1, 2).unwrap();
        let next = instr(Opcode::Next, &[0, 1]);
        dp.latch_register(&next, Step::First).unwrap();
        dp.latch_data_address(&next, Step::First).unwrap();
        dp.latch_register(&next, Step::Second).unwrap();
        assert_eq!(dp.registers()[1], 3);
        assert_eq!(dp.registers()[0], 8);
    }

    #[test]
    fn test_add_mmr() {
        let mut dp = datapath(&[1234, 1234, 10, 0], "");
        dp.set_register(2, 5).unwrap();
        let add = instr(Opcode::AddMmr, &[3, 2, 2]);
        dp.latch_data_address(&add, Step::First).unwrap();
        dp.latch_buffer_register(&add, Step::First).unwrap();
        assert_eq!(dp.buffer_register(), 10);
        dp.latch_data_address(&add, Step::Second).unwrap();
        dp.signal_write(&add).unwrap();
        assert_eq!(dp.data_memory()[3].value(), 15);
        assert_eq!(dp.data_memory()[2].value(), 10);
    }

    #[test]
    fn test_mod_rrv() {
        let mut dp = datapath(&[], "");
        dp.set_register(1, 17).unwrap();
        let m = instr(Opcode::ModRrv, &[0, 1, 5]);
        dp.latch_buffer_register(&m, Step::First).unwrap();
        assert_eq!(dp.buffer_register(), 1);
        dp.latch_register(&m, Step::First).unwrap();
        assert_eq!(dp.registers()[0], 2);
    }

    #[test]
    fn test_linear_chain() {
        // r0 = 4 * r1 + 10 * r2
        let mut dp = datapath(&[], "");
        dp.set_register(1, 3).unwrap();
        dp.set_register(2, 2).unwrap();

        let head = instr(Opcode::Linear, &[0, 4, 1]);
        dp.latch_buffer_register(&head, Step::First).unwrap();
        dp.latch_register(&head, Step::First).unwrap();
        assert_eq!(dp.registers()[0], 12);

        let cont = instr(Opcode::LinearCont, &[0, 10, 2]);
        dp.latch_buffer_register(&cont, Step::First).unwrap();
        dp.latch_buffer_register(&cont, Step::Second).unwrap();
        assert_eq!(dp.buffer_register(), 20);
        dp.latch_register(&cont, Step::First).unwrap();
        assert_eq!(dp.registers()[0], 32);
    }

    #[test]
    fn test_inc_touches_flag_on_zero_result() {
        let mut dp = datapath(&[], "");
        dp.set_register(0, -1).unwrap();
        assert!(!dp.zero());
        dp.latch_register(&instr(Opcode::Inc, &[0]), Step::First).unwrap();
        assert_eq!(dp.registers()[0], 0);
        assert!(dp.zero());
    }

    #[test]
    fn test_compare() {
        let mut dp = datapath(&[], "");
        dp.set_register(0, 7).unwrap();
        dp.signal_compare(&instr(Opcode::Cmp, &[0, 7])).unwrap();
        assert!(dp.zero());
        dp.signal_compare(&instr(Opcode::Cmp, &[0, 8])).unwrap();
        assert!(!dp.zero());
    }

    #[test]
    fn test_invalid_signals() {
        let mut dp = datapath(&[1234, 1234], "");
        assert!(matches!(
            dp.latch_data_address(&instr(Opcode::Mov, &[0, 1]), Step::First),
            Err(DataPathError::InvalidOpcode { opcode: Opcode::Mov, .. })
        ));
        assert!(matches!(
            dp.latch_buffer_register(&instr(Opcode::LoadV, &[0, 1]), Step::First),
            Err(DataPathError::InvalidOpcode { .. })
        ));
        assert!(matches!(
            dp.latch_register(&instr(Opcode::Jmp, &[0]), Step::First),
            Err(DataPathError::InvalidOpcode { .. })
        ));
        assert!(matches!(
            dp.signal_write(&instr(Opcode::Mov, &[0, 1])),
            Err(DataPathError::InvalidOpcode { .. })
        ));
        assert!(matches!(
            dp.latch_register(&instr(Opcode::Mov, &[0, 1]), Step::Second),
            Err(DataPathError::InvalidStep { .. })
        ));
    }

    #[test]
    fn test_out_of_range_access() {
        let mut dp = datapath(&[1234, 1234], "");
        assert!(matches!(
            dp.latch_register(&instr(Opcode::Mov, &[4, 1]), Step::First),
            Err(DataPathError::RegisterOutOfRange { register: 4, count: 4 })
        ));
        let load = instr(Opcode::LoadV, &[0, 9]);
        dp.latch_data_address(&load, Step::First).unwrap();
        assert!(matches!(
            dp.latch_register(&load, Step::First),
            Err(DataPathError::AddressOutOfRange { address: 9, size: 2 })
        ));
        assert!(matches!(
            dp.latch_register(&instr(Opcode::Mov, &[0]), Step::First),
            Err(DataPathError::MissingOperand { position: 1, .. })
        ));
    }

    #[test]
    fn test_decode_output() {
        assert_eq!(decode_output(&[72, 105]), "Hi");
        assert_eq!(decode_output(&[65, 300, 66]), "A300B");
        assert_eq!(decode_output(&[-5]), "-5");
        assert_eq!(decode_output(&[233]), "é");
    }
}
