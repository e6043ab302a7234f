//! Control unit: program counter, clock and instruction decode.
//!
//! One call to [`ControlUnit::step`] executes one instruction as a sequence
//! of datapath signals separated by clock ticks. The control unit never
//! loops on its own; the caller decides when to stop.

use crate::cpu::datapath::{DataPath, DataPathError};
use crate::isa::{MachineCode, MicroStep, Opcode, Operation};
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// Result of a successful [`ControlUnit::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The instruction ran to completion.
    Executed(Opcode),
    /// `HLT` was reached. No tick was charged and the PC did not move.
    Halted,
}

/// The control unit, owning program memory and the datapath.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlUnit {
    program_memory: Vec<MachineCode>,
    program_counter: usize,
    data_path: DataPath,
    tick: u64,
}

impl ControlUnit {
    /// Create a control unit at PC 0, tick 0.
    pub fn new(program_memory: Vec<MachineCode>, data_path: DataPath) -> Self {
        Self {
            program_memory,
            program_counter: 0,
            data_path,
            tick: 0,
        }
    }

    fn tick(&mut self) {
        self.tick += 1;
    }

    /// Ticks elapsed since start.
    #[inline]
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Index of the next instruction.
    #[inline]
    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    /// Move to the next instruction, or to `value` when `select_next` is false.
    pub fn advance_pc(&mut self, select_next: bool, value: usize) {
        if select_next {
            self.program_counter += 1;
        } else {
            self.program_counter = value;
        }
    }

    /// Decode and execute the instruction at the program counter.
    pub fn step(&mut self) -> Result<StepOutcome, CpuError> {
        let instr = self
            .program_memory
            .get(self.program_counter)
            .cloned()
            .ok_or(CpuError::ProgramCounterOutOfRange {
                pc: self.program_counter,
                len: self.program_memory.len(),
            })?;

        if let Some(outcome) = self.execute_control_flow(&instr)? {
            return Ok(outcome);
        }

        let program = instr.opcode.micro_program().ok_or(CpuError::InvalidOpcode {
            opcode: instr.opcode,
            index: instr.index,
        })?;

        for micro in program {
            match *micro {
                MicroStep::LatchDataAddress(step) => self.data_path.latch_data_address(&instr, step)?,
                MicroStep::LatchBufferRegister(step) => self.data_path.latch_buffer_register(&instr, step)?,
                MicroStep::LatchRegister(step) => self.data_path.latch_register(&instr, step)?,
                MicroStep::Write => self.data_path.signal_write(&instr)?,
                MicroStep::Compare => self.data_path.signal_compare(&instr)?,
                MicroStep::Tick => self.tick(),
            }
        }

        self.advance_pc(true, 0);
        self.tick();
        Ok(StepOutcome::Executed(instr.opcode))
    }

    /// Handle `HLT`, `JMP`, `JZ` and `JZ_R`. Returns `None` for anything else.
    fn execute_control_flow(&mut self, instr: &MachineCode) -> Result<Option<StepOutcome>, CpuError> {
        match instr.opcode {
            Opcode::Hlt => Ok(Some(StepOutcome::Halted)),
            Opcode::Jmp => {
                let target = jump_target(instr)?;
                self.advance_pc(false, target);
                self.tick();
                Ok(Some(StepOutcome::Executed(Opcode::Jmp)))
            }
            Opcode::Jz => {
                let target = jump_target(instr)?;
                self.branch(self.data_path.zero(), target);
                self.tick();
                Ok(Some(StepOutcome::Executed(Opcode::Jz)))
            }
            Opcode::JzR => {
                let target = jump_target(instr)?;
                let register = instr.arg(1).ok_or(DataPathError::MissingOperand {
                    index: instr.index,
                    opcode: instr.opcode,
                    position: 1,
                })?;
                let value = self.data_path.register(register)?;
                self.data_path.alu(Operation::Cmp, value, 0)?;
                self.tick();
                self.branch(self.data_path.zero(), target);
                self.tick();
                Ok(Some(StepOutcome::Executed(Opcode::JzR)))
            }
            _ => Ok(None),
        }
    }

    fn branch(&mut self, taken: bool, target: usize) {
        if taken {
            self.advance_pc(false, target);
        } else {
            self.advance_pc(true, 0);
        }
    }

    /// The datapath.
    pub fn data_path(&self) -> &DataPath {
        &self.data_path
    }

    /// Mutable access to the datapath, e.g. to preload registers.
    pub fn data_path_mut(&mut self) -> &mut DataPath {
        &mut self.data_path
    }

    /// Consume the control unit, keeping the datapath.
    pub fn into_data_path(self) -> DataPath {
        self.data_path
    }

    /// Program memory.
    pub fn program(&self) -> &[MachineCode] {
        &self.program_memory
    }

    /// Instruction at the program counter, if the PC is in range.
    pub fn current_instruction(&self) -> Option<&MachineCode> {
        self.program_memory.get(self.program_counter)
    }

    /// Capture the visible machine state.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            tick: self.tick,
            program_counter: self.program_counter,
            opcode: self.current_instruction().map(|i| i.opcode),
            data_address: self.data_path.data_address(),
            buffer_register: self.data_path.buffer_register(),
            registers: self.data_path.registers().to_vec(),
            is_zero: self.data_path.zero(),
        }
    }
}

fn jump_target(instr: &MachineCode) -> Result<usize, CpuError> {
    let target = instr.arg(0).ok_or(DataPathError::MissingOperand {
        index: instr.index,
        opcode: instr.opcode,
        position: 0,
    })?;
    usize::try_from(target).map_err(|_| CpuError::BadJumpTarget { index: instr.index, target })
}

/// Machine state between two instructions, as shown in traces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub tick: u64,
    pub program_counter: usize,
    pub opcode: Option<Opcode>,
    pub data_address: i64,
    pub buffer_register: i64,
    pub registers: Vec<i64>,
    pub is_zero: bool,
}

impl fmt::Display for MachineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcode = self.opcode.map(|op| op.to_string()).unwrap_or_else(|| "-".into());
        write!(
            f,
            "TICK: {:4} [{:2}: {:7}] PC: {:2} DR: {:2} SB: {:2} RG: {:?} Z: {}",
            self.tick,
            self.program_counter,
            opcode,
            self.program_counter,
            self.data_address,
            self.buffer_register,
            self.registers,
            u8::from(self.is_zero),
        )
    }
}

/// Errors raised while stepping the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("program counter {pc} outside program ({len} instructions)")]
    ProgramCounterOutOfRange { pc: usize, len: usize },

    #[error("invalid opcode {opcode} at instruction {index}")]
    InvalidOpcode { opcode: Opcode, index: usize },

    #[error("invalid jump target {target} at instruction {index}")]
    BadJumpTarget { index: usize, target: i64 },

    #[error("{0}")]
    DataPath(#[from] DataPathError),
}

impl CpuError {
    /// True when the program tried to read past the end of its input.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, CpuError::DataPath(DataPathError::EndOfInput))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{INPUT_MAP, OUTPUT_MAP};
    use proptest::prelude::*;

    fn program(words: &[(Opcode, &[i64])]) -> Vec<MachineCode> {
        words
            .iter()
            .enumerate()
            .map(|(i, (op, args))| MachineCode::new(i, *op, args.to_vec()))
            .collect()
    }

    fn data(values: &[i64]) -> Vec<MachineCode> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| MachineCode::new(i, Opcode::Number, vec![v]))
            .collect()
    }

    fn machine(code: &[(Opcode, &[i64])], cells: &[i64], input: &str) -> ControlUnit {
        let dp = DataPath::new(data(cells), 4, input.chars()).unwrap();
        ControlUnit::new(program(code), dp)
    }

    /// Step once and return the ticks it cost.
    fn cost(cu: &mut ControlUnit) -> u64 {
        let before = cu.current_tick();
        cu.step().unwrap();
        cu.current_tick() - before
    }

    #[test]
    fn test_mov_then_halt() {
        let mut cu = machine(&[(Opcode::Mov, &[0, 5]), (Opcode::Hlt, &[])], &[], "");
        let mut attempted = 0;
        loop {
            attempted += 1;
            if cu.step().unwrap() == StepOutcome::Halted {
                break;
            }
        }
        assert_eq!(cu.data_path().registers()[0], 5);
        assert_eq!(cu.current_tick(), 1);
        assert_eq!(attempted, 2);
        assert_eq!(cu.program_counter(), 1);
    }

    #[test]
    fn test_halt_is_idempotent() {
        let mut cu = machine(&[(Opcode::Hlt, &[])], &[], "");
        assert_eq!(cu.step(), Ok(StepOutcome::Halted));
        assert_eq!(cu.step(), Ok(StepOutcome::Halted));
        assert_eq!(cu.current_tick(), 0);
    }

    #[test]
    fn test_jz_r_taken_costs_two_ticks() {
        let mut cu = machine(
            &[
                (Opcode::JzR, &[3, 1]),
                (Opcode::Mov, &[0, 1]),
                (Opcode::Mov, &[0, 2]),
                (Opcode::Hlt, &[]),
            ],
            &[],
            "",
        );
        assert_eq!(cost(&mut cu), 2);
        assert_eq!(cu.program_counter(), 3);
        assert!(cu.data_path().zero());
        assert_eq!(cu.step(), Ok(StepOutcome::Halted));
        assert_eq!(cu.data_path().registers()[0], 0);
    }

    #[test]
    fn test_jz_r_not_taken_costs_two_ticks() {
        let mut cu = machine(&[(Opcode::JzR, &[2, 1]), (Opcode::Hlt, &[]), (Opcode::Hlt, &[])], &[], "");
        cu.data_path_mut().set_register(1, 4).unwrap();
        assert_eq!(cost(&mut cu), 2);
        assert_eq!(cu.program_counter(), 1);
        assert!(!cu.data_path().zero());
    }

    #[test]
    fn test_jz_uses_current_flag() {
        let code: &[(Opcode, &[i64])] = &[
            (Opcode::Cmp, &[0, 0]),
            (Opcode::Jz, &[3]),
            (Opcode::Hlt, &[]),
            (Opcode::Cmp, &[0, 1]),
            (Opcode::Jz, &[0]),
            (Opcode::Hlt, &[]),
        ];
        let mut cu = machine(code, &[], "");
        assert_eq!(cost(&mut cu), 1);
        assert_eq!(cost(&mut cu), 1);
        assert_eq!(cu.program_counter(), 3);
        cost(&mut cu);
        assert_eq!(cost(&mut cu), 1);
        assert_eq!(cu.program_counter(), 5);
        assert_eq!(cu.step(), Ok(StepOutcome::Halted));
    }

    #[test]
    fn test_jmp_costs_one_tick() {
        let mut cu = machine(&[(Opcode::Jmp, &[2]), (Opcode::Hlt, &[]), (Opcode::Hlt, &[])], &[], "");
        assert_eq!(cost(&mut cu), 1);
        assert_eq!(cu.program_counter(), 2);
    }

    #[test]
    fn test_tick_cost_per_opcode() {
        let code: &[(Opcode, &[i64])] = &[
            (Opcode::Mov, &[1, 3]),
            (Opcode::LoadV, &[0, 2]),
            (Opcode::LoadR, &[0, 1]),
            (Opcode::StoreV, &[2, 0]),
            (Opcode::StoreR, &[1, 0]),
            (Opcode::Mov, &[1, 2]),
            (Opcode::Next, &[0, 1]),
            (Opcode::Cmp, &[0, 9]),
            (Opcode::Inc, &[0]),
            (Opcode::AddMmr, &[2, 3, 0]),
            (Opcode::ModRrv, &[2, 0, 4]),
            (Opcode::Linear, &[3, 2, 0]),
            (Opcode::LinearCont, &[3, 5, 2]),
            (Opcode::Hlt, &[]),
        ];
        let expected = [1, 2, 2, 2, 2, 1, 3, 1, 1, 4, 2, 2, 3];
        let mut cu = machine(code, &[1234, 1234, 10, 20, 30], "");
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(cost(&mut cu), *want, "instruction {}", i);
        }
        assert_eq!(cu.step(), Ok(StepOutcome::Halted));
    }

    #[test]
    fn test_pointer_walk_with_next() {
        // Buffer of [7, 8, 9] at address 2, followed by one more cell.
        let code: &[(Opcode, &[i64])] = &[
            (Opcode::Next, &[0, 1]),
            (Opcode::Next, &[0, 1]),
            (Opcode::Next, &[0, 1]),
            (Opcode::Hlt, &[]),
        ];
        let mut cu = machine(code, &[1234, 1234, 7, 8, 9, 0], "");
        cu.data_path_mut().set_register(1, 2).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            assert_eq!(cost(&mut cu), 3);
            seen.push(cu.data_path().registers()[0]);
        }
        assert_eq!(seen, vec![8, 9, 0]);
        assert_eq!(cu.data_path().registers()[1], 5);
    }

    #[test]
    fn test_echo_one_character() {
        let code: &[(Opcode, &[i64])] = &[
            (Opcode::LoadV, &[0, INPUT_MAP]),
            (Opcode::StoreV, &[OUTPUT_MAP, 0]),
            (Opcode::Hlt, &[]),
        ];
        let mut cu = machine(code, &[1234, 1234], "A");
        while cu.step().unwrap() != StepOutcome::Halted {}
        assert_eq!(cu.data_path().output(), &['A' as i64]);
        assert_eq!(cu.current_tick(), 4);
    }

    #[test]
    fn test_end_of_input_is_reported() {
        let mut cu = machine(&[(Opcode::LoadV, &[0, INPUT_MAP]), (Opcode::Hlt, &[])], &[1234, 1234], "");
        let err = cu.step().unwrap_err();
        assert!(err.is_end_of_input());
        // The address latch tick was already charged.
        assert_eq!(cu.current_tick(), 1);
        assert_eq!(cu.program_counter(), 0);
    }

    #[test]
    fn test_invalid_opcode_in_program() {
        let mut cu = machine(&[(Opcode::Number, &[3])], &[], "");
        assert_eq!(
            cu.step(),
            Err(CpuError::InvalidOpcode { opcode: Opcode::Number, index: 0 })
        );
    }

    #[test]
    fn test_running_off_the_end() {
        let mut cu = machine(&[(Opcode::Mov, &[0, 1])], &[], "");
        cu.step().unwrap();
        assert_eq!(cu.step(), Err(CpuError::ProgramCounterOutOfRange { pc: 1, len: 1 }));
    }

    #[test]
    fn test_bad_jump_target() {
        let mut cu = machine(&[(Opcode::Jmp, &[-1])], &[], "");
        assert_eq!(cu.step(), Err(CpuError::BadJumpTarget { index: 0, target: -1 }));
    }

    #[test]
    fn test_snapshot_display() {
        let mut cu = machine(&[(Opcode::Mov, &[0, 5]), (Opcode::Hlt, &[])], &[], "");
        cu.step().unwrap();
        let line = cu.snapshot().to_string();
        assert_eq!(line, "TICK:    1 [ 1: HLT    ] PC:  1 DR:  0 SB:  0 RG: [5, 0, 0, 0] Z: 0");
    }

    /// One instruction, or a `mov` that puts a pointer in range followed by
    /// the instruction using it. Each word carries its expected tick cost.
    /// Jump targets are filled in once the program is laid out.
    fn program_fragment() -> impl Strategy<Value = Vec<(Opcode, Vec<i64>, u64)>> {
        prop_oneof![
            (0i64..4, -50i64..50).prop_map(|(r, v)| vec![(Opcode::Mov, vec![r, v], 1)]),
            (0i64..4).prop_map(|r| vec![(Opcode::Inc, vec![r], 1)]),
            (0i64..4, -5i64..5).prop_map(|(r, v)| vec![(Opcode::Cmp, vec![r, v], 1)]),
            (0i64..4, 2i64..6).prop_map(|(r, a)| vec![(Opcode::LoadV, vec![r, a], 2)]),
            (2i64..6, 0i64..4).prop_map(|(a, r)| vec![(Opcode::StoreV, vec![a, r], 2)]),
            (2i64..6, 2i64..6, 0i64..4).prop_map(|(a, b, r)| vec![(Opcode::AddMmr, vec![a, b, r], 4)]),
            (0i64..4, 0i64..4, 1i64..9).prop_map(|(d, s, m)| vec![(Opcode::ModRrv, vec![d, s, m], 2)]),
            (0i64..4, 0i64..4, 2i64..6).prop_map(|(d, p, a)| vec![
                (Opcode::Mov, vec![p, a], 1),
                (Opcode::LoadR, vec![d, p], 2),
            ]),
            (0i64..4, 0i64..4, 2i64..6).prop_map(|(p, s, a)| vec![
                (Opcode::Mov, vec![p, a], 1),
                (Opcode::StoreR, vec![p, s], 2),
            ]),
            (0i64..4, 0i64..4, 1i64..5).prop_map(|(d, p, a)| vec![
                (Opcode::Mov, vec![p, a], 1),
                (Opcode::Next, vec![d, p], 3),
            ]),
            (0i64..4, -2i64..3, 0i64..4).prop_map(|(d, v, r)| vec![(Opcode::Linear, vec![d, v, r], 2)]),
            (0i64..4, -1i64..2, 0i64..4).prop_map(|(d, v, r)| vec![(Opcode::LinearCont, vec![d, v, r], 3)]),
            Just(vec![(Opcode::Jmp, vec![0], 1)]),
            Just(vec![(Opcode::Jz, vec![0], 1)]),
            (0i64..4).prop_map(|r| vec![(Opcode::JzR, vec![0, r], 2)]),
        ]
    }

    proptest! {
        #[test]
        fn prop_ticks_follow_table(fragments in proptest::collection::vec(program_fragment(), 1..40)) {
            let ops: Vec<(Opcode, Vec<i64>, u64)> = fragments.into_iter().flatten().collect();
            let mut code: Vec<MachineCode> = ops
                .iter()
                .enumerate()
                .map(|(i, (op, args, _))| {
                    let mut args = args.clone();
                    if op.is_control_flow() {
                        // Taken or not, the branch lands on the next word.
                        args[0] = i as i64 + 1;
                    }
                    MachineCode::new(i, *op, args)
                })
                .collect();
            code.push(MachineCode::new(ops.len(), Opcode::Hlt, vec![]));

            let dp = DataPath::new(data(&[1234, 1234, 1, 2, 3, 4]), 4, "".chars()).unwrap();
            let mut cu = ControlUnit::new(code, dp);

            for (index, (_, _, expected)) in ops.iter().enumerate() {
                prop_assert_eq!(cu.program_counter(), index);
                let before = cu.current_tick();
                prop_assert!(cu.step().is_ok());
                prop_assert_eq!(cu.current_tick() - before, *expected);
            }
            prop_assert_eq!(cu.step(), Ok(StepOutcome::Halted));
        }
    }
}
