//! Arithmetic-logic unit.
//!
//! Pure integer operations plus the shared zero flag. The flag is latched
//! from every result that is exactly 0 (set) or exactly 1 (cleared); any
//! other result leaves it untouched, so `ADD`/`MUL`/`MOD` can flip the
//! flag when they happen to produce 0 or 1.

use crate::isa::Operation;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The ALU and its condition flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alu {
    is_zero: bool,
}

impl Alu {
    /// Create an ALU with the flag cleared.
    pub fn new() -> Self {
        Self { is_zero: false }
    }

    /// Run `op` and latch the flag from the result.
    pub fn execute(&mut self, op: Operation, left: i64, right: i64) -> Result<i64, AluError> {
        let result = compute(op, left, right)?;
        self.latch_flag(result);
        Ok(result)
    }

    /// Current value of the zero flag.
    #[inline]
    pub fn zero(&self) -> bool {
        self.is_zero
    }

    fn latch_flag(&mut self, result: i64) {
        match result {
            0 => self.is_zero = true,
            1 => self.is_zero = false,
            _ => {}
        }
    }
}

/// Evaluate `op` without touching any flag.
pub fn compute(op: Operation, left: i64, right: i64) -> Result<i64, AluError> {
    match op {
        Operation::Add => left.checked_add(right).ok_or(AluError::Overflow { op, left, right }),
        Operation::Mul => left.checked_mul(right).ok_or(AluError::Overflow { op, left, right }),
        Operation::Mod => floored_mod(left, right),
        Operation::Cmp => Ok(if left == right { 0 } else { 1 }),
    }
}

/// Remainder with the sign of the divisor.
fn floored_mod(left: i64, right: i64) -> Result<i64, AluError> {
    if right == 0 {
        return Err(AluError::DivisionByZero(left));
    }
    let rem = left.checked_rem(right).unwrap_or(0);
    if rem != 0 && (rem < 0) != (right < 0) {
        Ok(rem + right)
    } else {
        Ok(rem)
    }
}

/// Errors raised by ALU operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AluError {
    #[error("{op:?} overflow on {left} and {right}")]
    Overflow { op: Operation, left: i64, right: i64 },

    #[error("{0} mod 0")]
    DivisionByZero(i64),
}
