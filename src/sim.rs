//! Simulation driver.
//!
//! Loads an image into a fresh machine and steps it until it halts, runs
//! out of input, or reaches the tick limit. The engine itself never loops;
//! this is the only place that does.

use crate::asm::{translate, TranslateError};
use crate::cpu::{ControlUnit, CpuError, DataPath, DataPathError, StepOutcome, decode_output};
use crate::isa::{ImageError, ProgramImage};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Driver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of general purpose registers.
    pub registers: usize,
    /// Stop once this many ticks have elapsed.
    pub limit: u64,
    /// Log a state snapshot after every instruction below this tick.
    pub debug_limit: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            registers: 4,
            limit: 100_000,
            debug_limit: 200,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Halted,
    EndOfInput,
    TickLimit,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimReport {
    /// Output rendered as text.
    pub output: String,
    /// Raw output codes.
    pub output_codes: Vec<i64>,
    /// Instructions attempted, including the final `HLT` or failed read.
    pub instructions: u64,
    /// Ticks elapsed.
    pub ticks: u64,
    pub stop: StopReason,
    /// The tick counter reached the limit, whatever stopped the run.
    pub limit_reached: bool,
    /// Final register file.
    pub registers: Vec<i64>,
}

/// Input queue for a run: the characters of `text` followed by a 0 terminator.
pub fn input_from_text(text: &str) -> Vec<char> {
    text.chars().chain(std::iter::once('\0')).collect()
}

/// Run `image` to completion.
pub fn simulate(
    image: ProgramImage,
    input: impl IntoIterator<Item = char>,
    config: &SimConfig,
) -> Result<SimReport, SimError> {
    let data_path = DataPath::new(image.data, config.registers, input)?;
    let mut control_unit = ControlUnit::new(image.code, data_path);

    info!("start simulation");
    let mut instructions = 0u64;
    let mut stop = StopReason::TickLimit;

    while control_unit.current_tick() < config.limit {
        instructions += 1;
        match control_unit.step() {
            Ok(StepOutcome::Halted) => {
                stop = StopReason::Halted;
                break;
            }
            Ok(StepOutcome::Executed(_)) => {}
            Err(e) if e.is_end_of_input() => {
                warn!("input buffer is empty");
                stop = StopReason::EndOfInput;
                break;
            }
            Err(e) => {
                return Err(SimError::Cpu {
                    tick: control_unit.current_tick(),
                    pc: control_unit.program_counter(),
                    source: e,
                });
            }
        }

        let tick = control_unit.current_tick();
        if tick < config.debug_limit {
            debug!("{}", control_unit.snapshot());
        } else if tick == config.debug_limit {
            warn!("debug limit reached");
        }
    }

    let ticks = control_unit.current_tick();
    let limit_reached = ticks >= config.limit;
    if limit_reached {
        warn!("tick limit of {} exceeded", config.limit);
    }

    let data_path = control_unit.into_data_path();
    let output = decode_output(data_path.output());
    info!("output: {}", output);
    info!("end simulation");

    Ok(SimReport {
        output,
        output_codes: data_path.output().to_vec(),
        instructions,
        ticks,
        stop,
        limit_reached,
        registers: data_path.registers().to_vec(),
    })
}

/// Translate `source` and run it against `input_text`.
pub fn run_source(source: &str, input_text: &str, config: &SimConfig) -> Result<SimReport, SimError> {
    let image = translate(source)?;
    simulate(image, input_from_text(input_text), config)
}

/// Errors that end a run abnormally.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("translation failed: {0}")]
    Translate(#[from] TranslateError),

    #[error("bad image: {0}")]
    Image(#[from] ImageError),

    #[error("machine setup failed: {0}")]
    Setup(#[from] DataPathError),

    #[error("CPU error at tick {tick}, PC={pc}: {source}")]
    Cpu { tick: u64, pc: usize, source: CpuError },
}
