//! WebAssembly bindings for the simulator.
//!
//! This module provides JavaScript-friendly wrappers around the control unit.

use wasm_bindgen::prelude::*;
use crate::asm::{disassemble, format_instruction, translate};
use crate::cpu::{decode_output, ControlUnit, DataPath, StepOutcome};
use crate::isa::ProgramImage;
use crate::sim::input_from_text;

const REGISTERS: usize = 4;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    cu: Option<ControlUnit>,
    image: ProgramImage,
    input: Vec<char>,
    halted: bool,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create an empty machine. Load a program before stepping.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cu: None,
            image: ProgramImage::default(),
            input: Vec::new(),
            halted: false,
        }
    }

    /// Translate assembly source and load it. Returns the instruction count.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str, input: &str) -> Result<usize, JsError> {
        let image = translate(source).map_err(js_err)?;
        self.load(image, input)
    }

    /// Load a JSON program image. Returns the instruction count.
    #[wasm_bindgen]
    pub fn load_json(&mut self, json: &str, input: &str) -> Result<usize, JsError> {
        let image = ProgramImage::from_json(json).map_err(js_err)?;
        self.load(image, input)
    }

    fn load(&mut self, image: ProgramImage, input: &str) -> Result<usize, JsError> {
        let len = image.code.len();
        self.image = image;
        self.input = input_from_text(input);
        self.reset_machine()?;
        Ok(len)
    }

    fn reset_machine(&mut self) -> Result<(), JsError> {
        let data_path = DataPath::new(self.image.data.clone(), REGISTERS, self.input.iter().copied())
            .map_err(js_err)?;
        self.cu = Some(ControlUnit::new(self.image.code.clone(), data_path));
        self.halted = false;
        Ok(())
    }

    fn machine(&self) -> Result<&ControlUnit, JsError> {
        self.cu.as_ref().ok_or_else(|| JsError::new("no program loaded"))
    }

    /// Execute one instruction. Returns its text.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if self.halted {
            return Err(JsError::new("machine is halted"));
        }
        let cu = self.cu.as_mut().ok_or_else(|| JsError::new("no program loaded"))?;
        let text = cu.current_instruction().map(format_instruction).unwrap_or_default();

        match cu.step() {
            Ok(StepOutcome::Halted) => self.halted = true,
            Ok(StepOutcome::Executed(_)) => {}
            Err(e) => {
                self.halted = true;
                return Err(js_err(e));
            }
        }
        Ok(text)
    }

    /// Run until halt, end of input, an error, or `max_ticks`. Returns the tick count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_ticks: u32) -> u64 {
        let Some(cu) = self.cu.as_mut() else {
            return 0;
        };
        while !self.halted && cu.current_tick() < u64::from(max_ticks) {
            match cu.step() {
                Ok(StepOutcome::Executed(_)) => {}
                Ok(StepOutcome::Halted) | Err(_) => self.halted = true,
            }
        }
        cu.current_tick()
    }

    /// Reset the machine to its state right after loading.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.reset_machine()
    }

    /// Check if the machine has stopped.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Ticks elapsed.
    #[wasm_bindgen]
    pub fn tick(&self) -> u64 {
        self.cu.as_ref().map_or(0, ControlUnit::current_tick)
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> usize {
        self.cu.as_ref().map_or(0, ControlUnit::program_counter)
    }

    /// Zero flag.
    #[wasm_bindgen]
    pub fn zero(&self) -> bool {
        self.cu.as_ref().is_some_and(|cu| cu.data_path().zero())
    }

    /// Register file as a JS array of numbers.
    #[wasm_bindgen]
    pub fn registers(&self) -> js_sys::Array {
        let array = js_sys::Array::new();
        if let Some(cu) = &self.cu {
            for value in cu.data_path().registers() {
                array.push(&JsValue::from_f64(*value as f64));
            }
        }
        array
    }

    /// Data memory cell value at `index`, or 0 when out of range.
    #[wasm_bindgen]
    pub fn memory_at(&self, index: usize) -> i64 {
        self.cu
            .as_ref()
            .and_then(|cu| cu.data_path().data_memory().get(index))
            .map_or(0, |cell| cell.value())
    }

    /// Number of data memory cells.
    #[wasm_bindgen]
    pub fn memory_len(&self) -> usize {
        self.cu.as_ref().map_or(0, |cu| cu.data_path().data_memory().len())
    }

    /// Output produced so far, rendered as text.
    #[wasm_bindgen]
    pub fn output(&self) -> String {
        self.cu
            .as_ref()
            .map(|cu| decode_output(cu.data_path().output()))
            .unwrap_or_default()
    }

    /// Current machine state as a JSON object.
    #[wasm_bindgen]
    pub fn snapshot_json(&self) -> Result<String, JsError> {
        let snapshot = self.machine()?.snapshot();
        serde_json::to_string(&snapshot).map_err(js_err)
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate source code and return the JSON image.
#[wasm_bindgen]
pub fn wasm_translate(source: &str) -> Result<String, JsError> {
    let image = translate(source).map_err(js_err)?;
    image.to_json().map_err(js_err)
}

/// Disassemble a JSON image.
#[wasm_bindgen]
pub fn wasm_disassemble(json: &str) -> Result<String, JsError> {
    let image = ProgramImage::from_json(json).map_err(js_err)?;
    Ok(disassemble(&image))
}
