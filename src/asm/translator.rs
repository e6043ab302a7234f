//! Translator from assembly text to a [`ProgramImage`].
//!
//! Syntax:
//! ```text
//! ; Comment
//! .data
//!     NUMBER count 3          ; one cell
//!     STRING hello "Hi!"      ; one cell per character plus a 0 terminator
//!     BUFFER buf 16           ; sixteen zeroed cells
//! .code
//! loop:                       ; label
//!     input r1                ; load_v r1 0
//!     jz_r end r1
//!     output r1               ; store_v 1 r1
//!     jmp loop
//! end:
//!     hlt
//! ```
//!
//! Registers are written `r1`, `r2`, ... and encoded as 0, 1, ...
//! Data cells 0 and 1 are reserved for the I/O ports.

use crate::isa::{ArgKind, MachineCode, Opcode, ProgramImage, INPUT_MAP, OUTPUT_MAP};
use std::collections::HashMap;
use thiserror::Error;

/// Placeholder payload of the two reserved port cells.
const PORT_CELL_VALUE: i64 = 1234;

/// Translate source code to a program image.
pub fn translate(source: &str) -> Result<ProgramImage, TranslateError> {
    let mut translator = Translator::new();
    translator.translate(source)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Data,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Value(i64),
    Symbol(String),
}

/// An instruction whose symbolic arguments are not resolved yet.
#[derive(Debug, Clone)]
struct PendingWord {
    opcode: Opcode,
    args: Vec<Arg>,
    line: usize,
}

/// The translator state.
struct Translator {
    /// Variable name -> data address.
    variables: HashMap<String, i64>,
    /// Label -> instruction index.
    labels: HashMap<String, i64>,
    data: Vec<MachineCode>,
    code: Vec<PendingWord>,
}

impl Translator {
    fn new() -> Self {
        let data = (0..2)
            .map(|i| MachineCode::new(i, Opcode::Number, vec![PORT_CELL_VALUE]))
            .collect();
        Self {
            variables: HashMap::new(),
            labels: HashMap::new(),
            data,
            code: Vec::new(),
        }
    }

    fn translate(&mut self, source: &str) -> Result<ProgramImage, TranslateError> {
        // Pass 1: lay out data, collect labels and unresolved instructions
        let mut section = Section::None;
        for (line_num, raw) in source.lines().enumerate() {
            let line_num = line_num + 1;
            let line = strip_comment(raw);
            if line.is_empty() {
                continue;
            }

            if line.starts_with(".data") {
                section = Section::Data;
                continue;
            }
            if line.starts_with(".code") {
                section = Section::Code;
                continue;
            }

            match section {
                Section::Data => self.process_data(line, line_num)?,
                Section::Code => self.process_code(line, line_num)?,
                Section::None => return Err(TranslateError::NoSection { line: line_num }),
            }
        }

        // Pass 2: resolve labels and variables
        let code = std::mem::take(&mut self.code)
            .into_iter()
            .enumerate()
            .map(|(index, word)| self.resolve(index, word))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProgramImage::new(std::mem::take(&mut self.data), code))
    }

    fn process_data(&mut self, line: &str, line_num: usize) -> Result<(), TranslateError> {
        let (kind, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let (name, value) = rest
            .trim_start()
            .split_once(char::is_whitespace)
            .map(|(name, value)| (name, value.trim()))
            .unwrap_or((rest.trim(), ""));
        if name.is_empty() || value.is_empty() {
            return Err(TranslateError::MalformedData {
                line: line_num,
                message: "expected `KIND name value`".into(),
            });
        }

        let opcode = Opcode::from_mnemonic(kind)
            .filter(|op| op.is_data())
            .ok_or_else(|| TranslateError::UnknownDataKind { line: line_num, kind: kind.to_string() })?;

        if self.variables.contains_key(name) {
            return Err(TranslateError::DuplicateSymbol { line: line_num, symbol: name.to_string() });
        }
        self.variables.insert(name.to_string(), self.data.len() as i64);

        match opcode {
            Opcode::Number => {
                let number = parse_data_value(value, line_num)?;
                self.push_cell(opcode, number);
            }
            Opcode::String => {
                for c in value.trim_matches('"').chars() {
                    self.push_cell(opcode, c as u32 as i64);
                }
                self.push_cell(opcode, 0);
            }
            Opcode::Buffer => {
                let size = parse_data_value(value, line_num)?;
                let size = usize::try_from(size).map_err(|_| TranslateError::MalformedData {
                    line: line_num,
                    message: format!("buffer size {} is negative", size),
                })?;
                for _ in 0..size {
                    self.push_cell(opcode, 0);
                }
            }
            _ => unreachable!("filtered by is_data"),
        }
        Ok(())
    }

    fn push_cell(&mut self, opcode: Opcode, value: i64) {
        let index = self.data.len();
        self.data.push(MachineCode::new(index, opcode, vec![value]));
    }

    fn process_code(&mut self, line: &str, line_num: usize) -> Result<(), TranslateError> {
        if line.ends_with(':') {
            let label = line.trim_matches(':').trim().to_string();
            if self.labels.contains_key(&label) {
                return Err(TranslateError::DuplicateSymbol { line: line_num, symbol: label });
            }
            self.labels.insert(label, self.code.len() as i64);
            return Ok(());
        }

        let mut parts = line.split_whitespace();
        let mnemonic = parts.next().unwrap_or_default();
        let mut args: Vec<Arg> = parts
            .map(|part| part.trim_end_matches(','))
            .filter(|part| !part.is_empty())
            .map(parse_arg)
            .collect();

        let opcode = match mnemonic.to_ascii_lowercase().as_str() {
            "input" => {
                args.push(Arg::Value(INPUT_MAP));
                Opcode::LoadV
            }
            "output" => {
                args.insert(0, Arg::Value(OUTPUT_MAP));
                Opcode::StoreV
            }
            "linear" => return self.process_linear(args, line_num),
            _ => Opcode::from_mnemonic(mnemonic)
                .filter(|op| !op.is_data())
                .ok_or_else(|| TranslateError::UnknownMnemonic {
                    line: line_num,
                    mnemonic: mnemonic.to_string(),
                })?,
        };

        check_arity(opcode, args.len(), line_num)?;
        self.code.push(PendingWord { opcode, args, line: line_num });
        Ok(())
    }

    /// `linear rD v1 rA v2 rB ...` becomes one LINEAR plus a LINEAR_CONT per extra pair.
    fn process_linear(&mut self, args: Vec<Arg>, line_num: usize) -> Result<(), TranslateError> {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Err(TranslateError::BadLinearArity { line: line_num, found: args.len() });
        }

        let dest = args[0].clone();
        self.code.push(PendingWord { opcode: Opcode::Linear, args: args[..3].to_vec(), line: line_num });
        for pair in args[3..].chunks(2) {
            let mut cont = vec![dest.clone()];
            cont.extend_from_slice(pair);
            self.code.push(PendingWord { opcode: Opcode::LinearCont, args: cont, line: line_num });
        }
        Ok(())
    }

    fn resolve(&self, index: usize, word: PendingWord) -> Result<MachineCode, TranslateError> {
        let args = word
            .args
            .into_iter()
            .map(|arg| match arg {
                Arg::Value(value) => Ok(value),
                Arg::Symbol(symbol) => self
                    .labels
                    .get(&symbol)
                    .or_else(|| self.variables.get(&symbol))
                    .copied()
                    .ok_or(TranslateError::UnresolvedSymbol { line: word.line, symbol }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MachineCode::new(index, word.opcode, args))
    }
}

fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or_default().trim()
}

fn parse_arg(text: &str) -> Arg {
    if let Ok(value) = text.parse::<i64>() {
        return Arg::Value(value);
    }
    if let Some(register) = parse_register(text) {
        return Arg::Value(register);
    }
    Arg::Symbol(text.to_string())
}

/// `r1` -> 0, `r2` -> 1, ...
fn parse_register(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('r')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: i64 = digits.parse().ok()?;
    (number >= 1).then(|| number - 1)
}

fn parse_data_value(text: &str, line_num: usize) -> Result<i64, TranslateError> {
    text.parse::<i64>().map_err(|_| TranslateError::MalformedData {
        line: line_num,
        message: format!("expected an integer, found `{}`", text),
    })
}

fn check_arity(opcode: Opcode, found: usize, line_num: usize) -> Result<(), TranslateError> {
    let expected: &[ArgKind] = opcode.signature();
    if expected.len() != found {
        return Err(TranslateError::WrongArity {
            line: line_num,
            opcode,
            expected: expected.len(),
            found,
        });
    }
    Ok(())
}

/// Errors that can occur during translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("line {line}: statement outside of a .data or .code section")]
    NoSection { line: usize },

    #[error("line {line}: unknown data kind `{kind}`")]
    UnknownDataKind { line: usize, kind: String },

    #[error("line {line}: malformed data declaration: {message}")]
    MalformedData { line: usize, message: String },

    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {opcode} takes {expected} arguments, found {found}")]
    WrongArity { line: usize, opcode: Opcode, expected: usize, found: usize },

    #[error("line {line}: linear needs an odd number (>= 3) of arguments, found {found}")]
    BadLinearArity { line: usize, found: usize },

    #[error("line {line}: `{symbol}` is already defined")]
    DuplicateSymbol { line: usize, symbol: String },

    #[error("line {line}: undefined symbol `{symbol}`")]
    UnresolvedSymbol { line: usize, symbol: String },
}
