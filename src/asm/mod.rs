//! Assembly language front end.
//!
//! This module provides:
//! - A two-pass translator (text → program image)
//! - A disassembler (program image → readable listing)

pub mod translator;
pub mod disasm;

pub use translator::{translate, TranslateError};
pub use disasm::{disassemble, format_instruction};
