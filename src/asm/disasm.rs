//! Disassembler for program images.
//!
//! Converts loaded images back to a readable listing. Register operands
//! are shown with the same `r1`-based names the translator accepts.

use crate::isa::{ArgKind, MachineCode, ProgramImage};

/// Format a single instruction, e.g. `load_v r1, 0`.
pub fn format_instruction(word: &MachineCode) -> String {
    let signature = word.opcode.signature();
    let operands: Vec<String> = word
        .args
        .iter()
        .enumerate()
        .map(|(i, &arg)| match signature.get(i) {
            Some(ArgKind::Reg) => arg
                .checked_add(1)
                .filter(|n| *n >= 1)
                .map_or_else(|| arg.to_string(), |n| format!("r{}", n)),
            _ => arg.to_string(),
        })
        .collect();

    if operands.is_empty() {
        word.opcode.mnemonic().to_string()
    } else {
        format!("{} {}", word.opcode.mnemonic(), operands.join(", "))
    }
}

/// Disassemble a whole image.
pub fn disassemble(image: &ProgramImage) -> String {
    let mut output = String::new();
    output.push_str(&format!("; data segment ({} cells)\n", image.data.len()));
    for (addr, cell) in image.data.iter().enumerate() {
        let value = cell.value();
        let shown = match u8::try_from(value) {
            Ok(byte) if byte.is_ascii_graphic() || byte == b' ' => format!("  ; '{}'", byte as char),
            _ => String::new(),
        };
        output.push_str(&format!("{:03}: {} {}{}\n", addr, cell.opcode.mnemonic(), value, shown));
    }

    output.push_str(&format!("\n; code segment ({} instructions)\n", image.code.len()));
    for (addr, word) in image.code.iter().enumerate() {
        output.push_str(&format!("{:03}: {}\n", addr, format_instruction(word)));
    }

    output
}
