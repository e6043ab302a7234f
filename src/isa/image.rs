//! Program image interchange format.
//!
//! An image is a JSON array:
//! - element 0: the number of data entries `n`
//! - elements `1..=n`: data cells (`number`/`string`/`buffer`)
//! - the rest: program instructions
//!
//! Each entry is `{"index": i, "opcode": "<mnemonic>", "args": [...]}`.

use crate::isa::{MachineCode, Opcode};
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// A loaded program: data segment plus code segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Data memory cells.
    pub data: Vec<MachineCode>,
    /// Program memory.
    pub code: Vec<MachineCode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Length(u64),
    Word(MachineCode),
}

impl ProgramImage {
    /// Create an image from its two segments.
    pub fn new(data: Vec<MachineCode>, code: Vec<MachineCode>) -> Self {
        Self { data, code }
    }

    /// Number of elements in the serialized array, header included.
    pub fn entry_count(&self) -> usize {
        1 + self.data.len() + self.code.len()
    }

    /// Parse an image from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let raw: Vec<RawEntry> = serde_json::from_str(text)
            .map_err(|e| ImageError::Json(e.to_string()))?;

        let mut entries = raw.into_iter();
        let data_len = match entries.next() {
            Some(RawEntry::Length(n)) => usize::try_from(n)
                .map_err(|_| ImageError::BadHeader(format!("data length {} does not fit in memory", n)))?,
            Some(RawEntry::Word(_)) => {
                return Err(ImageError::BadHeader("first element must be the data length".into()))
            }
            None => return Err(ImageError::BadHeader("empty image".into())),
        };

        let mut words = Vec::new();
        for (position, entry) in entries.enumerate() {
            match entry {
                RawEntry::Word(word) => words.push(word),
                RawEntry::Length(_) => return Err(ImageError::UnexpectedInteger(position + 1)),
            }
        }

        if data_len > words.len() {
            return Err(ImageError::BadHeader(format!(
                "data length {} exceeds {} entries",
                data_len,
                words.len()
            )));
        }

        let code = words.split_off(data_len);
        let image = Self { data: words, code };
        image.validate()?;
        Ok(image)
    }

    /// Render the image in its interchange form, one entry per line.
    pub fn to_json(&self) -> Result<String, ImageError> {
        let mut buf = vec![self.data.len().to_string()];
        for word in self.data.iter().chain(self.code.iter()) {
            buf.push(serde_json::to_string(word).map_err(|e| ImageError::Json(e.to_string()))?);
        }
        Ok(format!("[{}]", buf.join(",\n ")))
    }

    /// Check that every entry sits in the segment its tag belongs to.
    pub fn validate(&self) -> Result<(), ImageError> {
        for word in &self.data {
            if !word.opcode.is_data() {
                return Err(ImageError::MisplacedEntry { segment: "data", index: word.index, opcode: word.opcode });
            }
            if word.args.is_empty() {
                return Err(ImageError::EmptyCell(word.index));
            }
        }
        for word in &self.code {
            if word.opcode.is_data() {
                return Err(ImageError::MisplacedEntry { segment: "code", index: word.index, opcode: word.opcode });
            }
        }
        Ok(())
    }
}

/// Load an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    ProgramImage::from_json(&text)
}

/// Save an image to disk.
pub fn save_image<P: AsRef<Path>>(path: P, image: &ProgramImage) -> Result<(), ImageError> {
    let text = image.to_json()?;
    std::fs::write(path.as_ref(), text).map_err(|e| ImageError::IoError(e.to_string()))
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("bad image header: {0}")]
    BadHeader(String),

    #[error("unexpected bare integer at element {0}")]
    UnexpectedInteger(usize),

    #[error("{opcode} at index {index} does not belong in the {segment} segment")]
    MisplacedEntry { segment: &'static str, index: usize, opcode: Opcode },

    #[error("data cell {0} has no value")]
    EmptyCell(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProgramImage {
        ProgramImage::new(
            vec![
                MachineCode::new(0, Opcode::Number, vec![1234]),
                MachineCode::new(1, Opcode::Number, vec![1234]),
                MachineCode::new(2, Opcode::String, vec![104]),
                MachineCode::new(3, Opcode::String, vec![0]),
            ],
            vec![
                MachineCode::new(0, Opcode::LoadV, vec![0, 2]),
                MachineCode::new(1, Opcode::StoreV, vec![1, 0]),
                MachineCode::new(2, Opcode::Hlt, vec![]),
            ],
        )
    }

    #[test]
    fn test_json_layout() {
        let text = sample().to_json().unwrap();
        assert!(text.starts_with("[4,\n {\"index\":0,\"opcode\":\"number\",\"args\":[1234]}"));
        assert!(text.contains("\"opcode\":\"load_v\""));
        assert!(text.ends_with("{\"index\":2,\"opcode\":\"hlt\",\"args\":[]}]"));
    }

    #[test]
    fn test_parse_written_image() {
        let image = sample();
        let parsed = ProgramImage::from_json(&image.to_json().unwrap()).unwrap();
        assert_eq!(parsed, image);
        assert_eq!(parsed.entry_count(), 8);
    }

    #[test]
    fn test_parse_handwritten_image() {
        let text = r#"[2,
            {"index": 0, "opcode": "number", "args": [1234]},
            {"index": 1, "opcode": "number", "args": [1234]},
            {"index": 0, "opcode": "mov", "args": [0, 5]},
            {"index": 1, "opcode": "hlt"}]"#;
        let image = ProgramImage::from_json(text).unwrap();
        assert_eq!(image.data.len(), 2);
        assert_eq!(image.code[0].opcode, Opcode::Mov);
        assert!(image.code[1].args.is_empty());
    }

    #[test]
    fn test_reject_bad_header() {
        assert!(matches!(ProgramImage::from_json("[]"), Err(ImageError::BadHeader(_))));
        assert!(matches!(
            ProgramImage::from_json(r#"[{"index":0,"opcode":"hlt","args":[]}]"#),
            Err(ImageError::BadHeader(_))
        ));
        assert!(matches!(ProgramImage::from_json("[3]"), Err(ImageError::BadHeader(_))));
        assert!(matches!(
            ProgramImage::from_json(r#"[4294967297, {"index":0,"opcode":"hlt"}]"#),
            Err(ImageError::BadHeader(_))
        ));
    }

    #[test]
    fn test_reject_misplaced_entries() {
        let text = r#"[1, {"index":0,"opcode":"mov","args":[0,1]}]"#;
        assert!(matches!(
            ProgramImage::from_json(text),
            Err(ImageError::MisplacedEntry { segment: "data", .. })
        ));

        let text = r#"[0, {"index":0,"opcode":"buffer","args":[0]}]"#;
        assert!(matches!(
            ProgramImage::from_json(text),
            Err(ImageError::MisplacedEntry { segment: "code", .. })
        ));
    }

    #[test]
    fn test_reject_unknown_opcode() {
        let text = r#"[0, {"index":0,"opcode":"push","args":[0]}]"#;
        assert!(ProgramImage::from_json(text).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("accsim-image-{}.json", std::process::id()));
        save_image(&path, &sample()).unwrap();
        let loaded = load_image(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, sample());
    }
}
