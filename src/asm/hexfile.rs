//! Word image files.
//!
//! A simple text format for assembled programs:
//! - One word per line, written as `0x` followed by eight hex digits
//! - Anything after `;` is a comment
//! - Blank lines are ignored
//!
//! `save_words` annotates each word with its byte offset and disassembly.

use std::path::Path;
use std::io::{BufRead, BufReader, Write};
use crate::isa::{Word, WORD_BYTES};
use crate::asm::disasm::disassemble_word;
use thiserror::Error;

/// Parse word image text.
pub fn parse_words(source: &str) -> Result<Vec<Word>, HexFileError> {
    source
        .lines()
        .enumerate()
        .filter_map(|(line_num, line)| parse_line(line, line_num + 1).transpose())
        .collect()
}

fn parse_line(line: &str, line_num: usize) -> Result<Option<Word>, HexFileError> {
    let code = match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }

    let digits = code
        .strip_prefix("0x")
        .or_else(|| code.strip_prefix("0X"))
        .unwrap_or(code);
    Word::from_str_radix(digits, 16)
        .map(Some)
        .map_err(|e| HexFileError::ParseError {
            line: line_num,
            message: format!("bad word {:?}: {}", code, e),
        })
}

/// Load a word image from disk.
pub fn load_words<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, HexFileError> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| HexFileError::IoError(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut words = Vec::new();
    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| HexFileError::IoError(e.to_string()))?;
        if let Some(word) = parse_line(&line, line_num + 1)? {
            words.push(word);
        }
    }

    Ok(words)
}

/// Render words in the image format, with a header and per-line comments.
pub fn render_words(words: &[Word]) -> String {
    let mut output = String::new();
    output.push_str("; minimips word image\n");
    output.push_str(&format!("; {} words\n\n", words.len()));

    for (i, &word) in words.iter().enumerate() {
        // Format: 0xWWWWWWWW ; offset  disassembly
        output.push_str(&format!(
            "{:#010x} ; {:04x}  {}\n",
            word,
            i as Word * WORD_BYTES,
            disassemble_word(word)
        ));
    }

    output
}

/// Save a word image to disk.
pub fn save_words<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), HexFileError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| HexFileError::IoError(e.to_string()))?;

    file.write_all(render_words(words).as_bytes())
        .map_err(|e| HexFileError::IoError(e.to_string()))
}

/// Errors that can occur during word image operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexFileError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_roundtrip() {
        let words = vec![0x2001_0005, 0x0022_1820, 0xFC00_0000];
        let file = tempfile::NamedTempFile::new().unwrap();

        save_words(file.path(), &words).unwrap();
        let loaded = load_words(file.path()).unwrap();

        assert_eq!(loaded, words);
    }

    #[test]
    fn test_rendering_is_annotated() {
        let text = render_words(&[0xFC00_0000]);
        assert!(text.contains("0xfc000000 ; 0000  HALT"));
    }

    #[test]
    fn test_parse_accepts_bare_hex_and_comments() {
        let words = parse_words("; header\n\nFC000000\n0x00000001 ; one\n").unwrap();
        assert_eq!(words, vec![0xFC00_0000, 1]);
    }

    #[test]
    fn test_parse_error_line() {
        assert_eq!(
            parse_words("0x1\nnope\n").unwrap_err(),
            HexFileError::ParseError {
                line: 2,
                message: "bad word \"nope\": invalid digit found in string".into(),
            }
        );
    }
}
