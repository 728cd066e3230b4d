//! Data files: the initial contents of memory.
//!
//! One `address,value` pair per line. The address is written in binary and
//! names a raw word index; the value is a decimal integer. Negative values are
//! stored as their two's complement word. Values outside
//! `i32::MIN..=u32::MAX` are rejected.
//!
//! ```text
//! 0,10
//! 1,-3
//! 101,42
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use crate::isa::Word;
use thiserror::Error;

/// Parse data file text into an index -> value map.
///
/// Later lines overwrite earlier lines with the same address.
pub fn parse_data(source: &str) -> Result<BTreeMap<usize, Word>, DataError> {
    let mut memory = BTreeMap::new();

    for (line_num, line) in source.lines().enumerate() {
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }

        let parse_error = |message: String| DataError::ParseError {
            line: line_num + 1,
            message,
        };

        let (address, value) = trimmed
            .split_once(',')
            .ok_or_else(|| parse_error("expected `address,value`".into()))?;
        let (address, value) = (address.trim(), value.trim());

        let address = usize::from_str_radix(address, 2)
            .map_err(|e| parse_error(format!("bad binary address {:?}: {}", address, e)))?;
        let value: i64 = value
            .parse()
            .map_err(|e| parse_error(format!("bad value {:?}: {}", value, e)))?;
        if !(i64::from(i32::MIN)..=i64::from(Word::MAX)).contains(&value) {
            return Err(parse_error(format!("value {} does not fit in a 32-bit word", value)));
        }

        memory.insert(address, value as Word);
    }

    Ok(memory)
}

/// Load a data file from disk.
pub fn load_data<P: AsRef<Path>>(path: P) -> Result<BTreeMap<usize, Word>, DataError> {
    let source = std::fs::read_to_string(path.as_ref())
        .map_err(|e| DataError::IoError(e.to_string()))?;
    parse_data(&source)
}

/// Errors that can occur while reading a data file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}
