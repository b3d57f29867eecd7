//! Record line codec
//!
//! One record version ⇄ one newline-terminated JSON line.

use crate::error::{FileDbError, Result};

use super::{Fields, Record};

/// Encode a record as a JSON line including the trailing `\n`
pub fn encode_line(record: &Record) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)
        .map_err(|e| FileDbError::Serialization(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one log line
///
/// Permissive about whitespace, key order, and numeric ids; strict about the
/// line being a single object of scalars with an `_id`.
pub fn decode_line(line: &[u8]) -> Result<Record> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Err(FileDbError::Decode("empty line".to_string()));
    }

    let fields: Fields =
        serde_json::from_slice(trimmed).map_err(|e| FileDbError::Decode(e.to_string()))?;

    Record::from_fields(fields).map_err(|e| match e {
        FileDbError::InvalidRecord(msg) => FileDbError::Decode(msg),
        other => other,
    })
}
