//! Compact JSON encoding of result records
//!
//! Key order follows struct field order. Arrays end with a newline, single
//! objects do not; callers must not depend on either.

use serde::Serialize;

/// Encode an enumeration result.
pub fn encode_list<T: Serialize>(records: &[T]) -> Result<String, serde_json::Error> {
    let mut encoded = serde_json::to_string(records)?;
    encoded.push('\n');
    Ok(encoded)
}

/// Encode a single record.
pub fn encode_record<T: Serialize>(record: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}
