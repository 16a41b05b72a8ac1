//! Byte encoding of [`LogEntryMap`] values as they are stored in the cache.
//!
//! Encoding is deterministic (entries are ordered by stressor id), so the
//! bytes read from a key can be handed back to the store as the expected
//! value of a conditional operation.

use crate::log_value::LogEntryMap;

/// A stored value could not be encoded or is not a shared log value.
#[derive(Debug, thiserror::Error)]
#[error("shared log value codec error: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Encode a log value for storage.
pub fn encode(value: &LogEntryMap) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a stored value; fails for anything that is not a log value.
pub fn decode(bytes: &[u8]) -> Result<LogEntryMap, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}
