//! Key encoding utilities for `RocksDB`.
//!
//! Names are written as a one-byte length followed by the name bytes, so a
//! stream's keys never collide with another stream whose name shares a
//! prefix. Entry ids are appended big-endian, which makes a forward prefix
//! scan visit entries in id order.

use tollgate_core::EntryId;

use crate::error::{Result, StoreError};

/// Maximum length of a stream, group, or consumer name in bytes.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Check that a name can be encoded.
///
/// # Errors
///
/// Returns `InvalidName` if the name is empty or longer than 255 bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn push_name(key: &mut Vec<u8>, name: &str) {
    // Callers validate names first, so the length always fits in a byte.
    key.push(u8::try_from(name.len()).unwrap_or(u8::MAX));
    key.extend_from_slice(name.as_bytes());
}

/// Encode a stream key: `name(stream)`.
///
/// Also the prefix of every entry key of that stream.
#[must_use]
pub fn stream_key(stream: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + stream.len());
    push_name(&mut key, stream);
    key
}

/// Encode an entry key: `name(stream) || entry_id`.
#[must_use]
pub fn entry_key(stream: &str, id: EntryId) -> Vec<u8> {
    let mut key = stream_key(stream);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Encode a group key: `name(stream) || name(group)`.
///
/// Also the prefix of every pending key of that group.
#[must_use]
pub fn group_key(stream: &str, group: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + stream.len() + group.len());
    push_name(&mut key, stream);
    push_name(&mut key, group);
    key
}

/// Encode a pending key: `name(stream) || name(group) || entry_id`.
#[must_use]
pub fn pending_key(stream: &str, group: &str, id: EntryId) -> Vec<u8> {
    let mut key = group_key(stream, group);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Extract the trailing entry id from an entry or pending key.
///
/// # Errors
///
/// Returns `Database` if the key is shorter than an encoded id.
pub fn extract_entry_id(key: &[u8]) -> Result<EntryId> {
    let start = key
        .len()
        .checked_sub(EntryId::ENCODED_LEN)
        .ok_or_else(|| StoreError::Database("truncated key".to_string()))?;
    EntryId::from_be_bytes(&key[start..]).map_err(|e| StoreError::Database(e.to_string()))
}
