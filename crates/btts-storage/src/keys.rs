//! Key encoding and decoding for storage layer.
//!
//! Numeric ids are stored as 8 big-endian bytes with the sign bit flipped,
//! so RocksDB's bytewise order matches numeric order for negative ids too.
//! The `api_key_chats` join key is `id(chat) || key` which makes "all keys
//! granted on a chat" a prefix scan.

use crate::error::StorageError;

const SIGN_BIT: u64 = 1 << 63;

/// Encode an i64 id into an order-preserving key
pub fn id_key(id: i64) -> [u8; 8] {
    ((id as u64) ^ SIGN_BIT).to_be_bytes()
}

/// Decode an id key written by [`id_key`]
pub fn id_from_key(bytes: &[u8]) -> Result<i64, StorageError> {
    let raw: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StorageError::Key(format!("id key too short: {} bytes", bytes.len())))?;
    Ok((u64::from_be_bytes(raw) ^ SIGN_BIT) as i64)
}

/// Join key for `api_key_chats`
pub fn chat_grant_key(chat_id: i64, api_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + api_key.len());
    key.extend_from_slice(&id_key(chat_id));
    key.extend_from_slice(api_key.as_bytes());
    key
}

/// Split a join key back into `(chat_id, api_key)`
pub fn parse_chat_grant_key(bytes: &[u8]) -> Result<(i64, String), StorageError> {
    let chat_id = id_from_key(bytes)?;
    let api_key = std::str::from_utf8(&bytes[8..])
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
    Ok((chat_id, api_key.to_string()))
}

/// Key of the updates state singleton
pub const UPDATES_STATE_KEY: &[u8] = b"state";
