//! Fixed-width identifier keys.
//!
//! Identifiers are canonicalised to 8-byte little-endian integers. Every key
//! stored for an identifier starts with exactly these 8 bytes, so a prefix
//! scan over them isolates one identifier's rows even when the decimal text
//! of one identifier is a prefix of another.

use crate::error::{Result, StoreError};

/// Width of an encoded identifier in bytes
pub const IDENTIFIER_KEY_LEN: usize = 8;

/// Encoded identifier
pub type IdentifierKey = [u8; IDENTIFIER_KEY_LEN];

/// Encode identifier text as a fixed-width key.
///
/// Accepts a non-empty run of ASCII digits whose value fits in a `u64`.
/// Signs, whitespace and any other byte are rejected.
pub fn encode_identifier(text: &[u8]) -> Result<IdentifierKey> {
    if text.is_empty() {
        return Err(StoreError::invalid_identifier(text, "empty identifier"));
    }

    let mut value: u64 = 0;
    for &byte in text {
        if !byte.is_ascii_digit() {
            return Err(StoreError::invalid_identifier(
                text,
                format!("unexpected byte 0x{byte:02x}"),
            ));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(byte - b'0')))
            .ok_or_else(|| StoreError::invalid_identifier(text, "exceeds 64 bits"))?;
    }

    Ok(value.to_le_bytes())
}

/// Build the association key for an (identifier, label) pair.
pub fn association_key(identifier: &IdentifierKey, label: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(IDENTIFIER_KEY_LEN + label.len());
    key.extend_from_slice(identifier);
    key.extend_from_slice(label);
    key
}
