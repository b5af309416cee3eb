//! Parsing shared between compile-time literal folding ([`crate::emitter`])
//! and runtime argument encoding ([`crate::abi`]) — both need the same
//! `bytes32`/`address` hex-string conventions.

use eulvm_types::Word;

/// Parse a `bytes32` literal: a `0x`-prefixed, 66-character hex string
/// (32 raw bytes). Returns `None` on any malformed input.
pub fn parse_bytes32(s: &str) -> Option<Word> {
    let hex_part = s.strip_prefix("0x")?;
    if hex_part.len() != 64 {
        return None;
    }
    let bytes = hex::decode(hex_part).ok()?;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Some(Word::from_be_bytes(&arr))
}

/// Parse an `address` literal: a `0x`-prefixed hex string of at most 40
/// hex digits, right-aligned and zero-padded to 32 bytes. Returns `None`
/// on any malformed input.
pub fn parse_address(s: &str) -> Option<Word> {
    let hex_part = s.strip_prefix("0x")?;
    if hex_part.is_empty() || hex_part.len() > 40 {
        return None;
    }
    let padded = if hex_part.len() % 2 == 0 {
        hex_part.to_string()
    } else {
        format!("0{hex_part}")
    };
    let bytes = hex::decode(padded).ok()?;
    if bytes.len() > 20 {
        return None;
    }
    let mut arr = [0u8; 32];
    arr[32 - bytes.len()..].copy_from_slice(&bytes);
    Some(Word::from_be_bytes(&arr))
}
