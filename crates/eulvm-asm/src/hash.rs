use sha3::{Digest, Keccak256};

use eulvm_types::Word;

/// Keccak-256 of an arbitrary byte slice, folded into a [`Word`].
///
/// This is the one hash primitive the whole toolchain shares: the
/// emitter uses it to turn a plain variable's name into its versioned-KV
/// key at compile time, and the interpreter's `MAPVSSTORE`/`MAPVSLOAD`
/// dispatch uses it at runtime to combine a map key with the map's name
/// prefix.
pub fn keccak256(bytes: &[u8]) -> Word {
    let digest = Keccak256::digest(bytes);
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    Word::from_be_bytes(&arr)
}

/// Pad `name` to a 32-byte map-name prefix, as used for the `operand` of
/// `MAPVSSTORE`/`MAPVSLOAD`. Fails (returns `None`) if the name doesn't
/// fit — the emitter surfaces this as a `NameTooLong` diagnostic.
pub fn map_name_prefix(name: &str) -> Option<Word> {
    let bytes = name.as_bytes();
    if bytes.len() > 32 {
        return None;
    }
    let mut buf = [0u8; 32];
    buf[..bytes.len()].copy_from_slice(bytes);
    Some(Word::from_be_bytes(&buf))
}

/// The state key for a plain (non-map) variable: Keccak-256 of its name.
pub fn variable_key(name: &str) -> Word {
    keccak256(name.as_bytes())
}

/// The state key for one slot of a map: Keccak-256 of `key || prefix`
/// (64-byte buffer, key first).
pub fn map_slot_key(key: Word, prefix: Word) -> Word {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&key.to_be_bytes());
    buf[32..].copy_from_slice(&prefix.to_be_bytes());
    keccak256(&buf)
}
