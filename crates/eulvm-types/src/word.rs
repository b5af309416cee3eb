use core::cmp::Ordering;
use core::fmt;

use primitive_types::U256;

/// A 256-bit unsigned integer: the only runtime value type in the EulVM.
///
/// Arithmetic (`add`, `sub`, `mul`) wraps modulo 2²⁵⁶, matching the
/// semantics of the stack machine's `ADD`/`SUB`/`MUL` opcodes. Ordering is
/// the usual total order over unsigned 256-bit integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Word(U256);

impl Word {
    /// The additive identity.
    pub const ZERO: Word = Word(U256::zero());

    /// The multiplicative identity.
    pub const ONE: Word = Word(U256::one());

    /// Construct a word from its low 64 bits, with the high bits cleared.
    pub fn from_u64(value: u64) -> Self {
        Word(U256::from(value))
    }

    /// Truncate to the low 64 bits.
    pub fn to_u64(self) -> u64 {
        self.0.low_u64()
    }

    /// Parse a word from a 32-byte big-endian array.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        Word(U256::from_big_endian(bytes))
    }

    /// Serialize to a 32-byte big-endian array.
    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.0.to_big_endian(&mut out);
        out
    }

    /// Construct a word equal to one (the canonical "true" value).
    pub fn one() -> Self {
        Word::ONE
    }

    /// Set this word to one in place, matching the VM's boolean-result
    /// convention.
    pub fn set_one(&mut self) {
        self.0 = U256::one();
    }

    /// Set this word to zero in place.
    pub fn clear(&mut self) {
        self.0 = U256::zero();
    }

    /// True if this word is the zero value — the VM's "falsy" test used by
    /// `JUMPI` and `NOT`.
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Wrapping addition, mod 2²⁵⁶.
    pub fn wrapping_add(self, rhs: Word) -> Word {
        Word(self.0.overflowing_add(rhs.0).0)
    }

    /// Wrapping subtraction, mod 2²⁵⁶.
    pub fn wrapping_sub(self, rhs: Word) -> Word {
        Word(self.0.overflowing_sub(rhs.0).0)
    }

    /// Wrapping multiplication, mod 2²⁵⁶.
    pub fn wrapping_mul(self, rhs: Word) -> Word {
        Word(self.0.overflowing_mul(rhs.0).0)
    }

    /// Bitwise AND.
    pub fn bitand(self, rhs: Word) -> Word {
        Word(self.0 & rhs.0)
    }

    /// Bitwise OR.
    pub fn bitor(self, rhs: Word) -> Word {
        Word(self.0 | rhs.0)
    }

    /// Boolean word from a Rust `bool`, per the ABI's `bool` encoding.
    pub fn from_bool(b: bool) -> Word {
        if b {
            Word::ONE
        } else {
            Word::ZERO
        }
    }
}

impl PartialOrd for Word {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Word {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Word::from_u64(value)
    }
}

impl From<bool> for Word {
    fn from(value: bool) -> Self {
        Word::from_bool(value)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word(0x{:x})", self.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_add_overflows_to_zero() {
        let max = Word::from_be_bytes(&[0xff; 32]);
        assert_eq!(max.wrapping_add(Word::ONE), Word::ZERO);
    }

    #[test]
    fn roundtrip_be_bytes() {
        let w = Word::from_u64(0x1122_3344_5566_7788);
        assert_eq!(Word::from_be_bytes(&w.to_be_bytes()), w);
    }

    #[test]
    fn is_zero_matches_default() {
        assert!(Word::default().is_zero());
        assert!(!Word::ONE.is_zero());
    }

    #[quickcheck_macros::quickcheck]
    fn add_is_commutative(a: u64, b: u64) -> bool {
        let (a, b) = (Word::from_u64(a), Word::from_u64(b));
        a.wrapping_add(b) == b.wrapping_add(a)
    }

    #[quickcheck_macros::quickcheck]
    fn ordering_matches_u64_for_small_words(a: u64, b: u64) -> bool {
        (Word::from_u64(a) < Word::from_u64(b)) == (a < b)
    }
}
