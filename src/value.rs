//! Native value types shared across the engine.
//!
//! The engine works on host-endian 256-bit words internally; hashes and
//! addresses stay raw bytes.  Conversions between the two representations are
//! always explicit byte swaps, never reinterpretations.

use core::fmt;

/// Host-endian 256-bit unsigned integer.
///
/// `words[0]` holds the 64 lowest precision bits, `words[3]` the highest.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Uint256 {
    pub words: [u64; 4],
}

impl Uint256 {
    pub const ZERO: Self = Self { words: [0; 4] };

    pub fn from_u64(v: u64) -> Self {
        Self { words: [v, 0, 0, 0] }
    }

    /// The low 64 bits. Higher words are simply dropped.
    pub fn low_u64(&self) -> u64 {
        self.words[0]
    }

    pub fn is_zero(&self) -> bool {
        self.words == [0; 4]
    }

    /// True if the value fits in a `u64`.
    pub fn fits_u64(&self) -> bool {
        self.words[1] == 0 && self.words[2] == 0 && self.words[3] == 0
    }

    /// Converts to `usize` if the value fits, `None` otherwise.
    pub fn to_usize(&self) -> Option<usize> {
        if self.fits_u64() {
            usize::try_from(self.words[0]).ok()
        } else {
            None
        }
    }

    pub fn wrapping_add(&self, other: &Self) -> Self {
        let mut out = [0u64; 4];
        let mut carry = 0u64;
        for i in 0..4 {
            let (sum, c1) = self.words[i].overflowing_add(other.words[i]);
            let (sum, c2) = sum.overflowing_add(carry);
            out[i] = sum;
            carry = u64::from(c1) + u64::from(c2);
        }
        Self { words: out }
    }

    /// Big-endian 32-byte representation (the `Hash256` view of the value).
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..4 {
            out[i * 8..(i + 1) * 8].copy_from_slice(&self.words[3 - i].to_be_bytes());
        }
        out
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for i in 0..4 {
            let mut w = [0u8; 8];
            w.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            words[3 - i] = u64::from_be_bytes(w);
        }
        Self { words }
    }

    /// Interprets the low 160 bits as an address.
    pub fn to_address(&self) -> Hash160 {
        let be = self.to_be_bytes();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&be[12..32]);
        Hash160 { bytes }
    }

    /// Zero-extends an address into the low 160 bits.
    pub fn from_address(addr: Hash160) -> Self {
        let mut be = [0u8; 32];
        be[12..32].copy_from_slice(&addr.bytes);
        Self::from_be_bytes(be)
    }
}

impl From<u64> for Uint256 {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl fmt::Debug for Uint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_be_bytes()))
    }
}

/// 160-bit address (20 raw bytes, no endianness).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash160 {
    pub bytes: [u8; 20],
}

impl Hash160 {
    pub const ZERO: Self = Self { bytes: [0; 20] };
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.bytes))
    }
}

/// 256-bit hash. Semantically big-endian 32 raw bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash256 {
    pub bytes: [u8; 32],
}

impl Hash256 {
    pub const ZERO: Self = Self { bytes: [0; 32] };

    /// Byte-swaps into a host-endian integer.
    pub fn to_uint256(&self) -> Uint256 {
        Uint256::from_be_bytes(self.bytes)
    }

    pub fn from_uint256(v: &Uint256) -> Self {
        Self { bytes: v.to_be_bytes() }
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be_round_trip_recovers_value() {
        let v = Uint256 {
            words: [0x0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210, 42, u64::MAX],
        };
        assert_eq!(Uint256::from_be_bytes(v.to_be_bytes()), v);
    }

    #[test]
    fn be_bytes_order() {
        // words[0] is the lowest word, so it lands at the *end* of the
        // big-endian byte representation.
        let v = Uint256::from_u64(1);
        let be = v.to_be_bytes();
        assert_eq!(be[31], 1);
        assert!(be[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn hash_round_trip() {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let h = Hash256 { bytes };
        assert_eq!(Hash256::from_uint256(&h.to_uint256()), h);
    }

    #[test]
    fn address_lives_in_low_160_bits() {
        let addr = Hash160 { bytes: [0xaa; 20] };
        let v = Uint256::from_address(addr);
        assert_eq!(v.to_address(), addr);
        let be = v.to_be_bytes();
        assert!(be[..12].iter().all(|&b| b == 0));
        assert!(be[12..].iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn wrapping_add_carries_across_words() {
        let a = Uint256 { words: [u64::MAX, 0, 0, 0] };
        let b = Uint256::from_u64(1);
        assert_eq!(a.wrapping_add(&b), Uint256 { words: [0, 1, 0, 0] });

        let max = Uint256 { words: [u64::MAX; 4] };
        assert_eq!(max.wrapping_add(&Uint256::from_u64(1)), Uint256::ZERO);
    }

    #[test]
    fn usize_conversion() {
        assert_eq!(Uint256::from_u64(64).to_usize(), Some(64));
        let big = Uint256 { words: [0, 1, 0, 0] };
        assert_eq!(big.to_usize(), None);
    }
}
