//! Protocol identifier types.

use std::{fmt, str::FromStr};

#[cfg(feature = "codec")]
use bincode::{Decode, Encode};
use rand::{thread_rng, Rng};
use thiserror::Error;

/// A 160-bit identifier that implements a non-euclidian XOR-based distance metric.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "codec", derive(Encode, Decode))]
pub struct Id {
    bytes: [u8; Self::BYTES],
}

impl Id {
    /// The size of the identifier in bytes.
    pub const BYTES: usize = 20;

    /// The size of the identifier in bits.
    pub const BITS: usize = 20 * 8;

    /// The all-zero identifier.
    pub const ZERO: Id = Id {
        bytes: [0u8; Self::BYTES],
    };

    /// Creates a new identifier from the supplied bytes.
    pub fn new(bytes: [u8; Self::BYTES]) -> Self {
        Id { bytes }
    }

    /// Creates an identifier from a slice, returns `None` if it isn't exactly [`Id::BYTES`] long.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; Self::BYTES] = slice.try_into().ok()?;

        Some(Id { bytes })
    }

    /// Returns the bytes backing the identifier.
    pub fn bytes(&self) -> [u8; Self::BYTES] {
        self.bytes
    }

    /// Returns a reference to the bytes backing the identifier.
    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.bytes
    }

    #[cfg(test)]
    /// Convenience function for working with small identifiers during testing, the value is
    /// written big-endian into the leading bytes.
    pub fn from_u16(raw: u16) -> Self {
        let mut bytes = [0u8; Self::BYTES];
        bytes[..2].copy_from_slice(&raw.to_be_bytes());

        Self { bytes }
    }

    /// Generates a random identifier.
    pub fn rand() -> Self {
        let mut rng = thread_rng();
        let mut bytes = [0u8; Self::BYTES];
        rng.fill(&mut bytes[..]);

        Self { bytes }
    }

    /// Generates a random identifier sharing at least `bits` leading bits with `prefix`.
    pub fn rand_with_prefix(prefix: &Id, bits: usize) -> Self {
        Self::rand_with_prefix_from(&mut thread_rng(), prefix, bits)
    }

    /// Same as [`Id::rand_with_prefix`] but draws from the supplied generator.
    pub fn rand_with_prefix_from<R: Rng + ?Sized>(rng: &mut R, prefix: &Id, bits: usize) -> Self {
        let mut bytes = [0u8; Self::BYTES];
        rng.fill(&mut bytes[..]);

        let mut id = Self { bytes };
        id.overwrite_prefix(prefix, bits);

        id
    }

    /// Returns the bitwise complement, the farthest possible identifier from this one.
    pub fn invert(&self) -> Self {
        let mut bytes = self.bytes;
        bytes.iter_mut().for_each(|byte| *byte = !*byte);

        Self { bytes }
    }

    /// Returns the value of the bit at `index`, counting from the most-significant bit.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Id::BITS`].
    pub fn bit(&self, index: usize) -> bool {
        assert!(index < Self::BITS, "bit index {index} out of range");
        self.bytes[index >> 3] & (0x80 >> (index & 7)) != 0
    }

    /// Returns a copy of the identifier with the bit at `index` flipped.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Id::BITS`].
    pub fn with_flipped_bit(&self, index: usize) -> Self {
        assert!(index < Self::BITS, "bit index {index} out of range");
        let mut bytes = self.bytes;
        bytes[index >> 3] ^= 0x80 >> (index & 7);

        Self { bytes }
    }

    /// Computes the XOR-based distance between two identifiers.
    pub fn distance(&self, other: &Id) -> Distance {
        let mut bytes = [0u8; Self::BYTES];
        for (byte, (a, b)) in bytes
            .iter_mut()
            .zip(self.bytes.iter().zip(other.bytes.iter()))
        {
            *byte = a ^ b;
        }

        Distance { bytes }
    }

    /// Returns the number of leading bits both identifiers have in common, in `0..=Id::BITS`.
    pub fn shared_prefix(&self, other: &Id) -> usize {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(&a, &b)| a ^ b)
            .enumerate()
            // The first differing byte holds the first differing bit.
            .find(|(_, byte)| byte != &0b0)
            // The left shift multiplies the index by 8 to get its value in bits.
            .map(|(i, byte)| (i << 3) + byte.leading_zeros() as usize)
            .unwrap_or(Self::BITS)
    }

    /// Copies the leading `bits` bits of `src` into this identifier, the trailing bits are left
    /// untouched.
    pub fn overwrite_prefix(&mut self, src: &Id, bits: usize) {
        debug_assert!(bits <= Self::BITS);
        let bits = bits.min(Self::BITS);

        let whole = bits >> 3;
        self.bytes[..whole].copy_from_slice(&src.bytes[..whole]);

        let rem = bits & 7;
        if rem != 0 {
            let mask = 0xffu8 << (8 - rem);
            self.bytes[whole] = (src.bytes[whole] & mask) | (self.bytes[whole] & !mask);
        }
    }
}

impl From<[u8; Id::BYTES]> for Id {
    fn from(bytes: [u8; Id::BYTES]) -> Self {
        Id::new(bytes)
    }
}

impl AsRef<[u8]> for Id {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::LowerHex for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.bytes))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self:x})")
    }
}

/// The reasons parsing an [`Id`] from a hex string can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseIdError {
    /// The string doesn't contain exactly `2 * Id::BYTES` characters.
    #[error("expected {expected} hex characters, got {0}", expected = Id::BYTES * 2)]
    InvalidLength(usize),
    /// The string contains a character that isn't a hex digit.
    #[error("invalid hex digit")]
    InvalidDigit,
}

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::BYTES * 2 {
            return Err(ParseIdError::InvalidLength(s.len()));
        }

        let mut bytes = [0u8; Self::BYTES];
        // The length is checked above, only bad digits are left.
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseIdError::InvalidDigit)?;

        Ok(Id { bytes })
    }
}

/// The XOR of two identifiers, ordered as an unsigned big-endian integer (smaller is closer).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Distance {
    // Lexicographic ordering over the array is the big-endian numeric ordering.
    bytes: [u8; Id::BYTES],
}

impl Distance {
    /// The distance between an identifier and itself.
    pub const ZERO: Distance = Distance {
        bytes: [0u8; Id::BYTES],
    };

    /// The largest possible distance.
    pub const MAX: Distance = Distance {
        bytes: [0xff; Id::BYTES],
    };

    /// Returns the bytes backing the distance.
    pub fn bytes(&self) -> [u8; Id::BYTES] {
        self.bytes
    }

    /// Returns `true` if the distance is zero, i.e. both identifiers were equal.
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Returns the number of leading zero bits, this equals the shared prefix length of the
    /// identifiers the distance was computed from.
    pub fn leading_zeros(&self) -> usize {
        self.bytes
            .iter()
            .position(|&byte| byte != 0)
            .map(|i| (i << 3) + self.bytes[i].leading_zeros() as usize)
            .unwrap_or(Id::BITS)
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance(")?;
        for byte in &self.bytes {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
