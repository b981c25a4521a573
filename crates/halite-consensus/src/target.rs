use core::fmt;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use thiserror::Error;

use crate::hash::Hash256;

/// Compact "bits" encoding of a target: one exponent byte followed by a
/// three-byte mantissa whose top bit is a sign bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CompactTarget(pub u32);

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    #[error("compact target {0:#010x} is negative")]
    Negative(u32),
    #[error("compact target {0:#010x} overflows 256 bits")]
    Overflow(u32),
}

/// A 256-bit unsigned target. Hashes at or below it satisfy proof of work.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Target(BigUint);

impl Target {
    pub fn from_biguint(v: BigUint) -> Self {
        Target(v)
    }

    pub fn from_u64(v: u64) -> Self {
        Target(BigUint::from(v))
    }

    /// Interprets a hash as a little-endian 256-bit integer.
    pub fn from_hash(h: &Hash256) -> Self {
        Target(BigUint::from_bytes_le(h))
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn into_biguint(self) -> BigUint {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn from_compact(bits: CompactTarget) -> Result<Self, CompactError> {
        let bits = bits.0;
        let size = bits >> 24;
        let word = bits & 0x007f_ffff;

        if word != 0 && bits & 0x0080_0000 != 0 {
            return Err(CompactError::Negative(bits));
        }
        if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
            return Err(CompactError::Overflow(bits));
        }

        let v = if size <= 3 {
            BigUint::from(word >> (8 * (3 - size)))
        } else {
            BigUint::from(word) << (8 * (size - 3) as usize)
        };
        Ok(Target(v))
    }

    /// Canonical compact form. Only the three most significant bytes survive;
    /// a mantissa whose top bit would be set is shifted down one byte so the
    /// value is never read back as negative.
    pub fn to_compact(&self) -> CompactTarget {
        let mut size = ((self.0.bits() + 7) / 8) as u32;
        let mut compact: u32 = if size <= 3 {
            let low = self.0.to_u64().unwrap_or(0) as u32;
            low << (8 * (3 - size))
        } else {
            let shifted: BigUint = &self.0 >> (8 * (size - 3) as usize);
            shifted.to_u32().unwrap_or(0)
        };

        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        CompactTarget(compact | (size << 24))
    }

    /// Hash of the header satisfies this target.
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        BigUint::from_bytes_le(hash) <= self.0
    }

    /// Expected number of hashes to meet this target: 2^256 / (target + 1).
    pub fn work(&self) -> BigUint {
        let numerator = BigUint::one() << 256usize;
        numerator / (&self.0 + BigUint::one())
    }

    /// `pow_limit / self` as a float, the conventional difficulty figure.
    pub fn difficulty(&self, pow_limit: &Target) -> f64 {
        if self.0.is_zero() {
            return f64::INFINITY;
        }
        let limit = pow_limit.0.to_f64().unwrap_or(f64::MAX);
        let own = self.0.to_f64().unwrap_or(f64::MAX);
        limit / own
    }
}

impl TryFrom<CompactTarget> for Target {
    type Error = CompactError;

    fn try_from(bits: CompactTarget) -> Result<Self, Self::Error> {
        Target::from_compact(bits)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bits: u32) -> Result<Target, CompactError> {
        Target::from_compact(CompactTarget(bits))
    }

    #[test]
    fn compact_vectors() {
        let t = decode(0x0100_3456).expect("decode");
        assert!(t.is_zero());
        assert_eq!(t.to_compact(), CompactTarget(0));

        let t = decode(0x0112_3456).expect("decode");
        assert_eq!(t, Target::from_u64(0x12));
        assert_eq!(t.to_compact(), CompactTarget(0x0112_0000));

        let t = decode(0x0200_8000).expect("decode");
        assert_eq!(t, Target::from_u64(0x80));
        assert_eq!(t.to_compact(), CompactTarget(0x0200_8000));

        let t = decode(0x0500_9234).expect("decode");
        assert_eq!(t, Target::from_u64(0x9234_0000));
        assert_eq!(t.to_compact(), CompactTarget(0x0500_9234));

        let t = decode(0x2012_3456).expect("decode");
        assert_eq!(t.to_compact(), CompactTarget(0x2012_3456));
    }

    #[test]
    fn negative_and_overflow_are_rejected() {
        assert_eq!(decode(0x0492_3456), Err(CompactError::Negative(0x0492_3456)));
        assert_eq!(decode(0xff12_3456), Err(CompactError::Overflow(0xff12_3456)));
        // Zero mantissa is neither.
        assert!(decode(0xff00_0000).expect("zero").is_zero());
    }

    #[test]
    fn truncates_to_three_significant_bytes() {
        let t = Target::from_u64(0x1234_5678);
        assert_eq!(t.to_compact(), CompactTarget(0x0412_3456));
    }

    #[test]
    fn work_of_regtest_limit() {
        let t = decode(0x207f_ffff).expect("decode");
        assert_eq!(t.work(), BigUint::from(2u32));
        assert!(t.is_met_by(&[0u8; 32]));
        assert!(!t.is_met_by(&[0xffu8; 32]));
    }

    #[test]
    fn difficulty_of_limit_is_one() {
        let limit = decode(0x1d00_ffff).expect("decode");
        assert!((limit.difficulty(&limit) - 1.0).abs() < f64::EPSILON);
        let harder = decode(0x1c00_ffff).expect("decode");
        assert!((harder.difficulty(&limit) - 256.0).abs() < 1e-9);
    }
}
