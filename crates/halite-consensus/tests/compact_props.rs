use halite_consensus::{CompactTarget, Target};
use num_bigint::BigUint;
use proptest::prelude::*;

/// `v` with everything below its leading mantissa bytes zeroed: three bytes,
/// or two when the leading byte has its top bit set.
fn truncated(v: &BigUint) -> BigUint {
    let be = v.to_bytes_be();
    let keep = if be[0] & 0x80 != 0 { 2 } else { 3 };
    if be.len() <= keep {
        return v.clone();
    }
    let drop = 8 * (be.len() - keep);
    (v >> drop) << drop
}

proptest! {
    /// Encoding keeps exactly the leading mantissa bytes, and decoding the
    /// canonical form reproduces them.
    #[test]
    fn compact_round_trip_is_canonical(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let raw = BigUint::from_bytes_be(&bytes);
        let value = Target::from_biguint(raw.clone());
        let compact = value.to_compact();
        let decoded = Target::from_compact(compact).expect("canonical compact decodes");
        prop_assert_eq!(decoded.value(), &truncated(&raw));
        prop_assert_eq!(decoded.to_compact(), compact);
    }

    #[test]
    fn decoded_compact_reencodes_identically(
        exp in 3u32..=32,
        mantissa in 0x0000_8000u32..0x0080_0000,
    ) {
        let bits = CompactTarget((exp << 24) | mantissa);
        let target = Target::from_compact(bits).expect("positive, in range");
        prop_assert_eq!(target.to_compact(), bits);
    }
}
