#![no_main]

use halite_consensus::{CompactTarget, Target};
use libfuzzer_sys::fuzz_target;
use num_bigint::BigUint;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // Any 32-bit compact either decodes or is rejected; a decoded value must
    // re-encode to something that decodes to the same value.
    let bits = CompactTarget(u32::from_le_bytes([data[0], data[1], data[2], data[3]]));
    if let Ok(t) = Target::from_compact(bits) {
        let again = Target::from_compact(t.to_compact()).expect("canonical compact decodes");
        assert_eq!(again, t, "compact round trip changed {bits:?}");
    }

    // Encoding an arbitrary value only truncates: never rounds up.
    let value = Target::from_biguint(BigUint::from_bytes_be(&data[4..data.len().min(36)]));
    let decoded = Target::from_compact(value.to_compact()).expect("encoded value decodes");
    assert!(decoded <= value);
});
