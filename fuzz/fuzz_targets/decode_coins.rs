#![no_main]

use halite_consensus::stake::BlockStake;
use halite_consensus::{Coins, HashHeightPair, RewindData};
use libfuzzer_sys::fuzz_target;

// Stored values are read back from disk; corrupt bytes must surface as
// errors, and anything accepted must be canonical.
fuzz_target!(|data: &[u8]| {
    if let Ok(c) = Coins::from_bytes(data) {
        assert_eq!(c.to_bytes(), data);
    }
    if let Ok(rd) = RewindData::from_bytes(data) {
        assert_eq!(rd.to_bytes(), data);
    }
    if let Ok(s) = BlockStake::from_bytes(data) {
        assert_eq!(s.to_bytes(), data);
    }
    if let Ok(t) = HashHeightPair::from_bytes(data) {
        assert_eq!(t.to_bytes().as_slice(), data);
    }
});
