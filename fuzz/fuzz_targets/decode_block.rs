#![no_main]

use halite_consensus::Block;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must encode back to the exact input.
    if let Ok(block) = Block::from_bytes(data) {
        assert_eq!(block.to_bytes(), data, "block re-encoding differs");
        let _ = block.merkle_root();
        let _ = block.is_proof_of_stake();
    }
});
