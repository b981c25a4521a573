#![no_main]

use halite_consensus::merkle::block_merkle_root;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Interpret raw bytes as consecutive 32-byte txids.
    let txids: Vec<[u8; 32]> = data
        .chunks_exact(32)
        .map(|c| {
            let mut id = [0u8; 32];
            id.copy_from_slice(c);
            id
        })
        .collect();

    let a = block_merkle_root(&txids);
    let b = block_merkle_root(&txids);
    assert_eq!(a, b, "block_merkle_root non-deterministic");

    // Duplicating the last id of an odd list gives the same root but must be
    // flagged as mutated.
    if txids.len() % 2 == 1 && txids.len() > 1 {
        let mut padded = txids.clone();
        padded.push(*txids.last().expect("non-empty"));
        let c = block_merkle_root(&padded);
        assert_eq!(c.root, a.root);
        assert!(c.mutated);
    }
});
