#![no_main]

use std::sync::Arc;

use halite_consensus::block::BlockHeader;
use halite_consensus::networks::main_params;
use halite_consensus::retarget::get_work_required;
use halite_consensus::{ChainedHeader, CompactTarget};
use libfuzzer_sys::fuzz_target;

// Each 8-byte chunk is one header: time[4] || bits[4]. Retargeting every
// four blocks keeps short inputs on the adjustment path.
fuzz_target!(|data: &[u8]| {
    let mut params = main_params();
    params.pow_target_timespan = 4 * params.pow_target_spacing;
    params.pow_allow_min_difficulty_blocks = data.first().is_some_and(|b| b & 1 == 1);

    let header = |time: u32, bits: u32, prev: [u8; 32]| BlockHeader {
        version: 4,
        prev_block_hash: prev,
        merkle_root: [0u8; 32],
        time,
        bits: CompactTarget(bits),
        nonce: 0,
    };

    let mut tip = ChainedHeader::genesis(header(0, params.pow_limit.to_compact().0, [0u8; 32]));
    for chunk in data.chunks_exact(8).take(64) {
        let time = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let bits = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
        let next = ChainedHeader::new(header(time, bits, tip.hash), Arc::clone(&tip));

        // Off a boundary the parent's (fuzzer-chosen) bits pass through
        // unchanged, so only a recomputed target is bound by the limit.
        let recomputed = next.height % params.difficulty_adjustment_interval() == 0
            && !params.pow_no_retargeting;
        let a = get_work_required(&next, &params);
        let b = get_work_required(&next, &params);
        match (&a, &b) {
            (Ok(x), Ok(y)) => {
                assert_eq!(x, y, "get_work_required non-deterministic");
                if recomputed {
                    assert!(*x <= params.pow_limit, "retargeted above pow limit");
                }
            }
            (Err(_), Err(_)) => {}
            _ => panic!("get_work_required non-deterministic error/ok mismatch"),
        }
        tip = next;
    }
});
