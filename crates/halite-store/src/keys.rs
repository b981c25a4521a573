//! Key and value layouts shared by the on-disk backends.
//!
//! Keys sort the way the in-memory tables do: outpoints as
//! `txid[32] || n_be[4]`, rewind heights big-endian. Values reuse the
//! consensus codecs; a value that fails to decode is corruption, not a
//! consensus rejection.

use halite_consensus::{Coins, EngineError, HashHeightPair, OutPoint, RewindData};
use halite_consensus::stake::BlockStake;

/// Single row key of the tip table.
pub const TIP_KEY: &[u8] = b"tip";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub fn coins_key(outpoint: &OutPoint) -> [u8; 36] {
    outpoint.key_bytes()
}

pub fn decode_coins_key(data: &[u8]) -> Result<OutPoint, EngineError> {
    OutPoint::from_key_bytes(data).ok_or_else(|| {
        EngineError::Corruption(format!("coins key: expected 36 bytes, got {}", data.len()))
    })
}

pub fn rewind_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

pub fn decode_tip(data: &[u8]) -> Result<HashHeightPair, EngineError> {
    HashHeightPair::from_bytes(data).map_err(|e| EngineError::Corruption(format!("tip: {e}")))
}

pub fn decode_coins(data: &[u8]) -> Result<Coins, EngineError> {
    Coins::from_bytes(data).map_err(|e| EngineError::Corruption(format!("coins: {e}")))
}

pub fn decode_rewind(data: &[u8]) -> Result<RewindData, EngineError> {
    RewindData::from_bytes(data).map_err(|e| EngineError::Corruption(format!("rewind: {e}")))
}

pub fn decode_stake(data: &[u8]) -> Result<BlockStake, EngineError> {
    BlockStake::from_bytes(data).map_err(|e| EngineError::Corruption(format!("stake: {e}")))
}

/// Previous tip of a rewind record; a record without one cannot be undone.
pub fn rewind_target(height: u32, rd: &RewindData) -> Result<HashHeightPair, EngineError> {
    rd.previous_tip.ok_or_else(|| {
        EngineError::Corruption(format!("rewind record {height} has no previous tip"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewind_keys_sort_by_height() {
        assert!(rewind_key(255) < rewind_key(256));
        assert!(rewind_key(1) < rewind_key(70_000));
    }

    #[test]
    fn short_coins_key_is_corruption() {
        let err = decode_coins_key(&[0u8; 35]).unwrap_err();
        assert!(matches!(err, EngineError::Corruption(_)));
        let op = OutPoint::new([9u8; 32], 2);
        assert_eq!(decode_coins_key(&coins_key(&op)).expect("decode"), op);
    }

    #[test]
    fn garbage_values_are_corruption() {
        assert!(matches!(decode_tip(&[1, 2, 3]), Err(EngineError::Corruption(_))));
        assert!(matches!(decode_coins(&[]), Err(EngineError::Corruption(_))));
        assert!(matches!(decode_rewind(&[7]), Err(EngineError::Corruption(_))));
        assert!(matches!(decode_stake(&[0u8; 4]), Err(EngineError::Corruption(_))));
    }

    #[test]
    fn rewind_without_previous_tip_cannot_be_undone() {
        let rd = RewindData::default();
        let err = rewind_target(4, &rd).unwrap_err();
        assert!(err.to_string().contains("rewind record 4"));
    }
}
