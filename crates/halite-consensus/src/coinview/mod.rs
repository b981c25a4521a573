//! Persistent coin database contract.
//!
//! Every backend stores four logical tables: the tip (`tip_hash`), unspent
//! coins keyed by outpoint (`coins`), per-height undo records (`rewind`) and
//! per-block stake data (`stake`). Byte layouts are backend-private; only the
//! behavior below is shared.

mod memory;

use std::collections::BTreeMap;

pub use memory::MemoryCoinDatabase;

use crate::coins::{Coins, HashHeightPair, RewindData, UnspentOutput};
use crate::error::EngineError;
use crate::hash::Hash256;
use crate::stake::BlockStake;
use crate::tx::OutPoint;

pub const TABLE_TIP_HASH: &str = "tip_hash";
pub const TABLE_COINS: &str = "coins";
pub const TABLE_REWIND: &str = "rewind";
pub const TABLE_STAKE: &str = "stake";

pub trait CoinDatabase: Send + Sync {
    /// Records the genesis block as the tip if the database is empty. A
    /// database that already has a tip is left unchanged.
    fn initialize(&self, genesis: &Hash256) -> Result<(), EngineError>;

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, EngineError>;

    /// One entry per queried outpoint; spent or unknown outpoints map to `None`.
    fn fetch_coins(
        &self,
        outpoints: &[OutPoint],
    ) -> Result<BTreeMap<OutPoint, Option<Coins>>, EngineError>;

    /// Applies a block's change list atomically. Fails without writing when the
    /// stored tip is not `old_tip`. Deletes are applied before inserts, each in
    /// outpoint order, and `rewind` is stored under `old_tip.height + 1`.
    fn save_changes(
        &self,
        outputs: &[UnspentOutput],
        old_tip: &HashHeightPair,
        new_tip: &HashHeightPair,
        rewind: &RewindData,
    ) -> Result<(), EngineError>;

    /// Undoes the block at the tip and returns the new tip.
    fn rewind(&self) -> Result<HashHeightPair, EngineError>;

    fn get_rewind_data(&self, height: u32) -> Result<Option<RewindData>, EngineError>;

    fn put_stake(&self, items: &[(Hash256, BlockStake)]) -> Result<(), EngineError>;

    fn get_stake(&self, hash: &Hash256) -> Result<Option<BlockStake>, EngineError>;

    /// Every stored coin in outpoint order.
    fn all_coins(&self) -> Result<Vec<(OutPoint, Coins)>, EngineError>;
}

/// Splits a change list into sorted deletes and inserts. Prunable coins
/// never reach storage, so they are dropped here as well.
pub fn partition_changes(outputs: &[UnspentOutput]) -> (Vec<OutPoint>, Vec<(OutPoint, &Coins)>) {
    let mut deletes = Vec::new();
    let mut inserts = Vec::new();
    for o in outputs {
        match &o.coins {
            None => deletes.push(o.outpoint),
            Some(c) if c.is_prunable() => deletes.push(o.outpoint),
            Some(c) => inserts.push((o.outpoint, c)),
        }
    }
    deletes.sort_unstable();
    inserts.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    (deletes, inserts)
}

pub fn check_tip(
    stored: Option<&HashHeightPair>,
    expected: &HashHeightPair,
) -> Result<(), EngineError> {
    match stored {
        Some(t) if t == expected => Ok(()),
        Some(t) => Err(EngineError::tip_mismatch(&expected.hash, Some(&t.hash))),
        None => Err(EngineError::tip_mismatch(&expected.hash, None)),
    }
}

/// Shared behavioral checks for `CoinDatabase` implementations. Backends
/// instantiate them with a constructor for an empty database.
#[macro_export]
macro_rules! coin_db_contract_tests {
    ($make:expr) => {
        use $crate::coins::{Coins, HashHeightPair, RewindData, UnspentOutput};
        use $crate::coinview::CoinDatabase;
        use $crate::error::EngineError;
        use $crate::script::Script;
        use $crate::stake::{BlockStake, BlockStakeFlags};
        use $crate::tx::{OutPoint, TxOut};

        fn contract_coins(value: i64) -> Coins {
            Coins {
                height: 1,
                tx_out: TxOut::new(value, Script::p2pkh([7u8; 20])),
                is_coinbase: false,
                is_coinstake: false,
                time: None,
            }
        }

        fn contract_genesis() -> [u8; 32] {
            [0x11u8; 32]
        }

        #[test]
        fn contract_initialize_sets_genesis_tip() {
            let db = $make;
            assert_eq!(db.get_tip_hash().expect("tip"), None);
            db.initialize(&contract_genesis()).expect("init");
            let tip = db.get_tip_hash().expect("tip").expect("some");
            assert_eq!(tip, HashHeightPair::new(contract_genesis(), 0));
            // Second initialize is a no-op.
            db.initialize(&[0x22u8; 32]).expect("init again");
            assert_eq!(db.get_tip_hash().expect("tip"), Some(tip));
            assert!(db.all_coins().expect("all").is_empty());
        }

        #[test]
        fn contract_fetch_reports_every_outpoint() {
            let db = $make;
            db.initialize(&contract_genesis()).expect("init");
            let a = OutPoint::new([1u8; 32], 0);
            let b = OutPoint::new([2u8; 32], 3);
            let g = HashHeightPair::new(contract_genesis(), 0);
            let t1 = HashHeightPair::new([0x31u8; 32], 1);
            db.save_changes(
                &[UnspentOutput::new(a, Some(contract_coins(10)))],
                &g,
                &t1,
                &RewindData {
                    previous_tip: Some(g),
                    outputs_to_remove: vec![a],
                    outputs_to_restore: vec![],
                },
            )
            .expect("save");
            let got = db.fetch_coins(&[a, b]).expect("fetch");
            assert_eq!(got.len(), 2);
            assert_eq!(got[&a], Some(contract_coins(10)));
            assert_eq!(got[&b], None);
        }

        #[test]
        fn contract_tip_mismatch_writes_nothing() {
            let db = $make;
            db.initialize(&contract_genesis()).expect("init");
            let a = OutPoint::new([1u8; 32], 0);
            let wrong = HashHeightPair::new([0x99u8; 32], 0);
            let t1 = HashHeightPair::new([0x31u8; 32], 1);
            let err = db
                .save_changes(
                    &[UnspentOutput::new(a, Some(contract_coins(10)))],
                    &wrong,
                    &t1,
                    &RewindData::new(wrong),
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::TipMismatch { .. }));
            assert!(db.all_coins().expect("all").is_empty());
            assert_eq!(db.get_rewind_data(1).expect("rewind"), None);
            assert_eq!(
                db.get_tip_hash().expect("tip"),
                Some(HashHeightPair::new(contract_genesis(), 0))
            );
        }

        #[test]
        fn contract_rewind_restores_previous_state() {
            let db = $make;
            db.initialize(&contract_genesis()).expect("init");
            let g = HashHeightPair::new(contract_genesis(), 0);
            let t1 = HashHeightPair::new([0x31u8; 32], 1);
            let t2 = HashHeightPair::new([0x32u8; 32], 2);
            let a = OutPoint::new([1u8; 32], 0);
            let b = OutPoint::new([2u8; 32], 0);

            db.save_changes(
                &[UnspentOutput::new(a, Some(contract_coins(10)))],
                &g,
                &t1,
                &RewindData {
                    previous_tip: Some(g),
                    outputs_to_remove: vec![a],
                    outputs_to_restore: vec![],
                },
            )
            .expect("block 1");
            let after_one = db.all_coins().expect("all");

            // Block 2 spends `a` and creates `b`.
            db.save_changes(
                &[
                    UnspentOutput::spent(a),
                    UnspentOutput::new(b, Some(contract_coins(9))),
                ],
                &t1,
                &t2,
                &RewindData {
                    previous_tip: Some(t1),
                    outputs_to_remove: vec![b],
                    outputs_to_restore: vec![(a, contract_coins(10))],
                },
            )
            .expect("block 2");
            assert_eq!(db.all_coins().expect("all"), vec![(b, contract_coins(9))]);
            assert!(db.get_rewind_data(2).expect("rd").is_some());

            assert_eq!(db.rewind().expect("rewind"), t1);
            assert_eq!(db.get_tip_hash().expect("tip"), Some(t1));
            assert_eq!(db.all_coins().expect("all"), after_one);
            assert_eq!(db.get_rewind_data(2).expect("rd"), None);

            assert_eq!(db.rewind().expect("rewind"), g);
            assert!(db.all_coins().expect("all").is_empty());

            // Nothing left to undo at genesis.
            let err = db.rewind().unwrap_err();
            assert!(matches!(err, EngineError::MissingRewindData(0)));
        }

        #[test]
        fn contract_prunable_outputs_never_persist() {
            let db = $make;
            db.initialize(&contract_genesis()).expect("init");
            let g = HashHeightPair::new(contract_genesis(), 0);
            let t1 = HashHeightPair::new([0x31u8; 32], 1);
            let op = OutPoint::new([5u8; 32], 0);
            let mut c = contract_coins(0);
            c.tx_out.script_pubkey = Script::op_return(b"data");
            db.save_changes(&[UnspentOutput::new(op, Some(c))], &g, &t1, &RewindData::new(g))
                .expect("save");
            assert_eq!(db.fetch_coins(&[op]).expect("fetch")[&op], None);
        }

        #[test]
        fn contract_stake_roundtrip() {
            let db = $make;
            let hash = [0x44u8; 32];
            let stake = BlockStake {
                flags: BlockStakeFlags::PROOF_OF_STAKE,
                stake_modifier_v2: [1u8; 32],
                stake_time: 77,
                hash_proof: [2u8; 32],
                prevout_stake: Some(OutPoint::new([3u8; 32], 1)),
            };
            assert_eq!(db.get_stake(&hash).expect("get"), None);
            db.put_stake(&[(hash, stake.clone())]).expect("put");
            assert_eq!(db.get_stake(&hash).expect("get"), Some(stake));
        }
    };
}
