mod common;

use std::sync::Arc;

use common::*;
use halite_consensus::script::Script;
use halite_consensus::{
    Block, ChainedHeader, CoinDatabase, CompactTarget, EngineError, ErrorCode, HashHeightPair,
    OutPoint, TxOut, ValidationError, COIN,
};

#[test]
fn three_block_chain_commits_and_rewinds() {
    let (engine, db, genesis) = regtest_engine();

    let (h1, b1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 1)])]);
    assert_eq!(b1.header.bits, CompactTarget(0x207f_ffff));
    engine.validate_block(&h1, &b1).expect("block 1");

    let (h2, b2) = mine(&h1, vec![coinbase(2, vec![pay(50 * COIN, 2)])]);
    engine.validate_block(&h2, &b2).expect("block 2");
    let after_two = db.all_coins().expect("coins");
    assert_eq!(after_two.len(), 2);

    // Block 1's coinbase is two blocks deep; regtest maturity is 100.
    let cb1 = OutPoint::new(b1.transactions[0].txid(), 0);
    let (bad_h3, bad_b3) = mine(
        &h2,
        vec![
            coinbase(3, vec![pay(50 * COIN, 3)]),
            spend(&[cb1], vec![pay(49 * COIN, 4)]),
        ],
    );
    let err = engine.validate_block(&bad_h3, &bad_b3).unwrap_err();
    assert_eq!(
        err.code(),
        Some(ErrorCode::BadTransactionPrematureCoinbaseSpending)
    );
    assert_eq!(engine.tip().expect("tip"), HashHeightPair::new(h2.hash, 2));
    assert_eq!(db.all_coins().expect("coins"), after_two);

    let (h3, b3) = mine(&h2, vec![coinbase(3, vec![pay(50 * COIN, 3)])]);
    engine.validate_block(&h3, &b3).expect("block 3");
    assert_eq!(engine.tip().expect("tip"), HashHeightPair::new(h3.hash, 3));
    let after_three = db.all_coins().expect("coins");
    assert_eq!(after_three.len(), 3);

    let tip = engine.rewind().expect("rewind");
    assert_eq!(tip, HashHeightPair::new(h2.hash, 2));
    assert_eq!(db.all_coins().expect("coins"), after_two);

    // Reconnecting the same block lands on the same state.
    engine.validate_block(&h3, &b3).expect("block 3 again");
    assert_eq!(db.all_coins().expect("coins"), after_three);
}

#[test]
fn rewind_to_genesis_then_fault() {
    let (engine, db, genesis) = regtest_engine();
    let (h1, b1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 1)])]);
    engine.validate_block(&h1, &b1).expect("block 1");

    let tip = engine.rewind().expect("rewind");
    assert_eq!(tip, HashHeightPair::new(genesis.hash, 0));
    assert!(db.all_coins().expect("coins").is_empty());

    let err = engine.rewind().unwrap_err();
    assert!(matches!(err, EngineError::MissingRewindData(0)));
}

#[test]
fn spends_pay_fees_and_rewind_restores_inputs() {
    let (engine, db, genesis) = engine_for(regtest_with(|p| p.coinbase_maturity = 1));

    let (h1, b1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 1)])]);
    engine.validate_block(&h1, &b1).expect("block 1");
    let after_one = db.all_coins().expect("coins");

    let cb1 = OutPoint::new(b1.transactions[0].txid(), 0);
    let spend_tx = spend(&[cb1], vec![pay(30 * COIN, 5), pay(19 * COIN, 6)]);

    // One coin of fees, claimed twice over.
    let (greedy_h2, greedy_b2) = mine(
        &h1,
        vec![coinbase(2, vec![pay(52 * COIN, 2)]), spend_tx.clone()],
    );
    let err = engine.validate_block(&greedy_h2, &greedy_b2).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadCoinbaseAmount));

    let (h2, b2) = mine(
        &h1,
        vec![coinbase(2, vec![pay(51 * COIN, 2)]), spend_tx.clone()],
    );
    engine.validate_block(&h2, &b2).expect("block 2");

    let coins = db.all_coins().expect("coins");
    assert!(coins.iter().all(|(op, _)| *op != cb1));
    assert_eq!(coins.len(), 3);
    let fetched = db.fetch_coins(&[cb1]).expect("fetch");
    assert_eq!(fetched.get(&cb1), Some(&None));

    engine.rewind().expect("rewind");
    assert_eq!(db.all_coins().expect("coins"), after_one);
}

#[test]
fn double_spend_inside_block_is_rejected() {
    let (engine, db, genesis) = engine_for(regtest_with(|p| p.coinbase_maturity = 1));
    let (h1, b1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 1)])]);
    engine.validate_block(&h1, &b1).expect("block 1");
    let before = db.all_coins().expect("coins");

    let cb1 = OutPoint::new(b1.transactions[0].txid(), 0);
    let (h2, b2) = mine(
        &h1,
        vec![
            coinbase(2, vec![pay(50 * COIN, 2)]),
            spend(&[cb1], vec![pay(10 * COIN, 7)]),
            spend(&[cb1], vec![pay(20 * COIN, 8)]),
        ],
    );
    let err = engine.validate_block(&h2, &b2).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadTransactionMissingInput));
    assert_eq!(db.all_coins().expect("coins"), before);
}

#[test]
fn commit_against_a_moved_tip_writes_nothing() {
    let (engine, db, genesis) = regtest_engine();
    let (h1, b1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 1)])]);
    engine.validate_block(&h1, &b1).expect("block 1");
    let before = db.all_coins().expect("coins");

    // A competing block 1 validated after the tip has already moved.
    let (rival, rival_block) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 9)])]);
    let err = engine.full_validation(&rival, &rival_block).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Engine(EngineError::TipMismatch { .. })
    ));
    assert_eq!(engine.tip().expect("tip"), HashHeightPair::new(h1.hash, 1));
    assert_eq!(db.all_coins().expect("coins"), before);
    assert!(db.get_rewind_data(2).expect("rewind").is_none());
}

#[test]
fn header_rules_reject_time_and_bits() {
    let (engine, _db, genesis) = regtest_engine();

    let (stale, _) = mine_at(&genesis, genesis.header.time, vec![coinbase(1, vec![])]);
    let err = engine.validate_header(&stale).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::TimeTooOld));

    let (future, _) = mine_at(&genesis, NOW + 3 * 60 * 60, vec![coinbase(1, vec![])]);
    let err = engine.validate_header(&future).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::TimeTooNew));

    let (_, mut block) = mine(&genesis, vec![coinbase(1, vec![pay(COIN, 1)])]);
    block.header.bits = CompactTarget(0x2000_ffff);
    let wrong_bits = ChainedHeader::new(block.header.clone(), Arc::clone(&genesis));
    let err = engine.validate_header(&wrong_bits).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadDiffBits));
}

#[test]
fn merkle_root_mismatch_fails_integrity() {
    let (engine, db, genesis) = regtest_engine();
    let (h1, mut b1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 1)])]);
    b1.transactions[0].outputs[0].value = 49 * COIN;

    let err = engine.validate_block(&h1, &b1).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadMerkleRoot));
    assert_eq!(engine.tip().expect("tip").height, 0);
    assert!(db.all_coins().expect("coins").is_empty());
}

#[test]
fn block_without_transactions_is_rejected() {
    let (engine, db, genesis) = regtest_engine();
    let block = Block::new(header_on(&genesis, genesis.header.time + 600, 0x207f_ffff), vec![]);
    let chained = ChainedHeader::new(block.header.clone(), Arc::clone(&genesis));

    let err = engine.full_validation(&chained, &block).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadCoinbaseMissing));
    assert_eq!(engine.tip().expect("tip"), HashHeightPair::new(genesis.hash, 0));
    assert!(db.all_coins().expect("coins").is_empty());
    assert!(db.get_rewind_data(1).expect("rewind").is_none());
}

#[test]
fn unspendable_outputs_never_reach_the_coin_view() {
    let (engine, db, genesis) = regtest_engine();
    let (h1, b1) = mine(
        &genesis,
        vec![coinbase(
            1,
            vec![pay(50 * COIN, 1), TxOut::new(0, Script::op_return(b"memo"))],
        )],
    );
    engine.partial_validation(&h1, &b1).expect("partial");
    engine.full_validation(&h1, &b1).expect("full");

    let txid = b1.transactions[0].txid();
    let paid = OutPoint::new(txid, 0);
    let memo = OutPoint::new(txid, 1);
    let coins = db.all_coins().expect("coins");
    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].0, paid);

    let fetched = db.fetch_coins(&[paid, memo]).expect("fetch");
    assert!(fetched[&paid].is_some());
    assert_eq!(fetched[&memo], None);

    let rd = db.get_rewind_data(1).expect("rewind").expect("record");
    assert_eq!(rd.outputs_to_remove, vec![paid]);
    assert!(rd.outputs_to_restore.is_empty());
}

// ---------------------------------------------------------------------------
// Reorganization
// ---------------------------------------------------------------------------

#[test]
fn reorganize_switches_to_longer_branch() {
    let (engine, db, genesis) = regtest_engine();

    let (a1, ab1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 0xa1)])]);
    let (a2, ab2) = mine(&a1, vec![coinbase(2, vec![pay(50 * COIN, 0xa2)])]);
    engine.validate_block(&a1, &ab1).expect("a1");
    engine.validate_block(&a2, &ab2).expect("a2");

    let (b1, bb1) = mine_at(
        &genesis,
        genesis.header.time + 300,
        vec![coinbase(1, vec![pay(50 * COIN, 0xb1)])],
    );
    let (b2, bb2) = mine(&b1, vec![coinbase(2, vec![pay(50 * COIN, 0xb2)])]);
    let (b3, bb3) = mine(&b2, vec![coinbase(3, vec![pay(50 * COIN, 0xb3)])]);

    let tip = engine
        .reorganize(&a2, &[(b1, &bb1), (b2, &bb2), (Arc::clone(&b3), &bb3)])
        .expect("reorganize");
    assert_eq!(tip, HashHeightPair::new(b3.hash, 3));

    let coins = db.all_coins().expect("coins");
    let expected: Vec<OutPoint> = {
        let mut v: Vec<OutPoint> = [&bb1, &bb2, &bb3]
            .iter()
            .map(|b| OutPoint::new(b.transactions[0].txid(), 0))
            .collect();
        v.sort();
        v
    };
    let got: Vec<OutPoint> = coins.iter().map(|(op, _)| *op).collect();
    assert_eq!(got, expected);
}

#[test]
fn reorganize_stops_at_rejected_block() {
    let (engine, _db, genesis) = regtest_engine();
    let (a1, ab1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 0xa1)])]);
    engine.validate_block(&a1, &ab1).expect("a1");

    let (b1, bb1) = mine_at(
        &genesis,
        genesis.header.time + 300,
        vec![coinbase(1, vec![pay(50 * COIN, 0xb1)])],
    );
    let (b2, bb2) = mine(&b1, vec![coinbase(2, vec![pay(51 * COIN, 0xb2)])]);

    let err = engine
        .reorganize(&a1, &[(Arc::clone(&b1), &bb1), (b2, &bb2)])
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadCoinbaseAmount));
    assert_eq!(engine.tip().expect("tip"), HashHeightPair::new(b1.hash, 1));
}

#[test]
fn reorganize_respects_max_length() {
    let (engine, _db, genesis) = engine_for(regtest_with(|p| p.max_reorg_length = 1));
    let (a1, ab1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 0xa1)])]);
    let (a2, ab2) = mine(&a1, vec![coinbase(2, vec![pay(50 * COIN, 0xa2)])]);
    engine.validate_block(&a1, &ab1).expect("a1");
    engine.validate_block(&a2, &ab2).expect("a2");

    let (b1, bb1) = mine_at(
        &genesis,
        genesis.header.time + 300,
        vec![coinbase(1, vec![pay(50 * COIN, 0xb1)])],
    );
    let err = engine.reorganize(&a2, &[(b1, &bb1)]).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::MaxReorgViolation));
    assert_eq!(engine.tip().expect("tip"), HashHeightPair::new(a2.hash, 2));
}

#[test]
fn reorganize_needs_a_fork_on_the_old_chain() {
    let (engine, _db, genesis) = regtest_engine();
    let (a1, ab1) = mine(&genesis, vec![coinbase(1, vec![pay(50 * COIN, 0xa1)])]);
    engine.validate_block(&a1, &ab1).expect("a1");

    let (b1, _) = mine_at(
        &genesis,
        genesis.header.time + 300,
        vec![coinbase(1, vec![pay(50 * COIN, 0xb1)])],
    );
    let (b2, bb2) = mine(&b1, vec![coinbase(2, vec![pay(50 * COIN, 0xb2)])]);
    let err = engine.reorganize(&a1, &[(b2, &bb2)]).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Engine(EngineError::ForkPointNotFound(_))
    ));
}
