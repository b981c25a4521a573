mod common;

use std::sync::Arc;

use common::*;
use halite_consensus::script::Script;
use halite_consensus::stake::sign_block;
use halite_consensus::{
    Block, ChainedHeader, CoinDatabase, ConsensusEngine, ErrorCode, Network, OutPoint,
    StakeChain, Transaction, TxIn, TxOut, COIN,
};
use k256::ecdsa::SigningKey;

struct StakeFixture {
    engine: ConsensusEngine,
    tip: Arc<ChainedHeader>,
    staked: OutPoint,
    staked_value: i64,
    key: SigningKey,
}

fn aligned_time(prev: &ChainedHeader) -> u32 {
    (prev.header.time & !0x0f) + 64
}

/// Stake regtest with eleven proof-of-work blocks on top of genesis. Block
/// 1's coinbase is deep enough to stake from height 12.
fn fixture() -> StakeFixture {
    let (engine, _db, genesis) = engine_for(Network::stake_regtest());
    let key = SigningKey::from_slice(&[7u8; 32]).expect("key");

    let mut tip = genesis;
    let mut staked = None;
    for height in 1..=11u32 {
        let (h, b) = mine_at(
            &tip,
            aligned_time(&tip),
            vec![coinbase(height, vec![pay(4 * COIN, height as u8)])],
        );
        engine
            .validate_block(&h, &b)
            .unwrap_or_else(|e| panic!("pow block {height}: {e}"));
        if height == 1 {
            staked = Some(OutPoint::new(b.transactions[0].txid(), 0));
        }
        tip = h;
    }
    StakeFixture {
        engine,
        tip,
        staked: staked.expect("block 1"),
        staked_value: 4 * COIN,
        key,
    }
}

fn pos_block(f: &StakeFixture, reward: i64) -> (Arc<ChainedHeader>, Block) {
    let pubkey = f.key.verifying_key().to_sec1_bytes();
    let coinstake = Transaction::new(
        1,
        vec![TxIn::new(f.staked, Script::empty())],
        vec![
            TxOut::new(0, Script::empty()),
            TxOut::new(f.staked_value + reward, Script::p2pk(&pubkey)),
        ],
        0,
    );
    let height = f.tip.height + 1;
    let mut block = Block::new(
        header_on(&f.tip, aligned_time(&f.tip), 0x207f_ffff),
        vec![
            coinbase(height, vec![TxOut::new(0, Script::empty())]),
            coinstake,
        ],
    );
    block.update_merkle_root();
    sign_block(&mut block, &f.key).expect("sign");
    let chained = ChainedHeader::new(block.header.clone(), Arc::clone(&f.tip));
    (chained, block)
}

#[test]
fn proof_of_stake_block_connects() {
    let f = fixture();
    let (h, b) = pos_block(&f, COIN);
    assert!(b.is_proof_of_stake());
    f.engine.validate_block(&h, &b).expect("pos block");

    let stake_chain = f.engine.stake_chain().expect("stake network");
    let stake = stake_chain.get(&h.hash).expect("get").expect("stake");
    assert!(stake.is_proof_of_stake());
    assert_eq!(stake.prevout_stake, Some(f.staked));
    assert_ne!(stake.hash_proof, h.hash);

    let coins = f.engine.coin_db().fetch_coins(&[f.staked]).expect("fetch");
    assert_eq!(coins.get(&f.staked), Some(&None));

    f.engine.flush().expect("flush");
    assert_eq!(stake_chain.dirty_count(), 0);
    assert_eq!(
        f.engine.coin_db().get_stake(&h.hash).expect("db"),
        Some(stake)
    );
}

#[test]
fn coinstake_cannot_overpay() {
    let f = fixture();
    let (h, b) = pos_block(&f, 2 * COIN);
    let err = f.engine.validate_block(&h, &b).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadCoinstakeAmount));
    assert_eq!(f.engine.tip().expect("tip").hash, f.tip.hash);
}

#[test]
fn tampered_signature_fails_integrity() {
    let f = fixture();
    let (h, mut b) = pos_block(&f, COIN);
    let last = b.signature.len() - 1;
    b.signature[last] ^= 0x01;
    let err = f.engine.partial_validation(&h, &b).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadBlockSignature));
}

#[test]
fn unmasked_timestamp_is_rejected() {
    let f = fixture();
    let (_, mut b) = pos_block(&f, COIN);
    b.header.time += 1;
    sign_block(&mut b, &f.key).expect("sign");
    let h = ChainedHeader::new(b.header.clone(), Arc::clone(&f.tip));
    let err = f.engine.partial_validation(&h, &b).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::StakeTimeViolation));
}

#[test]
fn spendable_coinbase_output_in_stake_block() {
    let f = fixture();
    let (_, mut b) = pos_block(&f, COIN);
    b.transactions[0].outputs.push(pay(COIN, 0x77));
    b.update_merkle_root();
    sign_block(&mut b, &f.key).expect("sign");
    let h = ChainedHeader::new(b.header.clone(), Arc::clone(&f.tip));
    let err = f.engine.partial_validation(&h, &b).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadStakeBlock));
}

#[test]
fn stake_must_be_deep_enough() {
    let (engine, _db, genesis) = engine_for(Network::stake_regtest());
    let key = SigningKey::from_slice(&[7u8; 32]).expect("key");
    let (h1, b1) = mine_at(
        &genesis,
        aligned_time(&genesis),
        vec![coinbase(1, vec![pay(4 * COIN, 1)])],
    );
    engine.validate_block(&h1, &b1).expect("block 1");

    let f = StakeFixture {
        engine,
        tip: h1,
        staked: OutPoint::new(b1.transactions[0].txid(), 0),
        staked_value: 4 * COIN,
        key,
    };
    let (h, b) = pos_block(&f, COIN);
    let err = f.engine.validate_block(&h, &b).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidStakeDepth));
}
