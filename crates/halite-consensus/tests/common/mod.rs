#![allow(dead_code)]

use std::sync::Arc;

use halite_consensus::networks::{pow_rules, regtest_params};
use halite_consensus::script::{push_data, script_num_push, Script};
use halite_consensus::{
    Block, BlockHeader, ChainedHeader, CompactTarget, ConsensusEngine, ConsensusParams,
    MemoryCoinDatabase, Network, OutPoint, Target, Transaction, TxIn, TxOut,
};

/// Fixed engine clock, well past every built-in genesis time.
pub const NOW: u32 = 2_000_000_000;

pub fn coinbase(height: u32, outputs: Vec<TxOut>) -> Transaction {
    let mut sig = script_num_push(height as i64);
    push_data(&mut sig, b"halite");
    Transaction::new(1, vec![TxIn::new(OutPoint::NULL, Script(sig))], outputs, 0)
}

pub fn pay(value: i64, tag: u8) -> TxOut {
    TxOut::new(value, Script::p2pkh([tag; 20]))
}

pub fn spend(prevouts: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    Transaction::new(
        1,
        prevouts
            .iter()
            .map(|p| TxIn::new(*p, Script(vec![0x51])))
            .collect(),
        outputs,
        0,
    )
}

pub fn header_on(prev: &ChainedHeader, time: u32, bits: u32) -> BlockHeader {
    BlockHeader {
        version: 4,
        prev_block_hash: prev.hash,
        merkle_root: [0u8; 32],
        time,
        bits: CompactTarget(bits),
        nonce: 0,
    }
}

/// Builds a block on `prev` and grinds the nonce until it meets its bits.
pub fn mine_at(
    prev: &Arc<ChainedHeader>,
    time: u32,
    txs: Vec<Transaction>,
) -> (Arc<ChainedHeader>, Block) {
    let mut block = Block::new(header_on(prev, time, 0x207f_ffff), txs);
    block.update_merkle_root();
    let target = Target::from_compact(block.header.bits).expect("bits");
    while !target.is_met_by(&block.hash()) {
        block.header.nonce += 1;
    }
    let chained = ChainedHeader::new(block.header.clone(), Arc::clone(prev));
    (chained, block)
}

pub fn mine(prev: &Arc<ChainedHeader>, txs: Vec<Transaction>) -> (Arc<ChainedHeader>, Block) {
    mine_at(prev, prev.header.time + 600, txs)
}

pub fn engine_for(
    network: Arc<Network>,
) -> (ConsensusEngine, Arc<MemoryCoinDatabase>, Arc<ChainedHeader>) {
    let db = Arc::new(MemoryCoinDatabase::new());
    let engine = ConsensusEngine::new(Arc::clone(&network), db.clone()).with_clock(|| NOW);
    engine.initialize().expect("initialize");
    let genesis = ChainedHeader::genesis(network.genesis.header.clone());
    (engine, db, genesis)
}

pub fn regtest_engine() -> (ConsensusEngine, Arc<MemoryCoinDatabase>, Arc<ChainedHeader>) {
    engine_for(Network::regtest())
}

/// Regtest with adjusted parameters and the stock genesis and rules.
pub fn regtest_with(f: impl FnOnce(&mut ConsensusParams)) -> Arc<Network> {
    let base = Network::regtest();
    let mut params = regtest_params();
    f(&mut params);
    Arc::new(Network {
        name: "regtest",
        params,
        genesis: base.genesis.clone(),
        rules: pow_rules(),
    })
}
