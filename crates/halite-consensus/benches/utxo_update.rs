//! Working-set cost of connecting a block: bulk load, per-transaction
//! update, then producing the change list and rewind record.
//!
//! Run with: cargo bench --package halite-consensus --bench utxo_update

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use halite_consensus::script::Script;
use halite_consensus::{
    Coins, HashHeightPair, OutPoint, Transaction, TxIn, TxOut, UnspentOutput, UnspentOutputSet,
};

fn funding(n: usize) -> Vec<UnspentOutput> {
    (0..n)
        .map(|i| {
            let mut txid = [0u8; 32];
            txid[..8].copy_from_slice(&(i as u64).to_le_bytes());
            let coins = Coins {
                height: 1,
                tx_out: TxOut::new(10_000, Script::p2pkh([i as u8; 20])),
                is_coinbase: false,
                is_coinstake: false,
                time: None,
            };
            UnspentOutput::new(OutPoint::new(txid, 0), Some(coins))
        })
        .collect()
}

fn spends(funding: &[UnspentOutput]) -> Vec<Transaction> {
    funding
        .iter()
        .map(|o| {
            Transaction::new(
                1,
                vec![TxIn::new(o.outpoint, Script::empty())],
                vec![
                    TxOut::new(6_000, Script::p2pkh([1; 20])),
                    TxOut::new(3_000, Script::p2pkh([2; 20])),
                ],
                0,
            )
        })
        .collect()
}

fn bench_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("utxo_update");
    for n in [100usize, 1_000, 5_000] {
        let loaded = funding(n);
        let txs = spends(&loaded);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("connect", n), &n, |b, _| {
            b.iter(|| {
                let mut view = UnspentOutputSet::new();
                view.set_coins(loaded.clone()).expect("unique outpoints");
                for tx in &txs {
                    view.update(tx, 2, None).expect("inputs present");
                }
                let changes = view.changed_outputs();
                let rewind = view.rewind_data(HashHeightPair::new([0u8; 32], 1));
                black_box((changes, rewind))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_connect);
criterion_main!(benches);
