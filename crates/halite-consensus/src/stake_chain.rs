use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::chain::ChainedHeader;
use crate::coinview::CoinDatabase;
use crate::error::EngineError;
use crate::hash::Hash256;
use crate::stake::{BlockStake, StakeChain, StakeItem};

/// Dirty entries tolerated before a non-forced flush writes.
const FLUSH_THRESHOLD: usize = 500;
/// Blocks kept in the cache below the highest cached entry.
const CACHE_WINDOW: u32 = 5_000;

/// Write-back stake cache over the coin database's stake table.
pub struct StakeChainStore {
    db: Arc<dyn CoinDatabase>,
    genesis: Hash256,
    items: RwLock<HashMap<Hash256, StakeItem>>,
}

impl StakeChainStore {
    pub fn new(db: Arc<dyn CoinDatabase>, genesis: Hash256) -> Self {
        let mut items = HashMap::new();
        items.insert(
            genesis,
            StakeItem {
                block_id: genesis,
                block_stake: BlockStake::default(),
                in_store: true,
                height: 0,
            },
        );
        Self {
            db,
            genesis,
            items: RwLock::new(items),
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.items.read().values().filter(|i| !i.in_store).count()
    }

    pub fn cached_count(&self) -> usize {
        self.items.read().len()
    }

    /// Persists dirty entries. Without `force` nothing is written until
    /// enough entries have accumulated.
    pub fn flush(&self, force: bool) -> Result<(), EngineError> {
        let mut items = self.items.write();
        let mut dirty: Vec<(u32, Hash256, BlockStake)> = items
            .values()
            .filter(|i| !i.in_store)
            .map(|i| (i.height, i.block_id, i.block_stake.clone()))
            .collect();
        if dirty.is_empty() || (!force && dirty.len() < FLUSH_THRESHOLD) {
            return Ok(());
        }
        dirty.sort_unstable_by_key(|d| d.0);

        let batch: Vec<(Hash256, BlockStake)> =
            dirty.iter().map(|(_, h, s)| (*h, s.clone())).collect();
        self.db.put_stake(&batch)?;
        for (_, hash, _) in &dirty {
            if let Some(item) = items.get_mut(hash) {
                item.in_store = true;
            }
        }

        let top = items.values().map(|i| i.height).max().unwrap_or(0);
        let genesis = self.genesis;
        let before = items.len();
        items.retain(|h, i| *h == genesis || !i.in_store || i.height + CACHE_WINDOW >= top);
        debug!(
            flushed = dirty.len(),
            evicted = before - items.len(),
            "stake chain flushed"
        );
        Ok(())
    }
}

impl StakeChain for StakeChainStore {
    fn get(&self, hash: &Hash256) -> Result<Option<BlockStake>, EngineError> {
        if let Some(item) = self.items.read().get(hash) {
            return Ok(Some(item.block_stake.clone()));
        }
        self.db.get_stake(hash)
    }

    fn set(&self, header: &ChainedHeader, stake: BlockStake) -> Result<(), EngineError> {
        trace!(height = header.height, "stake set");
        self.items.write().insert(
            header.hash,
            StakeItem {
                block_id: header.hash,
                block_stake: stake,
                in_store: false,
                height: header.height,
            },
        );
        Ok(())
    }

    fn load(&self, tip: &ChainedHeader) -> Result<(), EngineError> {
        let mut loaded = 0usize;
        let mut cur = Some(tip);
        while let Some(h) = cur {
            if h.height == 0 || h.height + CACHE_WINDOW < tip.height {
                break;
            }
            if !self.items.read().contains_key(&h.hash) {
                let stake = self
                    .db
                    .get_stake(&h.hash)?
                    .ok_or_else(|| EngineError::MissingStake(crate::hash::to_hex(&h.hash)))?;
                self.items.write().insert(
                    h.hash,
                    StakeItem {
                        block_id: h.hash,
                        block_stake: stake,
                        in_store: true,
                        height: h.height,
                    },
                );
                loaded += 1;
            }
            cur = h.previous().map(|p| p.as_ref());
        }
        debug!(loaded, tip = tip.height, "stake chain loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::coinview::MemoryCoinDatabase;
    use crate::stake::BlockStakeFlags;
    use crate::target::CompactTarget;

    fn chain(n: u32) -> Vec<Arc<ChainedHeader>> {
        let mk = |prev: Hash256, t: u32| BlockHeader {
            version: 1,
            prev_block_hash: prev,
            merkle_root: [0u8; 32],
            time: t,
            bits: CompactTarget(0x207f_ffff),
            nonce: 0,
        };
        let mut v = vec![ChainedHeader::genesis(mk([0u8; 32], 0))];
        for i in 1..=n {
            let prev = Arc::clone(&v[v.len() - 1]);
            v.push(ChainedHeader::new(mk(prev.hash, i), prev));
        }
        v
    }

    fn pos_stake(t: u32) -> BlockStake {
        BlockStake {
            flags: BlockStakeFlags::PROOF_OF_STAKE,
            stake_time: t,
            ..Default::default()
        }
    }

    #[test]
    fn genesis_is_seeded_as_pow() {
        let headers = chain(0);
        let db = Arc::new(MemoryCoinDatabase::new());
        let store = StakeChainStore::new(db, headers[0].hash);
        let g = store.get(&headers[0].hash).expect("get").expect("genesis");
        assert!(g.is_proof_of_work());
    }

    #[test]
    fn flush_persists_dirty_items() {
        let headers = chain(3);
        let db = Arc::new(MemoryCoinDatabase::new());
        let store = StakeChainStore::new(db.clone(), headers[0].hash);
        for h in &headers[1..] {
            store.set(h, pos_stake(h.height)).expect("set");
        }
        assert_eq!(store.dirty_count(), 3);

        store.flush(false).expect("lazy flush");
        assert_eq!(store.dirty_count(), 3);
        assert_eq!(db.get_stake(&headers[1].hash).expect("db"), None);

        store.flush(true).expect("forced flush");
        assert_eq!(store.dirty_count(), 0);
        assert_eq!(
            db.get_stake(&headers[2].hash).expect("db"),
            Some(pos_stake(2))
        );
    }

    #[test]
    fn load_reads_back_from_database() {
        let headers = chain(3);
        let db = Arc::new(MemoryCoinDatabase::new());
        let items: Vec<_> = headers[1..]
            .iter()
            .map(|h| (h.hash, pos_stake(h.height)))
            .collect();
        db.put_stake(&items).expect("put");

        let store = StakeChainStore::new(db, headers[0].hash);
        store.load(&headers[3]).expect("load");
        assert_eq!(store.cached_count(), 4);
        assert_eq!(
            store.get(&headers[3].hash).expect("get"),
            Some(pos_stake(3))
        );
    }
}
