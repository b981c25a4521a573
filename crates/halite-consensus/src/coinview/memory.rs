use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{check_tip, partition_changes, CoinDatabase};
use crate::coins::{Coins, HashHeightPair, RewindData, UnspentOutput};
use crate::error::EngineError;
use crate::hash::Hash256;
use crate::stake::BlockStake;
use crate::tx::OutPoint;

#[derive(Default)]
struct Tables {
    tip: Option<HashHeightPair>,
    coins: BTreeMap<OutPoint, Coins>,
    rewind: BTreeMap<u32, RewindData>,
    stake: BTreeMap<Hash256, BlockStake>,
}

/// In-process backend. All writes for one call happen under a single write
/// lock, so readers see either the old or the new state.
#[derive(Default)]
pub struct MemoryCoinDatabase {
    inner: RwLock<Tables>,
}

impl MemoryCoinDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoinDatabase for MemoryCoinDatabase {
    fn initialize(&self, genesis: &Hash256) -> Result<(), EngineError> {
        let mut t = self.inner.write();
        if t.tip.is_none() {
            t.tip = Some(HashHeightPair::new(*genesis, 0));
        }
        Ok(())
    }

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, EngineError> {
        Ok(self.inner.read().tip)
    }

    fn fetch_coins(
        &self,
        outpoints: &[OutPoint],
    ) -> Result<BTreeMap<OutPoint, Option<Coins>>, EngineError> {
        let t = self.inner.read();
        Ok(outpoints
            .iter()
            .map(|op| (*op, t.coins.get(op).cloned()))
            .collect())
    }

    fn save_changes(
        &self,
        outputs: &[UnspentOutput],
        old_tip: &HashHeightPair,
        new_tip: &HashHeightPair,
        rewind: &RewindData,
    ) -> Result<(), EngineError> {
        let mut t = self.inner.write();
        check_tip(t.tip.as_ref(), old_tip)?;

        let (deletes, inserts) = partition_changes(outputs);
        for op in &deletes {
            t.coins.remove(op);
        }
        for (op, c) in &inserts {
            t.coins.insert(*op, (*c).clone());
        }
        t.rewind.insert(old_tip.height + 1, rewind.clone());
        t.tip = Some(*new_tip);

        debug!(
            height = new_tip.height,
            deleted = deletes.len(),
            inserted = inserts.len(),
            "memory coin db committed"
        );
        Ok(())
    }

    fn rewind(&self) -> Result<HashHeightPair, EngineError> {
        let mut t = self.inner.write();
        let tip = t.tip.ok_or(EngineError::Uninitialized)?;
        let rd = t
            .rewind
            .get(&tip.height)
            .cloned()
            .ok_or(EngineError::MissingRewindData(tip.height))?;
        let previous = rd.previous_tip.ok_or_else(|| {
            EngineError::Corruption(format!("rewind record {} has no previous tip", tip.height))
        })?;

        for op in &rd.outputs_to_remove {
            t.coins.remove(op);
        }
        for (op, c) in &rd.outputs_to_restore {
            t.coins.insert(*op, c.clone());
        }
        t.rewind.remove(&tip.height);
        t.tip = Some(previous);
        Ok(previous)
    }

    fn get_rewind_data(&self, height: u32) -> Result<Option<RewindData>, EngineError> {
        Ok(self.inner.read().rewind.get(&height).cloned())
    }

    fn put_stake(&self, items: &[(Hash256, BlockStake)]) -> Result<(), EngineError> {
        let mut t = self.inner.write();
        for (hash, stake) in items {
            t.stake.insert(*hash, stake.clone());
        }
        Ok(())
    }

    fn get_stake(&self, hash: &Hash256) -> Result<Option<BlockStake>, EngineError> {
        Ok(self.inner.read().stake.get(hash).cloned())
    }

    fn all_coins(&self) -> Result<Vec<(OutPoint, Coins)>, EngineError> {
        Ok(self
            .inner
            .read()
            .coins
            .iter()
            .map(|(op, c)| (*op, c.clone()))
            .collect())
    }
}

#[cfg(test)]
mod contract {
    use super::MemoryCoinDatabase;

    crate::coin_db_contract_tests!(MemoryCoinDatabase::new());
}
