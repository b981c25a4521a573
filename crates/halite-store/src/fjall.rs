//! fjall (LSM) coin database.
//!
//! Each logical table is a partition. fjall has no read-write transactions,
//! so mutating calls hold `write_lock` across the tip read and the atomic
//! cross-partition batch that follows it.

use std::collections::BTreeMap;
use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use halite_consensus::coinview::{
    check_tip, partition_changes, CoinDatabase, TABLE_COINS, TABLE_REWIND, TABLE_STAKE,
    TABLE_TIP_HASH,
};
use halite_consensus::stake::BlockStake;
use halite_consensus::{
    Coins, EngineError, Hash256, HashHeightPair, OutPoint, RewindData, UnspentOutput,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::keys::{
    coins_key, decode_coins, decode_coins_key, decode_rewind, decode_stake, decode_tip,
    rewind_key, rewind_target, TIP_KEY,
};

fn storage(op: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::Storage(format!("{op}: {e}"))
}

pub struct FjallCoinDatabase {
    keyspace: Keyspace,
    tip: PartitionHandle,
    coins: PartitionHandle,
    rewind: PartitionHandle,
    stake: PartitionHandle,
    write_lock: Mutex<()>,
}

impl FjallCoinDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let keyspace = Config::new(path).open().map_err(|e| storage("fjall open", e))?;
        let open = |name: &str| {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .map_err(|e| storage("open partition", e))
        };
        let tip = open(TABLE_TIP_HASH)?;
        let coins = open(TABLE_COINS)?;
        let rewind = open(TABLE_REWIND)?;
        let stake = open(TABLE_STAKE)?;
        info!(path = %path.display(), "opened fjall coin database");
        Ok(Self {
            keyspace,
            tip,
            coins,
            rewind,
            stake,
            write_lock: Mutex::new(()),
        })
    }

    fn read_tip(&self) -> Result<Option<HashHeightPair>, EngineError> {
        let value = self.tip.get(TIP_KEY).map_err(|e| storage("get tip", e))?;
        value.map(|v| decode_tip(&v)).transpose()
    }

    fn persist(&self) -> Result<(), EngineError> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| storage("persist", e))
    }
}

impl CoinDatabase for FjallCoinDatabase {
    fn initialize(&self, genesis: &Hash256) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock();
        if self.read_tip()?.is_some() {
            return Ok(());
        }
        self.tip
            .insert(TIP_KEY, HashHeightPair::new(*genesis, 0).to_bytes().as_slice())
            .map_err(|e| storage("put tip", e))?;
        self.persist()
    }

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, EngineError> {
        self.read_tip()
    }

    fn fetch_coins(
        &self,
        outpoints: &[OutPoint],
    ) -> Result<BTreeMap<OutPoint, Option<Coins>>, EngineError> {
        // One snapshot for the whole query.
        let snapshot = self.coins.snapshot();
        let mut out = BTreeMap::new();
        for op in outpoints {
            let value = snapshot
                .get(coins_key(op).as_slice())
                .map_err(|e| storage("get coins", e))?;
            out.insert(*op, value.map(|v| decode_coins(&v)).transpose()?);
        }
        Ok(out)
    }

    fn save_changes(
        &self,
        outputs: &[UnspentOutput],
        old_tip: &HashHeightPair,
        new_tip: &HashHeightPair,
        rewind: &RewindData,
    ) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock();
        check_tip(self.read_tip()?.as_ref(), old_tip)?;

        let (deletes, inserts) = partition_changes(outputs);
        let mut batch = self.keyspace.batch();
        for op in &deletes {
            batch.remove(&self.coins, coins_key(op).as_slice());
        }
        for (op, c) in &inserts {
            batch.insert(&self.coins, coins_key(op).as_slice(), c.to_bytes());
        }
        batch.insert(
            &self.rewind,
            rewind_key(old_tip.height + 1).as_slice(),
            rewind.to_bytes(),
        );
        batch.insert(&self.tip, TIP_KEY, new_tip.to_bytes().as_slice());
        batch.commit().map_err(|e| storage("commit", e))?;
        self.persist()?;

        debug!(
            height = new_tip.height,
            deleted = deletes.len(),
            inserted = inserts.len(),
            "fjall coin db committed"
        );
        Ok(())
    }

    fn rewind(&self) -> Result<HashHeightPair, EngineError> {
        let _guard = self.write_lock.lock();
        let tip = self.read_tip()?.ok_or(EngineError::Uninitialized)?;
        let key = rewind_key(tip.height);
        let rd = self
            .rewind
            .get(key.as_slice())
            .map_err(|e| storage("get rewind", e))?
            .ok_or(EngineError::MissingRewindData(tip.height))?;
        let rd = decode_rewind(&rd)?;
        let previous = rewind_target(tip.height, &rd)?;

        let mut batch = self.keyspace.batch();
        for op in &rd.outputs_to_remove {
            batch.remove(&self.coins, coins_key(op).as_slice());
        }
        for (op, c) in &rd.outputs_to_restore {
            batch.insert(&self.coins, coins_key(op).as_slice(), c.to_bytes());
        }
        batch.remove(&self.rewind, key.as_slice());
        batch.insert(&self.tip, TIP_KEY, previous.to_bytes().as_slice());
        batch.commit().map_err(|e| storage("commit", e))?;
        self.persist()?;
        Ok(previous)
    }

    fn get_rewind_data(&self, height: u32) -> Result<Option<RewindData>, EngineError> {
        let value = self
            .rewind
            .get(rewind_key(height).as_slice())
            .map_err(|e| storage("get rewind", e))?;
        value.map(|v| decode_rewind(&v)).transpose()
    }

    fn put_stake(&self, items: &[(Hash256, BlockStake)]) -> Result<(), EngineError> {
        let mut batch = self.keyspace.batch();
        for (hash, stake) in items {
            batch.insert(&self.stake, hash.as_slice(), stake.to_bytes());
        }
        batch.commit().map_err(|e| storage("commit stake", e))?;
        self.persist()
    }

    fn get_stake(&self, hash: &Hash256) -> Result<Option<BlockStake>, EngineError> {
        let value = self.stake.get(hash).map_err(|e| storage("get stake", e))?;
        value.map(|v| decode_stake(&v)).transpose()
    }

    fn all_coins(&self) -> Result<Vec<(OutPoint, Coins)>, EngineError> {
        let mut out = Vec::new();
        for entry in self.coins.snapshot().iter() {
            let (k, v) = entry.map_err(|e| storage("coins iter", e))?;
            out.push((decode_coins_key(&k)?, decode_coins(&v)?));
        }
        Ok(out)
    }
}
