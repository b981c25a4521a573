//! redb-backed coin database.
//!
//! One redb table per logical table. Every mutating call runs inside a
//! single write transaction, so the tip check and the writes it guards
//! commit or vanish together; readers use snapshot read transactions.

use std::collections::BTreeMap;
use std::path::Path;

use halite_consensus::coinview::{
    check_tip, partition_changes, CoinDatabase, TABLE_COINS, TABLE_REWIND, TABLE_STAKE,
    TABLE_TIP_HASH,
};
use halite_consensus::stake::BlockStake;
use halite_consensus::{
    Coins, EngineError, Hash256, HashHeightPair, OutPoint, RewindData, UnspentOutput,
};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, info};

use crate::keys::{
    coins_key, decode_coins, decode_coins_key, decode_rewind, decode_stake, decode_tip,
    rewind_key, rewind_target, TIP_KEY,
};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const TIP_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new(TABLE_TIP_HASH);
const COINS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new(TABLE_COINS);
const REWIND_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new(TABLE_REWIND);
const STAKE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new(TABLE_STAKE);

fn storage(op: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::Storage(format!("{op}: {e}"))
}

// ---------------------------------------------------------------------------
// RedbCoinDatabase
// ---------------------------------------------------------------------------

pub struct RedbCoinDatabase {
    db: Database,
}

impl RedbCoinDatabase {
    /// Open (or create) the database file at `path` and make sure all four
    /// tables exist.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let db = Database::create(path).map_err(|e| storage("redb open", e))?;
        let tx = db
            .begin_write()
            .map_err(|e| storage("redb begin_write", e))?;
        for def in [TIP_TABLE, COINS_TABLE, REWIND_TABLE, STAKE_TABLE] {
            tx.open_table(def)
                .map_err(|e| storage("create table", e))?;
        }
        tx.commit().map_err(|e| storage("redb commit", e))?;
        info!(path = %path.display(), "opened redb coin database");
        Ok(Self { db })
    }

    fn read(&self) -> Result<ReadTransaction, EngineError> {
        self.db
            .begin_read()
            .map_err(|e| storage("begin_read", e))
    }

    fn write(&self) -> Result<WriteTransaction, EngineError> {
        self.db
            .begin_write()
            .map_err(|e| storage("begin_write", e))
    }
}

fn commit(tx: WriteTransaction) -> Result<(), EngineError> {
    tx.commit().map_err(|e| storage("commit", e))
}

fn tip_in(tx: &WriteTransaction) -> Result<Option<HashHeightPair>, EngineError> {
    let table = tx
        .open_table(TIP_TABLE)
        .map_err(|e| storage("open tip", e))?;
    let guard = table
        .get(TIP_KEY)
        .map_err(|e| storage("get tip", e))?;
    guard.map(|g| decode_tip(g.value())).transpose()
}

fn put_tip(tx: &WriteTransaction, tip: &HashHeightPair) -> Result<(), EngineError> {
    let mut table = tx
        .open_table(TIP_TABLE)
        .map_err(|e| storage("open tip", e))?;
    table
        .insert(TIP_KEY, tip.to_bytes().as_slice())
        .map_err(|e| storage("put tip", e))?;
    Ok(())
}

impl CoinDatabase for RedbCoinDatabase {
    fn initialize(&self, genesis: &Hash256) -> Result<(), EngineError> {
        let tx = self.write()?;
        if tip_in(&tx)?.is_some() {
            return Ok(());
        }
        put_tip(&tx, &HashHeightPair::new(*genesis, 0))?;
        commit(tx)
    }

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, EngineError> {
        let tx = self.read()?;
        let table = tx
            .open_table(TIP_TABLE)
            .map_err(|e| storage("open tip", e))?;
        let guard = table
            .get(TIP_KEY)
            .map_err(|e| storage("get tip", e))?;
        guard.map(|g| decode_tip(g.value())).transpose()
    }

    fn fetch_coins(
        &self,
        outpoints: &[OutPoint],
    ) -> Result<BTreeMap<OutPoint, Option<Coins>>, EngineError> {
        let tx = self.read()?;
        let table = tx
            .open_table(COINS_TABLE)
            .map_err(|e| storage("open coins", e))?;
        let mut out = BTreeMap::new();
        for op in outpoints {
            let key = coins_key(op);
            let guard = table
                .get(key.as_slice())
                .map_err(|e| storage("get coins", e))?;
            let coins = guard.map(|g| decode_coins(g.value())).transpose()?;
            out.insert(*op, coins);
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
        let tx = self.write()?;
        // Dropping `tx` without commit aborts it.
        check_tip(tip_in(&tx)?.as_ref(), old_tip)?;

        let (deletes, inserts) = partition_changes(outputs);
        {
            let mut coins = tx
                .open_table(COINS_TABLE)
                .map_err(|e| storage("open coins", e))?;
            for op in &deletes {
                coins
                    .remove(coins_key(op).as_slice())
                    .map_err(|e| storage("delete coins", e))?;
            }
            for (op, c) in &inserts {
                coins
                    .insert(coins_key(op).as_slice(), c.to_bytes().as_slice())
                    .map_err(|e| storage("put coins", e))?;
            }
        }
        {
            let mut table = tx
                .open_table(REWIND_TABLE)
                .map_err(|e| storage("open rewind", e))?;
            table
                .insert(
                    rewind_key(old_tip.height + 1).as_slice(),
                    rewind.to_bytes().as_slice(),
                )
                .map_err(|e| storage("put rewind", e))?;
        }
        put_tip(&tx, new_tip)?;
        commit(tx)?;

        debug!(
            height = new_tip.height,
            deleted = deletes.len(),
            inserted = inserts.len(),
            "redb coin db committed"
        );
        Ok(())
    }

    fn rewind(&self) -> Result<HashHeightPair, EngineError> {
        let tx = self.write()?;
        let tip = tip_in(&tx)?.ok_or(EngineError::Uninitialized)?;
        let key = rewind_key(tip.height);

        let rd = {
            let table = tx
                .open_table(REWIND_TABLE)
                .map_err(|e| storage("open rewind", e))?;
            let guard = table
                .get(key.as_slice())
                .map_err(|e| storage("get rewind", e))?
                .ok_or(EngineError::MissingRewindData(tip.height))?;
            decode_rewind(guard.value())?
        };
        let previous = rewind_target(tip.height, &rd)?;

        {
            let mut coins = tx
                .open_table(COINS_TABLE)
                .map_err(|e| storage("open coins", e))?;
            for op in &rd.outputs_to_remove {
                coins
                    .remove(coins_key(op).as_slice())
                    .map_err(|e| storage("delete coins", e))?;
            }
            for (op, c) in &rd.outputs_to_restore {
                coins
                    .insert(coins_key(op).as_slice(), c.to_bytes().as_slice())
                    .map_err(|e| storage("restore coins", e))?;
            }
        }
        {
            let mut table = tx
                .open_table(REWIND_TABLE)
                .map_err(|e| storage("open rewind", e))?;
            table
                .remove(key.as_slice())
                .map_err(|e| storage("delete rewind", e))?;
        }
        put_tip(&tx, &previous)?;
        commit(tx)?;
        Ok(previous)
    }

    fn get_rewind_data(&self, height: u32) -> Result<Option<RewindData>, EngineError> {
        let tx = self.read()?;
        let table = tx
            .open_table(REWIND_TABLE)
            .map_err(|e| storage("open rewind", e))?;
        let guard = table
            .get(rewind_key(height).as_slice())
            .map_err(|e| storage("get rewind", e))?;
        guard.map(|g| decode_rewind(g.value())).transpose()
    }

    fn put_stake(&self, items: &[(Hash256, BlockStake)]) -> Result<(), EngineError> {
        let tx = self.write()?;
        {
            let mut table = tx
                .open_table(STAKE_TABLE)
                .map_err(|e| storage("open stake", e))?;
            for (hash, stake) in items {
                table
                    .insert(hash.as_slice(), stake.to_bytes().as_slice())
                    .map_err(|e| storage("put stake", e))?;
            }
        }
        commit(tx)
    }

    fn get_stake(&self, hash: &Hash256) -> Result<Option<BlockStake>, EngineError> {
        let tx = self.read()?;
        let table = tx
            .open_table(STAKE_TABLE)
            .map_err(|e| storage("open stake", e))?;
        let guard = table
            .get(hash.as_slice())
            .map_err(|e| storage("get stake", e))?;
        guard.map(|g| decode_stake(g.value())).transpose()
    }

    fn all_coins(&self) -> Result<Vec<(OutPoint, Coins)>, EngineError> {
        let tx = self.read()?;
        let table = tx
            .open_table(COINS_TABLE)
            .map_err(|e| storage("open coins", e))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| storage("coins iter", e))? {
            let (k, v) = entry.map_err(|e| storage("coins next", e))?;
            out.push((decode_coins_key(k.value())?, decode_coins(v.value())?));
        }
        Ok(out)
    }
}
