use std::collections::btree_map::Entry as MapEntry;
use std::collections::BTreeMap;

use crate::coins::{Coins, HashHeightPair, RewindData, UnspentOutput};
use crate::error::EngineError;
use crate::tx::{OutPoint, Transaction, TxIn};

#[derive(Clone, Debug)]
struct Slot {
    /// As loaded from the coin database.
    original: Option<Coins>,
    current: Option<Coins>,
}

/// Working set of outputs for one validation attempt. Loaded from the coin
/// database, mutated by the block's transactions, and turned back into a
/// change list plus rewind record on commit.
#[derive(Clone, Debug, Default)]
pub struct UnspentOutputSet {
    slots: BTreeMap<OutPoint, Slot>,
}

impl UnspentOutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bulk load. A repeated outpoint is a caller bug.
    pub fn set_coins(&mut self, outputs: Vec<UnspentOutput>) -> Result<(), EngineError> {
        for o in outputs {
            match self.slots.entry(o.outpoint) {
                MapEntry::Occupied(_) => return Err(EngineError::DuplicateOutPoint(o.outpoint)),
                MapEntry::Vacant(v) => {
                    v.insert(Slot {
                        original: o.coins.clone(),
                        current: o.coins,
                    });
                }
            }
        }
        Ok(())
    }

    /// Like `set_coins`, but a repeated outpoint keeps the entry already present.
    pub fn try_set_coins(&mut self, outputs: Vec<UnspentOutput>) {
        for o in outputs {
            self.slots.entry(o.outpoint).or_insert_with(|| Slot {
                original: o.coins.clone(),
                current: o.coins,
            });
        }
    }

    pub fn coins_for(&self, outpoint: &OutPoint) -> Option<&Coins> {
        self.slots.get(outpoint).and_then(|s| s.current.as_ref())
    }

    pub fn get_output_for(&self, input: &TxIn) -> Option<&Coins> {
        self.coins_for(&input.prevout)
    }

    pub fn have_inputs(&self, tx: &Transaction) -> bool {
        tx.inputs.iter().all(|i| self.get_output_for(i).is_some())
    }

    /// Sum of the values of the resolved inputs of `tx`.
    pub fn value_in(&self, tx: &Transaction) -> i64 {
        tx.inputs
            .iter()
            .filter_map(|i| self.get_output_for(i))
            .map(|c| c.tx_out.value)
            .sum()
    }

    /// Spends the inputs of `tx` (unless it is a coinbase) and adds its
    /// spendable outputs.
    pub fn update(
        &mut self,
        tx: &Transaction,
        height: u32,
        time: Option<u32>,
    ) -> Result<(), EngineError> {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                let slot = self
                    .slots
                    .get_mut(&input.prevout)
                    .ok_or(EngineError::MissingOutput(input.prevout))?;
                if slot.current.take().is_none() {
                    return Err(EngineError::DoubleSpend(input.prevout));
                }
            }
        }

        let txid = tx.txid();
        let is_coinbase = tx.is_coinbase();
        let is_coinstake = tx.is_coinstake();
        for (n, out) in tx.outputs.iter().enumerate() {
            let coins = Coins {
                height,
                tx_out: out.clone(),
                is_coinbase,
                is_coinstake,
                time,
            };
            if coins.is_prunable() {
                continue;
            }
            let op = OutPoint::new(txid, n as u32);
            self.slots
                .entry(op)
                .and_modify(|s| s.current = Some(coins.clone()))
                .or_insert_with(|| Slot {
                    original: None,
                    current: Some(coins),
                });
        }
        Ok(())
    }

    /// Entries that differ from what was loaded, in outpoint order. `None`
    /// coins mean delete.
    pub fn changed_outputs(&self) -> Vec<UnspentOutput> {
        self.slots
            .iter()
            .filter(|(_, s)| s.current != s.original)
            .map(|(op, s)| UnspentOutput::new(*op, s.current.clone()))
            .collect()
    }

    /// Undo record that reverses `changed_outputs` back to `previous_tip`.
    pub fn rewind_data(&self, previous_tip: HashHeightPair) -> RewindData {
        let mut rd = RewindData::new(previous_tip);
        for (op, s) in &self.slots {
            if s.current == s.original {
                continue;
            }
            if s.current.is_some() {
                rd.outputs_to_remove.push(*op);
            }
            if let Some(orig) = &s.original {
                rd.outputs_to_restore.push((*op, orig.clone()));
            }
        }
        rd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::tx::TxOut;

    fn coins(value: i64) -> Coins {
        Coins {
            height: 1,
            tx_out: TxOut::new(value, Script::p2pkh([1u8; 20])),
            is_coinbase: true,
            is_coinstake: false,
            time: None,
        }
    }

    fn spend(prev: OutPoint, outputs: Vec<TxOut>) -> Transaction {
        Transaction::new(1, vec![TxIn::new(prev, Script::empty())], outputs, 0)
    }

    #[test]
    fn set_coins_rejects_duplicates_try_set_keeps_first() {
        let op = OutPoint::new([1u8; 32], 0);
        let mut set = UnspentOutputSet::new();
        set.set_coins(vec![UnspentOutput::new(op, Some(coins(5)))])
            .expect("load");
        let err = set
            .set_coins(vec![UnspentOutput::new(op, Some(coins(6)))])
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateOutPoint(o) if o == op));

        set.try_set_coins(vec![UnspentOutput::new(op, Some(coins(7)))]);
        assert_eq!(set.coins_for(&op).map(|c| c.tx_out.value), Some(5));
    }

    #[test]
    fn update_spends_and_prunes() {
        let op = OutPoint::new([1u8; 32], 0);
        let mut set = UnspentOutputSet::new();
        set.set_coins(vec![UnspentOutput::new(op, Some(coins(100)))])
            .expect("load");

        let tx = spend(
            op,
            vec![
                TxOut::new(60, Script::p2pkh([2u8; 20])),
                TxOut::new(0, Script::op_return(b"memo")),
            ],
        );
        assert!(set.have_inputs(&tx));
        assert_eq!(set.value_in(&tx), 100);
        set.update(&tx, 2, None).expect("update");

        assert!(set.coins_for(&op).is_none());
        assert!(set.coins_for(&OutPoint::new(tx.txid(), 0)).is_some());
        // The OP_RETURN output never enters the set.
        assert_eq!(set.len(), 2);

        let err = set.update(&tx, 2, None).unwrap_err();
        assert!(matches!(err, EngineError::DoubleSpend(_)));
    }

    #[test]
    fn missing_input_is_fatal() {
        let mut set = UnspentOutputSet::new();
        let tx = spend(OutPoint::new([4u8; 32], 0), vec![TxOut::new(1, Script::empty())]);
        assert!(!set.have_inputs(&tx));
        let err = set.update(&tx, 2, None).unwrap_err();
        assert!(matches!(err, EngineError::MissingOutput(_)));
    }

    #[test]
    fn change_list_and_rewind_data() {
        let loaded = OutPoint::new([1u8; 32], 0);
        let mut set = UnspentOutputSet::new();
        set.set_coins(vec![UnspentOutput::new(loaded, Some(coins(100)))])
            .expect("load");

        let tx1 = spend(loaded, vec![TxOut::new(90, Script::p2pkh([2u8; 20]))]);
        set.update(&tx1, 5, None).expect("tx1");
        let created = OutPoint::new(tx1.txid(), 0);

        // Created and spent in the same block: no database effect.
        let tx2 = spend(created, vec![TxOut::new(80, Script::p2pkh([3u8; 20]))]);
        set.update(&tx2, 5, None).expect("tx2");
        let kept = OutPoint::new(tx2.txid(), 0);

        let changes = set.changed_outputs();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|u| u.outpoint == loaded && u.is_spent()));
        assert!(changes.iter().any(|u| u.outpoint == kept && !u.is_spent()));
        assert!(changes.windows(2).all(|w| w[0].outpoint < w[1].outpoint));

        let rd = set.rewind_data(HashHeightPair::new([9u8; 32], 4));
        assert_eq!(rd.outputs_to_remove, vec![kept]);
        assert_eq!(rd.outputs_to_restore, vec![(loaded, coins(100))]);
        assert_eq!(rd.previous_tip, Some(HashHeightPair::new([9u8; 32], 4)));
    }
}
