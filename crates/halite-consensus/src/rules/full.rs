//! Rules that need the coin database. `SaveCoinview` is always last.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::{RuleContext, RuleEnv};
use crate::block::Block;
use crate::coins::{HashHeightPair, UnspentOutput};
use crate::error::{reject, EngineError, ErrorCode, ValidationError};
use crate::params::ConsensusParams;
use crate::tx::{OutPoint, Transaction};
use crate::utxo_set::UnspentOutputSet;

pub(crate) fn set_activation_deployments(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    ctx.flags = Some(env.deployments.flags(env.params, &ctx.chained));
    Ok(())
}

/// Tip of the coin database the block must extend.
pub(crate) fn parent_tip(ctx: &RuleContext<'_>) -> Result<HashHeightPair, ValidationError> {
    let prev = ctx
        .chained
        .previous()
        .ok_or(EngineError::RuleOrder("genesis is committed by initialize"))?;
    Ok(HashHeightPair::new(prev.hash, prev.height))
}

pub(crate) fn load_coinview(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    let expected = parent_tip(ctx)?;
    let tip = env.coin_db.get_tip_hash()?;
    if tip.as_ref() != Some(&expected) {
        return Err(
            EngineError::tip_mismatch(&expected.hash, tip.as_ref().map(|t| &t.hash)).into(),
        );
    }

    let mut wanted: BTreeSet<OutPoint> = BTreeSet::new();
    for tx in &block.transactions {
        // The block's own outputs, for the BIP30 overwrite check.
        let txid = tx.txid();
        for n in 0..tx.outputs.len() {
            wanted.insert(OutPoint::new(txid, n as u32));
        }
        if !tx.is_coinbase() {
            wanted.extend(tx.inputs.iter().map(|i| i.prevout));
        }
    }
    let wanted: Vec<OutPoint> = wanted.into_iter().collect();
    let fetched = env.coin_db.fetch_coins(&wanted)?;

    let mut view = UnspentOutputSet::new();
    view.set_coins(
        fetched
            .into_iter()
            .map(|(op, coins)| UnspentOutput::new(op, coins))
            .collect(),
    )?;
    debug!(height = ctx.chained.height, loaded = view.len(), "coin view loaded");
    ctx.coin_view = Some(view);
    Ok(())
}

pub(crate) fn coinview(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let flags = ctx.flags()?;
    let block = ctx.block()?;
    let height = ctx.chained.height;
    let params = env.params;
    let view = ctx.coin_view()?;

    let fees = connect_transactions(params, block, view, height, flags.enforce_bip30, None)?;

    let reward = params.proof_of_work_reward_at(height);
    let coinbase_out = first_transaction(block)?.total_out();
    if coinbase_out > fees + reward {
        return Err(reject(ErrorCode::BadCoinbaseAmount, "coinbase pays too much"));
    }
    Ok(())
}

/// The block's first transaction. An empty block is rejected here so rules
/// registered without `EnsureCoinbase` still fail cleanly.
pub(crate) fn first_transaction(block: &Block) -> Result<&Transaction, ValidationError> {
    block
        .transactions
        .first()
        .ok_or_else(|| reject(ErrorCode::BadCoinbaseMissing, "block has no transactions"))
}

/// Applies every transaction of `block` to `view` and returns the total fees.
/// Coinstake value checks are left to the proof-of-stake rules.
pub(crate) fn connect_transactions(
    params: &ConsensusParams,
    block: &Block,
    view: &mut UnspentOutputSet,
    height: u32,
    enforce_bip30: bool,
    coin_time: Option<u32>,
) -> Result<i64, ValidationError> {
    let mut fees: i64 = 0;
    let mut sigops: u64 = 0;
    for tx in &block.transactions {
        if enforce_bip30 {
            let txid = tx.txid();
            for n in 0..tx.outputs.len() {
                if view.coins_for(&OutPoint::new(txid, n as u32)).is_some() {
                    return Err(reject(
                        ErrorCode::BadTransactionBip30,
                        "tried to overwrite transaction",
                    ));
                }
            }
        }

        sigops += super::partial::legacy_sigop_count(tx) as u64;
        if !tx.is_coinbase() {
            if !view.have_inputs(tx) {
                return Err(reject(
                    ErrorCode::BadTransactionMissingInput,
                    "inputs missing or spent",
                ));
            }
            for input in &tx.inputs {
                if let Some(prev) = view.get_output_for(input) {
                    sigops += prev.tx_out.script_pubkey.p2sh_sigop_count(&input.script_sig) as u64;
                }
            }
            let value_in = check_inputs(params, tx, view, height)?;
            if !tx.is_coinstake() {
                let value_out = tx.total_out();
                if value_in < value_out {
                    return Err(reject(ErrorCode::BadTransactionInBelowOut, ""));
                }
                let fee = value_in - value_out;
                if !params.money_range(fee) {
                    return Err(reject(ErrorCode::BadTransactionFeeOutOfRange, ""));
                }
                fees += fee;
                if !params.money_range(fees) {
                    return Err(reject(ErrorCode::BadTransactionFeeOutOfRange, ""));
                }
            }
        }
        if sigops * params.options.witness_scale_factor as u64
            > params.options.max_block_sigops_cost
        {
            return Err(reject(ErrorCode::BadBlockSigOps, "too many sigops"));
        }

        view.update(tx, height, coin_time)?;
    }
    Ok(fees)
}

/// Maturity and value-range checks for the inputs of a non-coinbase
/// transaction. Returns the total input value.
pub fn check_inputs(
    params: &ConsensusParams,
    tx: &Transaction,
    view: &UnspentOutputSet,
    height: u32,
) -> Result<i64, ValidationError> {
    let mut value_in: i64 = 0;
    for input in &tx.inputs {
        let coins = view
            .get_output_for(input)
            .ok_or(reject(ErrorCode::BadTransactionMissingInput, ""))?;
        let depth = height.saturating_sub(coins.height);
        if coins.is_coinbase && depth < params.coinbase_maturity {
            return Err(reject(
                ErrorCode::BadTransactionPrematureCoinbaseSpending,
                "tried to spend coinbase before maturity",
            ));
        }
        if coins.is_coinstake && depth < params.coinbase_maturity {
            return Err(reject(
                ErrorCode::BadTransactionPrematureCoinstakeSpending,
                "tried to spend coinstake before maturity",
            ));
        }
        value_in += coins.tx_out.value;
        if !params.money_range(coins.tx_out.value) || !params.money_range(value_in) {
            return Err(reject(ErrorCode::BadTransactionInputValueOutOfRange, ""));
        }
    }
    Ok(value_in)
}

pub(crate) fn save_coinview(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    if ctx.committed {
        return Err(EngineError::RuleOrder("block committed twice").into());
    }
    let old_tip = parent_tip(ctx)?;
    let new_tip = HashHeightPair::new(ctx.chained.hash, ctx.chained.height);
    let view = ctx
        .coin_view
        .take()
        .ok_or(EngineError::RuleOrder("coin view used before it was loaded"))?;

    let changes = view.changed_outputs();
    let rewind = view.rewind_data(old_tip);
    env.coin_db.save_changes(&changes, &old_tip, &new_tip, &rewind)?;
    ctx.committed = true;

    info!(
        height = new_tip.height,
        hash = %crate::hash::to_hex(&new_tip.hash),
        changes = changes.len(),
        "block committed to coin database"
    );
    Ok(())
}
