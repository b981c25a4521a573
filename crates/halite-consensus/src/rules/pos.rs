//! Proof-of-stake rules layered over the generic pipeline.

use tracing::debug;

use super::full::{check_inputs, connect_transactions, first_transaction, parent_tip};
use super::header::check_proof_of_work;
use super::{RuleContext, RuleEnv};
use crate::block::Block;
use crate::error::{reject, EngineError, ErrorCode, ValidationError};
use crate::hash::to_hex;
use crate::retarget::get_next_target_required;
use crate::script::Script;
use crate::stake::{check_stake_kernel_hash, compute_stake_modifier_v2, BlockStake};
use crate::target::Target;
use crate::tx::Transaction;

pub(crate) fn check_last_pow_block(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    if block.is_proof_of_work() && !env.params.is_pow_block_allowed(ctx.chained.height) {
        return Err(reject(ErrorCode::ProofOfWorkTooHigh, "proof of work after last PoW block"));
    }
    Ok(())
}

/// Shape of a proof-of-stake block: an empty first coinbase output, exactly
/// one coinstake in second position and a masked timestamp.
pub(crate) fn pos_coinstake(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    let is_pos = block.is_proof_of_stake();
    let skip = if is_pos { 2 } else { 0 };
    if block.transactions.iter().skip(skip).any(Transaction::is_coinstake) {
        return Err(reject(ErrorCode::BadMultipleCoinstake, "more than one coinstake"));
    }
    if !is_pos {
        return Ok(());
    }

    let coinbase = first_transaction(block)?;
    let Some((first_out, rest)) = coinbase.outputs.split_first() else {
        return Err(reject(ErrorCode::BadStakeBlock, "coinbase has no outputs"));
    };
    if !first_out.is_empty() {
        return Err(reject(ErrorCode::BadStakeBlock, "coinbase output not empty"));
    }
    if rest
        .iter()
        .any(|o| !o.script_pubkey.is_unspendable())
    {
        return Err(reject(ErrorCode::BadStakeBlock, "coinbase pays a spendable output"));
    }
    if block.header.time & env.params.stake_timestamp_mask != 0 {
        return Err(reject(ErrorCode::StakeTimeViolation, "timestamp does not match mask"));
    }
    Ok(())
}

pub(crate) fn check_difficulty_hybrid(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    let Some(prev) = ctx.chained.previous() else {
        return Ok(());
    };
    let is_pos = block.is_proof_of_stake();
    let expected = get_next_target_required(env.stake_chain()?, prev, env.params, is_pos)?;
    if block.header.bits != expected.to_compact() {
        return Err(reject(ErrorCode::BadDiffBits, "incorrect difficulty"));
    }
    if !is_pos {
        check_proof_of_work(ctx)?;
    }
    Ok(())
}

/// A coinstake spending cold-staking coins may only move them back to the
/// same script, and may not shrink them.
pub(crate) fn pos_cold_staking(
    _env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    if !ctx.flags()?.cold_staking_active {
        return Ok(());
    }
    let block = ctx.block()?;
    if !block.is_proof_of_stake() {
        return Ok(());
    }
    let coinstake = &block.transactions[1];
    let view = ctx.coin_view()?;

    let mut scripts: Vec<&Script> = Vec::with_capacity(coinstake.inputs.len());
    for input in &coinstake.inputs {
        let coins = view
            .get_output_for(input)
            .ok_or(reject(ErrorCode::ReadTxPrevFailed, "coinstake input missing"))?;
        scripts.push(&coins.tx_out.script_pubkey);
    }
    if !scripts.iter().any(|s| s.is_cold_staking()) {
        return Ok(());
    }

    let source = scripts[0];
    if scripts.iter().any(|s| *s != source) {
        return Err(reject(
            ErrorCode::BadColdstakeInputs,
            "coinstake inputs use different scripts",
        ));
    }
    for out in coinstake.outputs.iter().skip(1) {
        if out.script_pubkey.is_op_return_pubkey() {
            continue;
        }
        if &out.script_pubkey != source {
            return Err(reject(
                ErrorCode::BadColdstakeOutputs,
                "coinstake output does not return to the cold staking script",
            ));
        }
    }

    let value_in = view.value_in(coinstake);
    if value_in > coinstake.total_out() {
        return Err(reject(
            ErrorCode::BadColdstakeAmount,
            "coinstake reduces the cold staking balance",
        ));
    }
    Ok(())
}

/// Coin view connection for proof-of-stake networks: kernel check, stake
/// reward limits and the block's stake record.
pub(crate) fn pos_coinview(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let flags = ctx.flags()?;
    let block = ctx.block()?;
    let params = env.params;
    let height = ctx.chained.height;
    let block_hash = ctx.chained.hash;
    let prev = parent_tip(ctx)?;
    let stake_chain = env.stake_chain()?;
    let prev_stake = stake_chain
        .get(&prev.hash)?
        .ok_or_else(|| EngineError::MissingStake(to_hex(&prev.hash)))?;

    let mut stake = BlockStake::for_block(block);
    let view = ctx.coin_view()?;

    let mut stake_value_in = 0;
    if block.is_proof_of_stake() {
        let coinstake = &block.transactions[1];
        let prevout = coinstake.inputs[0].prevout;
        let staked = view
            .coins_for(&prevout)
            .ok_or(reject(ErrorCode::ReadTxPrevFailed, "staked coins not found"))?;
        if height.saturating_sub(staked.height) < params.stake_min_confirmations {
            return Err(reject(ErrorCode::InvalidStakeDepth, "staked coins too recent"));
        }
        if staked.time.unwrap_or(0) > block.header.time {
            return Err(reject(ErrorCode::BadCoinstakeTime, "coinstake older than its input"));
        }
        let target = Target::from_compact(block.header.bits)
            .map_err(|_| reject(ErrorCode::BadDiffBits, "bits do not decode"))?;
        stake.hash_proof = check_stake_kernel_hash(
            &target,
            &prev_stake.stake_modifier_v2,
            staked,
            &prevout,
            block.header.time,
        )?;
        stake.stake_modifier_v2 =
            compute_stake_modifier_v2(Some(&prev_stake.stake_modifier_v2), &prevout.txid);
        stake_value_in = check_inputs(params, coinstake, view, height)?;
    } else {
        stake.hash_proof = block_hash;
        stake.stake_modifier_v2 =
            compute_stake_modifier_v2(Some(&prev_stake.stake_modifier_v2), &block_hash);
    }

    let fees = connect_transactions(
        params,
        block,
        view,
        height,
        flags.enforce_bip30,
        Some(block.header.time),
    )?;

    check_pos_reward(env, block, height, fees, stake_value_in)?;

    debug!(
        height,
        pos = stake.is_proof_of_stake(),
        proof = %to_hex(&stake.hash_proof),
        "stake record computed"
    );
    ctx.stake = Some(stake);
    Ok(())
}

fn check_pos_reward(
    env: &RuleEnv<'_>,
    block: &Block,
    height: u32,
    fees: i64,
    stake_value_in: i64,
) -> Result<(), ValidationError> {
    let params = env.params;
    let coinbase = first_transaction(block)?;

    if block.is_proof_of_stake() {
        if coinbase.total_out() != 0 {
            return Err(reject(ErrorCode::BadCoinbaseAmount, "coinbase pays in a PoS block"));
        }
        let reward = params.proof_of_stake_reward_at(height);
        let coinstake = &block.transactions[1];
        let stake_reward = coinstake.total_out() - stake_value_in;
        if stake_reward > fees + reward {
            return Err(reject(ErrorCode::BadCoinstakeAmount, "coinstake pays too much"));
        }
        check_reward_split(params, coinstake, reward)?;
    } else {
        let reward = params.proof_of_work_reward_at(height);
        if coinbase.total_out() > fees + reward {
            return Err(reject(ErrorCode::BadCoinbaseAmount, "coinbase pays too much"));
        }
        check_reward_split(params, coinbase, reward)?;
    }
    Ok(())
}

fn check_reward_split(
    params: &crate::params::ConsensusParams,
    tx: &Transaction,
    reward: i64,
) -> Result<(), ValidationError> {
    let Some(split) = &params.reward_split else {
        return Ok(());
    };
    let required = split.required_amount(reward);
    let paid: i64 = tx
        .outputs
        .iter()
        .filter(|o| o.script_pubkey == split.script)
        .map(|o| o.value)
        .sum();
    if paid < required {
        return Err(reject(
            ErrorCode::BadCoinstakeRewardSplit,
            "reward split output missing or too small",
        ));
    }
    Ok(())
}
