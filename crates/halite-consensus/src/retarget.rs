use num_bigint::BigUint;

use crate::chain::ChainedHeader;
use crate::error::{EngineError, ValidationError};
use crate::hash::to_hex;
use crate::params::ConsensusParams;
use crate::stake::StakeChain;
use crate::target::{CompactTarget, Target};

fn decode_bits(bits: CompactTarget) -> Result<Target, EngineError> {
    Target::from_compact(bits)
        .map_err(|e| EngineError::Corruption(format!("stored header bits: {e}")))
}

/// Proof-of-work target the header at `chained` must carry.
pub fn get_work_required(
    chained: &ChainedHeader,
    params: &ConsensusParams,
) -> Result<Target, ValidationError> {
    let Some(prev) = chained.previous() else {
        return Ok(params.pow_limit.clone());
    };

    let interval = params.difficulty_adjustment_interval();
    let pow_limit_bits = params.pow_limit.to_compact();

    if chained.height % interval != 0 {
        if params.pow_allow_min_difficulty_blocks {
            let spacing = params.pow_target_spacing as u64;
            if chained.header.time as u64 > prev.header.time as u64 + 2 * spacing {
                return Ok(params.pow_limit.clone());
            }

            // Last block that was not a special min-difficulty one.
            let mut cur = prev;
            while let Some(p) = cur.previous() {
                if cur.height % interval == 0 || cur.header.bits != pow_limit_bits {
                    break;
                }
                cur = p;
            }
            return Ok(decode_bits(cur.header.bits)?);
        }
        return Ok(decode_bits(prev.header.bits)?);
    }

    let first_height = prev.height + 1 - interval;
    let first = prev
        .get_ancestor(first_height)
        .ok_or_else(|| EngineError::AncestorMissing {
            height: first_height,
            from: to_hex(&prev.hash),
        })?;

    calculate_next_work_required(prev, first.header.time, params)
}

fn calculate_next_work_required(
    prev: &ChainedHeader,
    first_block_time: u32,
    params: &ConsensusParams,
) -> Result<Target, ValidationError> {
    if params.pow_no_retargeting {
        return Ok(decode_bits(prev.header.bits)?);
    }

    let timespan = params.pow_target_timespan as i64;
    let actual =
        (prev.header.time as i64 - first_block_time as i64).clamp(timespan / 4, timespan * 4);

    let mut new = decode_bits(prev.header.bits)?.into_biguint();
    new *= BigUint::from(actual as u64);
    new /= BigUint::from(timespan as u64);

    let new = Target::from_biguint(new);
    if new > params.pow_limit {
        return Ok(params.pow_limit.clone());
    }
    Ok(new)
}

/// Hybrid retarget for proof-of-stake networks. PoS and PoW blocks each
/// follow their own moving average, recomputed on every block from the last
/// two blocks of the same kind.
pub fn get_next_target_required(
    stake_chain: &dyn StakeChain,
    prev: &ChainedHeader,
    params: &ConsensusParams,
    proof_of_stake: bool,
) -> Result<Target, ValidationError> {
    let limit = if proof_of_stake {
        params.pos_limit.clone().unwrap_or_else(|| params.pow_limit.clone())
    } else {
        params.pow_limit.clone()
    };

    let last = last_of_kind(stake_chain, prev, proof_of_stake)?;
    let Some(before_last) = last.previous() else {
        return Ok(limit);
    };
    let prev_last = last_of_kind(stake_chain, before_last, proof_of_stake)?;
    if prev_last.previous().is_none() {
        return Ok(limit);
    }

    let spacing = params.pow_target_spacing as i64;
    let mut actual = last.header.time as i64 - prev_last.header.time as i64;
    if actual < 0 {
        actual = spacing;
    }
    let n = params.pos_target_timespan as i64 / spacing;

    let mut target = decode_bits(last.header.bits)?.into_biguint();
    target *= BigUint::from(((n - 1) * spacing + 2 * actual) as u64);
    target /= BigUint::from(((n + 1) * spacing) as u64);

    let target = Target::from_biguint(target);
    if target.is_zero() || target > limit {
        return Ok(limit);
    }
    Ok(target)
}

fn last_of_kind<'a>(
    stake_chain: &dyn StakeChain,
    start: &'a ChainedHeader,
    proof_of_stake: bool,
) -> Result<&'a ChainedHeader, ValidationError> {
    let mut cur = start;
    loop {
        let stake = stake_chain
            .get(&cur.hash)?
            .ok_or_else(|| EngineError::MissingStake(to_hex(&cur.hash)))?;
        if stake.is_proof_of_stake() == proof_of_stake {
            return Ok(cur);
        }
        match cur.previous() {
            Some(p) => cur = p,
            None => return Ok(cur),
        }
    }
}
