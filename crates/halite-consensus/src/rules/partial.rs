//! Context-free block content checks.

use std::collections::HashSet;

use super::{RuleContext, RuleEnv};
use crate::deployments::LockTimeFlags;
use crate::error::{reject, ErrorCode, ValidationError};
use crate::params::ConsensusParams;
use crate::script::script_num_push;
use crate::tx::Transaction;

pub(crate) fn set_activation_deployments(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    ctx.flags = Some(env.deployments.flags(env.params, &ctx.chained));
    Ok(())
}

pub(crate) fn transaction_locktime(
    _env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let flags = ctx.flags()?;
    let block = ctx.block()?;
    let cutoff = match ctx.chained.previous() {
        Some(prev) if flags.lock_time_flags.contains(LockTimeFlags::MEDIAN_TIME_PAST) => {
            prev.median_time_past()
        }
        _ => block.header.time,
    };
    for tx in &block.transactions {
        if !tx.is_final(ctx.chained.height, cutoff as i64) {
            return Err(reject(
                ErrorCode::BadTransactionNonFinal,
                "contains a non-final transaction",
            ));
        }
    }
    Ok(())
}

pub(crate) fn coinbase_height(
    _env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    if !ctx.flags()?.enforce_bip34 {
        return Ok(());
    }
    let block = ctx.block()?;
    let expected = script_num_push(ctx.chained.height as i64);
    let script_sig = block
        .transactions
        .first()
        .and_then(|cb| cb.inputs.first())
        .map(|i| i.script_sig.as_bytes())
        .unwrap_or_default();
    if !script_sig.starts_with(&expected) {
        return Err(reject(
            ErrorCode::BadCoinbaseHeight,
            "block height mismatch in coinbase",
        ));
    }
    Ok(())
}

pub(crate) fn block_size(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    let max = env.params.options.max_block_base_size as usize;
    if block.transactions.is_empty()
        || block.transactions.len() > max
        || block.base_size() > max
    {
        return Err(reject(ErrorCode::BadBlockLength, "size limits failed"));
    }
    Ok(())
}

pub(crate) fn ensure_coinbase(
    _env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    match block.transactions.first() {
        Some(tx) if tx.is_coinbase() => {}
        _ => return Err(reject(ErrorCode::BadCoinbaseMissing, "first tx is not coinbase")),
    }
    if block.transactions[1..].iter().any(Transaction::is_coinbase) {
        return Err(reject(ErrorCode::BadMultipleCoinbase, "more than one coinbase"));
    }
    Ok(())
}

pub(crate) fn check_transactions(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    for tx in &block.transactions {
        check_transaction(env.params, tx)?;
    }
    Ok(())
}

/// Checks that need nothing but the transaction itself.
pub fn check_transaction(
    params: &ConsensusParams,
    tx: &Transaction,
) -> Result<(), ValidationError> {
    if tx.inputs.is_empty() {
        return Err(reject(ErrorCode::BadTransactionNoInput, ""));
    }
    if tx.outputs.is_empty() {
        return Err(reject(ErrorCode::BadTransactionNoOutput, ""));
    }
    if tx.serialized_size() > params.options.max_tx_size as usize {
        return Err(reject(ErrorCode::BadTransactionOversize, ""));
    }

    let mut total: i64 = 0;
    for out in &tx.outputs {
        if out.value < 0 {
            return Err(reject(ErrorCode::BadTransactionNegativeOutput, ""));
        }
        if out.value > params.max_money {
            return Err(reject(ErrorCode::BadTransactionTooLargeOutput, ""));
        }
        total = total.saturating_add(out.value);
        if !params.money_range(total) {
            return Err(reject(ErrorCode::BadTransactionTooLargeTotalOutput, ""));
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Err(reject(ErrorCode::BadTransactionDuplicateInputs, ""));
        }
    }

    if tx.is_coinbase() {
        let len = tx.inputs[0].script_sig.len();
        if !(2..=100).contains(&len) {
            return Err(reject(ErrorCode::BadCoinbaseSize, ""));
        }
    } else if tx.inputs.iter().any(|i| i.prevout.is_null()) {
        return Err(reject(ErrorCode::BadTransactionNullPrevout, ""));
    }
    Ok(())
}

pub(crate) fn check_sigops(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    let mut sigops = 0u64;
    for tx in &block.transactions {
        sigops += legacy_sigop_count(tx) as u64;
    }
    if sigops * env.params.options.witness_scale_factor as u64
        > env.params.options.max_block_sigops_cost
    {
        return Err(reject(ErrorCode::BadBlockSigOps, "out-of-bounds SigOpCount"));
    }
    Ok(())
}

pub fn legacy_sigop_count(tx: &Transaction) -> usize {
    let ins: usize = tx.inputs.iter().map(|i| i.script_sig.sigop_count(false)).sum();
    let outs: usize = tx
        .outputs
        .iter()
        .map(|o| o.script_pubkey.sigop_count(false))
        .sum();
    ins + outs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks;
    use crate::script::Script;
    use crate::tx::{OutPoint, TxIn, TxOut};

    fn tx(inputs: Vec<OutPoint>, values: &[i64]) -> Transaction {
        Transaction::new(
            1,
            inputs.into_iter().map(|p| TxIn::new(p, Script::empty())).collect(),
            values
                .iter()
                .map(|v| TxOut::new(*v, Script::p2pkh([1u8; 20])))
                .collect(),
            0,
        )
    }

    fn code(r: Result<(), ValidationError>) -> ErrorCode {
        r.unwrap_err().code().expect("consensus error")
    }

    #[test]
    fn check_transaction_rejections() {
        let p = networks::regtest_params();
        let op = OutPoint::new([1u8; 32], 0);

        assert_eq!(
            code(check_transaction(&p, &tx(vec![], &[1]))),
            ErrorCode::BadTransactionNoInput
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![op], &[]))),
            ErrorCode::BadTransactionNoOutput
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![op], &[-1]))),
            ErrorCode::BadTransactionNegativeOutput
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![op], &[p.max_money + 1]))),
            ErrorCode::BadTransactionTooLargeOutput
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![op], &[p.max_money, 1]))),
            ErrorCode::BadTransactionTooLargeTotalOutput
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![op, op], &[1]))),
            ErrorCode::BadTransactionDuplicateInputs
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![op, OutPoint::NULL], &[1]))),
            ErrorCode::BadTransactionNullPrevout
        );
        assert_eq!(
            code(check_transaction(&p, &tx(vec![OutPoint::NULL], &[1]))),
            ErrorCode::BadCoinbaseSize
        );
        assert!(check_transaction(&p, &tx(vec![op], &[1, 2])).is_ok());
    }

    #[test]
    fn legacy_sigops_count_inputs_and_outputs() {
        let mut t = tx(vec![OutPoint::new([1u8; 32], 0)], &[1]);
        t.outputs[0].script_pubkey = Script::p2pk(&[2u8; 33]);
        t.inputs[0].script_sig = Script(vec![crate::script::opcodes::OP_CHECKMULTISIG]);
        assert_eq!(legacy_sigop_count(&t), 21);
    }
}
