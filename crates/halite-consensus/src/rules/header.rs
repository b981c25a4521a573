//! Header-only rules. Registered order: time checks, difficulty, then version.

use tracing::debug;

use super::{RuleContext, RuleEnv};
use crate::error::{reject, ErrorCode, ValidationError};
use crate::retarget::get_work_required;
use crate::target::Target;

pub(crate) fn header_time_checks(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let Some(prev) = ctx.chained.previous() else {
        return Ok(());
    };
    let time = ctx.chained.header.time;
    if time <= prev.median_time_past() {
        return Err(reject(ErrorCode::TimeTooOld, "block time at or before median time past"));
    }
    if time as u64 > env.now as u64 + env.params.max_future_drift as u64 {
        return Err(reject(ErrorCode::TimeTooNew, "block time too far in the future"));
    }
    Ok(())
}

pub(crate) fn check_difficulty_pow(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let header = &ctx.chained.header;
    let expected = get_work_required(&ctx.chained, env.params)?;
    if header.bits != expected.to_compact() {
        debug!(
            height = ctx.chained.height,
            got = %header.bits,
            expected = %expected.to_compact(),
            "unexpected difficulty bits"
        );
        return Err(reject(ErrorCode::BadDiffBits, "incorrect proof of work"));
    }
    check_proof_of_work(ctx)
}

pub(crate) fn check_proof_of_work(ctx: &RuleContext<'_>) -> Result<(), ValidationError> {
    let header = &ctx.chained.header;
    let target = Target::from_compact(header.bits)
        .map_err(|_| reject(ErrorCode::BadDiffBits, "bits do not decode"))?;
    if !target.is_met_by(&ctx.chained.hash) {
        return Err(reject(ErrorCode::HighHash, "proof of work failed"));
    }
    Ok(())
}

/// Versions below 2, 3 and 4 are obsolete once BIP34, BIP66 and BIP65 are
/// buried.
pub(crate) fn activation_version(
    env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let height = ctx.chained.height;
    let version = ctx.chained.header.version;
    let b = &env.params.buried;
    if (version < 2 && height >= b.bip34)
        || (version < 3 && height >= b.bip66)
        || (version < 4 && height >= b.bip65)
    {
        return Err(reject(ErrorCode::BadVersion, "rejected obsolete block version"));
    }
    Ok(())
}
