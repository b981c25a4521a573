use super::{RuleContext, RuleEnv};
use crate::error::{reject, ErrorCode, ValidationError};
use crate::stake::check_block_signature;

pub(crate) fn block_merkle_root(
    _env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    let computed = block.merkle_root();
    if computed.root != block.header.merkle_root {
        return Err(reject(ErrorCode::BadMerkleRoot, "hashMerkleRoot mismatch"));
    }
    if computed.mutated {
        return Err(reject(
            ErrorCode::BadTransactionDuplicate,
            "duplicate transaction",
        ));
    }
    Ok(())
}

pub(crate) fn pos_block_signature(
    _env: &RuleEnv<'_>,
    ctx: &mut RuleContext<'_>,
) -> Result<(), ValidationError> {
    let block = ctx.block()?;
    if !check_block_signature(block) {
        return Err(reject(ErrorCode::BadBlockSignature, "bad block signature"));
    }
    Ok(())
}
