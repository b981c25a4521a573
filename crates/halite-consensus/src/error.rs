use core::fmt;

use thiserror::Error;

use crate::hash::Hash256;
use crate::tx::OutPoint;

/// Stable consensus rejection codes. The string form is part of the network's
/// observable behavior (peers log and compare it) and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Malformed,

    BadVersion,
    TimeTooOld,
    TimeTooNew,
    BadDiffBits,
    HighHash,

    BadMerkleRoot,
    BadTransactionDuplicate,
    BadBlockSignature,

    BadTransactionNonFinal,
    BadCoinbaseHeight,
    BadBlockLength,
    BadCoinbaseMissing,
    BadMultipleCoinbase,
    BadTransactionNoInput,
    BadTransactionNoOutput,
    BadTransactionOversize,
    BadTransactionNegativeOutput,
    BadTransactionTooLargeOutput,
    BadTransactionTooLargeTotalOutput,
    BadTransactionDuplicateInputs,
    BadCoinbaseSize,
    BadTransactionNullPrevout,
    BadBlockSigOps,

    BadTransactionBip30,
    BadTransactionMissingInput,
    BadTransactionPrematureCoinbaseSpending,
    BadTransactionPrematureCoinstakeSpending,
    BadTransactionInputValueOutOfRange,
    BadTransactionInBelowOut,
    BadTransactionFeeOutOfRange,
    BadCoinbaseAmount,

    BadStakeBlock,
    BadMultipleCoinstake,
    BadCoinstakeTime,
    ProofOfWorkTooHigh,
    StakeTimeViolation,
    StakeHashInvalidTarget,
    InvalidStakeDepth,
    ReadTxPrevFailed,
    BadCoinstakeAmount,
    BadCoinstakeRewardSplit,
    BadColdstakeInputs,
    BadColdstakeOutputs,
    BadColdstakeAmount,

    MaxReorgViolation,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Malformed => "bad-encoding",

            ErrorCode::BadVersion => "bad-version",
            ErrorCode::TimeTooOld => "time-too-old",
            ErrorCode::TimeTooNew => "time-too-new",
            ErrorCode::BadDiffBits => "bad-diffbits",
            ErrorCode::HighHash => "high-hash",

            ErrorCode::BadMerkleRoot => "bad-txnmrklroot",
            ErrorCode::BadTransactionDuplicate => "bad-txns-duplicate",
            ErrorCode::BadBlockSignature => "bad-block-signature",

            ErrorCode::BadTransactionNonFinal => "bad-txns-nonfinal",
            ErrorCode::BadCoinbaseHeight => "bad-cb-height",
            ErrorCode::BadBlockLength => "bad-blk-length",
            ErrorCode::BadCoinbaseMissing => "bad-cb-missing",
            ErrorCode::BadMultipleCoinbase => "bad-cb-multiple",
            ErrorCode::BadTransactionNoInput => "bad-txns-vin-empty",
            ErrorCode::BadTransactionNoOutput => "bad-txns-vout-empty",
            ErrorCode::BadTransactionOversize => "bad-txns-oversize",
            ErrorCode::BadTransactionNegativeOutput => "bad-txns-vout-negative",
            ErrorCode::BadTransactionTooLargeOutput => "bad-txns-vout-toolarge",
            ErrorCode::BadTransactionTooLargeTotalOutput => "bad-txns-txouttotal-toolarge",
            ErrorCode::BadTransactionDuplicateInputs => "bad-txns-inputs-duplicate",
            ErrorCode::BadCoinbaseSize => "bad-cb-length",
            ErrorCode::BadTransactionNullPrevout => "bad-txns-prevout-null",
            ErrorCode::BadBlockSigOps => "bad-blk-sigops",

            ErrorCode::BadTransactionBip30 => "bad-txns-BIP30",
            ErrorCode::BadTransactionMissingInput => "bad-txns-inputs-missingorspent",
            ErrorCode::BadTransactionPrematureCoinbaseSpending => {
                "bad-txns-premature-spend-of-coinbase"
            }
            ErrorCode::BadTransactionPrematureCoinstakeSpending => {
                "bad-txns-premature-spend-of-coinstake"
            }
            ErrorCode::BadTransactionInputValueOutOfRange => "bad-txns-inputvalues-outofrange",
            ErrorCode::BadTransactionInBelowOut => "bad-txns-in-belowout",
            ErrorCode::BadTransactionFeeOutOfRange => "bad-txns-fee-outofrange",
            ErrorCode::BadCoinbaseAmount => "bad-cb-amount",

            ErrorCode::BadStakeBlock => "bad-stake-block",
            ErrorCode::BadMultipleCoinstake => "bad-cs-multiple",
            ErrorCode::BadCoinstakeTime => "bad-cs-time",
            ErrorCode::ProofOfWorkTooHigh => "proof-of-work-too-high",
            ErrorCode::StakeTimeViolation => "stake-time-violation",
            ErrorCode::StakeHashInvalidTarget => "stake-hash-invalid-target",
            ErrorCode::InvalidStakeDepth => "invalid-stake-depth",
            ErrorCode::ReadTxPrevFailed => "read-txPrev-failed",
            ErrorCode::BadCoinstakeAmount => "bad-cs-amount",
            ErrorCode::BadCoinstakeRewardSplit => "bad-cs-reward-split",
            ErrorCode::BadColdstakeInputs => "bad-coldstake-inputs",
            ErrorCode::BadColdstakeOutputs => "bad-coldstake-outputs",
            ErrorCode::BadColdstakeAmount => "bad-coldstake-amount",

            ErrorCode::MaxReorgViolation => "max-reorg-violation",
        }
    }
}

/// A data-dependent rejection. The block is invalid; persisted state is untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusError {
    pub code: ErrorCode,
    pub msg: &'static str,
}

impl ConsensusError {
    pub fn new(code: ErrorCode, msg: &'static str) -> Self {
        Self { code, msg }
    }
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msg.is_empty() {
            write!(f, "{}", self.code.as_str())
        } else {
            write!(f, "{}: {}", self.code.as_str(), self.msg)
        }
    }
}

impl std::error::Error for ConsensusError {}

impl From<ErrorCode> for ConsensusError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, "")
    }
}

/// Engine and storage faults. These signal node-health problems (I/O failure,
/// broken invariants) rather than an invalid block.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("coin database tip mismatch: expected {expected}, found {found}")]
    TipMismatch { expected: String, found: String },

    #[error("coin database has no tip; initialize it with the genesis block first")]
    Uninitialized,

    #[error("rewind data missing for height {0}")]
    MissingRewindData(u32),

    #[error("ancestor at height {height} missing below {from}")]
    AncestorMissing { height: u32, from: String },

    #[error("parent header {0} is not in the chain index")]
    UnknownParent(String),

    #[error("duplicate outpoint {0} in bulk load")]
    DuplicateOutPoint(OutPoint),

    #[error("outpoint {0} already spent in working set")]
    DoubleSpend(OutPoint),

    #[error("outpoint {0} missing from working set")]
    MissingOutput(OutPoint),

    #[error("rule ordering violated: {0}")]
    RuleOrder(&'static str),

    #[error("stake data unavailable for block {0}")]
    MissingStake(String),

    #[error("fork point {0} is not on the committed chain")]
    ForkPointNotFound(String),
}

impl EngineError {
    pub fn tip_mismatch(expected: &Hash256, found: Option<&Hash256>) -> Self {
        EngineError::TipMismatch {
            expected: crate::hash::to_hex(expected),
            found: found
                .map(crate::hash::to_hex)
                .unwrap_or_else(|| "<none>".to_string()),
        }
    }
}

/// Outcome of a failed validation attempt: either the block is invalid or the
/// engine could not finish evaluating it.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("consensus: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("engine: {0}")]
    Engine(#[from] EngineError),
}

impl ValidationError {
    /// The consensus code when this is a rejection, `None` for engine faults.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ValidationError::Consensus(e) => Some(e.code),
            ValidationError::Engine(_) => None,
        }
    }

    pub fn is_consensus(&self) -> bool {
        matches!(self, ValidationError::Consensus(_))
    }
}

impl From<ErrorCode> for ValidationError {
    fn from(code: ErrorCode) -> Self {
        ValidationError::Consensus(code.into())
    }
}

pub(crate) fn reject(code: ErrorCode, msg: &'static str) -> ValidationError {
    ValidationError::Consensus(ConsensusError::new(code, msg))
}
