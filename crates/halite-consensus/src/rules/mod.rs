//! Consensus rule registry.
//!
//! A network registers an ordered list of rules per validation stage. The
//! order is part of the network's identity: later rules read context that
//! earlier ones populate (deployment flags, the loaded coin view).

pub mod full;
pub mod header;
pub mod integrity;
pub mod partial;
pub mod pos;

use std::sync::Arc;

use crate::block::Block;
use crate::chain::ChainedHeader;
use crate::coinview::CoinDatabase;
use crate::deployments::{DeploymentFlags, NodeDeployments};
use crate::error::{EngineError, ValidationError};
use crate::params::ConsensusParams;
use crate::stake::{BlockStake, StakeChain};
use crate::utxo_set::UnspentOutputSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Header,
    Integrity,
    Partial,
    Full,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Header => "header",
            Stage::Integrity => "integrity",
            Stage::Partial => "partial",
            Stage::Full => "full",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleId {
    HeaderTimeChecks,
    CheckDifficultyPow,
    ActivationVersion,

    BlockMerkleRoot,
    PosBlockSignature,

    SetActivationDeploymentsPartial,
    TransactionLocktime,
    CoinbaseHeight,
    BlockSize,
    EnsureCoinbase,
    CheckTransaction,
    CheckSigOps,
    CheckLastPowBlock,
    PosCoinstake,
    CheckDifficultyHybrid,

    SetActivationDeploymentsFull,
    LoadCoinview,
    Coinview,
    PosColdStaking,
    PosCoinview,
    SaveCoinview,
}

pub type RuleFn = fn(&RuleEnv<'_>, &mut RuleContext<'_>) -> Result<(), ValidationError>;

impl RuleId {
    pub fn stage(self) -> Stage {
        use RuleId::*;
        match self {
            HeaderTimeChecks | CheckDifficultyPow | ActivationVersion => Stage::Header,
            BlockMerkleRoot | PosBlockSignature => Stage::Integrity,
            SetActivationDeploymentsPartial
            | TransactionLocktime
            | CoinbaseHeight
            | BlockSize
            | EnsureCoinbase
            | CheckTransaction
            | CheckSigOps
            | CheckLastPowBlock
            | PosCoinstake
            | CheckDifficultyHybrid => Stage::Partial,
            SetActivationDeploymentsFull | LoadCoinview | Coinview | PosColdStaking
            | PosCoinview | SaveCoinview => Stage::Full,
        }
    }

    fn check(self) -> RuleFn {
        use RuleId::*;
        match self {
            HeaderTimeChecks => header::header_time_checks,
            CheckDifficultyPow => header::check_difficulty_pow,
            ActivationVersion => header::activation_version,

            BlockMerkleRoot => integrity::block_merkle_root,
            PosBlockSignature => integrity::pos_block_signature,

            SetActivationDeploymentsPartial => partial::set_activation_deployments,
            TransactionLocktime => partial::transaction_locktime,
            CoinbaseHeight => partial::coinbase_height,
            BlockSize => partial::block_size,
            EnsureCoinbase => partial::ensure_coinbase,
            CheckTransaction => partial::check_transactions,
            CheckSigOps => partial::check_sigops,
            CheckLastPowBlock => pos::check_last_pow_block,
            PosCoinstake => pos::pos_coinstake,
            CheckDifficultyHybrid => pos::check_difficulty_hybrid,

            SetActivationDeploymentsFull => full::set_activation_deployments,
            LoadCoinview => full::load_coinview,
            Coinview => full::coinview,
            PosColdStaking => pos::pos_cold_staking,
            PosCoinview => pos::pos_coinview,
            SaveCoinview => full::save_coinview,
        }
    }
}

#[derive(Clone, Copy)]
pub struct Rule {
    pub id: RuleId,
    pub stage: Stage,
    pub check: RuleFn,
}

impl core::fmt::Debug for Rule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .finish()
    }
}

/// Ordered rules per stage. Built once; never mutated afterwards.
#[derive(Clone, Debug, Default)]
pub struct ConsensusRules {
    header: Vec<Rule>,
    integrity: Vec<Rule>,
    partial: Vec<Rule>,
    full: Vec<Rule>,
}

impl ConsensusRules {
    pub fn builder() -> ConsensusRulesBuilder {
        ConsensusRulesBuilder::default()
    }

    pub fn stage(&self, stage: Stage) -> &[Rule] {
        match stage {
            Stage::Header => &self.header,
            Stage::Integrity => &self.integrity,
            Stage::Partial => &self.partial,
            Stage::Full => &self.full,
        }
    }

    pub fn ids(&self, stage: Stage) -> Vec<RuleId> {
        self.stage(stage).iter().map(|r| r.id).collect()
    }
}

#[derive(Default)]
pub struct ConsensusRulesBuilder {
    rules: ConsensusRules,
}

impl ConsensusRulesBuilder {
    pub fn register(mut self, id: RuleId) -> Self {
        let rule = Rule {
            id,
            stage: id.stage(),
            check: id.check(),
        };
        match rule.stage {
            Stage::Header => self.rules.header.push(rule),
            Stage::Integrity => self.rules.integrity.push(rule),
            Stage::Partial => self.rules.partial.push(rule),
            Stage::Full => self.rules.full.push(rule),
        }
        self
    }

    pub fn register_all(self, ids: &[RuleId]) -> Self {
        ids.iter().fold(self, |b, id| b.register(*id))
    }

    /// Rejects registrations that cannot work in any order: a commit that is
    /// not the last full rule, or coin-view consumers without a loader ahead
    /// of them.
    pub fn build(self) -> Result<ConsensusRules, EngineError> {
        let full = self.rules.ids(Stage::Full);
        if let Some(pos) = full.iter().position(|id| *id == RuleId::SaveCoinview) {
            if pos != full.len() - 1 {
                return Err(EngineError::RuleOrder("SaveCoinview must be the last full rule"));
            }
        }
        let load = full.iter().position(|id| *id == RuleId::LoadCoinview);
        for (i, id) in full.iter().enumerate() {
            let needs_view = matches!(
                id,
                RuleId::Coinview
                    | RuleId::PosCoinview
                    | RuleId::PosColdStaking
                    | RuleId::SaveCoinview
            );
            if needs_view && load.map_or(true, |l| l > i) {
                return Err(EngineError::RuleOrder("coin view consumer before LoadCoinview"));
            }
        }
        Ok(self.rules)
    }
}

/// Read-only services available to every rule.
pub struct RuleEnv<'a> {
    pub params: &'a ConsensusParams,
    pub coin_db: &'a dyn CoinDatabase,
    pub stake_chain: Option<&'a dyn StakeChain>,
    pub deployments: &'a NodeDeployments,
    /// Network-adjusted current time.
    pub now: u32,
}

impl<'a> RuleEnv<'a> {
    pub fn stake_chain(&self) -> Result<&'a dyn StakeChain, ValidationError> {
        self.stake_chain
            .ok_or(EngineError::RuleOrder("stake rule registered without a stake chain").into())
    }
}

/// Per-attempt validation state passed from rule to rule.
pub struct RuleContext<'a> {
    pub chained: Arc<ChainedHeader>,
    pub block: Option<&'a Block>,
    pub flags: Option<DeploymentFlags>,
    pub coin_view: Option<UnspentOutputSet>,
    pub stake: Option<BlockStake>,
    pub committed: bool,
}

impl<'a> RuleContext<'a> {
    pub fn new(chained: Arc<ChainedHeader>, block: Option<&'a Block>) -> Self {
        Self {
            chained,
            block,
            flags: None,
            coin_view: None,
            stake: None,
            committed: false,
        }
    }

    pub fn block(&self) -> Result<&'a Block, ValidationError> {
        self.block
            .ok_or(EngineError::RuleOrder("block rule run without a block").into())
    }

    pub fn flags(&self) -> Result<DeploymentFlags, ValidationError> {
        self.flags
            .ok_or(EngineError::RuleOrder("deployment flags read before they were set").into())
    }

    pub fn coin_view(&mut self) -> Result<&mut UnspentOutputSet, ValidationError> {
        self.coin_view
            .as_mut()
            .ok_or(EngineError::RuleOrder("coin view used before it was loaded").into())
    }

    pub fn height(&self) -> u32 {
        self.chained.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_groups_by_stage_in_registration_order() {
        let rules = ConsensusRules::builder()
            .register(RuleId::BlockSize)
            .register(RuleId::HeaderTimeChecks)
            .register(RuleId::EnsureCoinbase)
            .build()
            .expect("build");
        assert_eq!(rules.ids(Stage::Header), vec![RuleId::HeaderTimeChecks]);
        assert_eq!(
            rules.ids(Stage::Partial),
            vec![RuleId::BlockSize, RuleId::EnsureCoinbase]
        );
        assert!(rules.stage(Stage::Full).is_empty());
    }

    #[test]
    fn save_must_be_last() {
        let err = ConsensusRules::builder()
            .register_all(&[RuleId::LoadCoinview, RuleId::SaveCoinview, RuleId::Coinview])
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::RuleOrder(_)));
    }

    #[test]
    fn coin_view_consumers_need_a_loader() {
        let err = ConsensusRules::builder()
            .register_all(&[RuleId::Coinview, RuleId::LoadCoinview, RuleId::SaveCoinview])
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::RuleOrder(_)));
    }
}
