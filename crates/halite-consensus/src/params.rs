use crate::script::Script;
use crate::target::Target;

pub const COIN: i64 = 100_000_000;

/// Block-content limits.
#[derive(Clone, Debug)]
pub struct ConsensusOptions {
    /// Serialized size limit, excluding the block signature.
    pub max_block_base_size: u32,
    pub max_block_sigops_cost: u64,
    pub witness_scale_factor: u32,
    pub max_tx_size: u32,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            max_block_base_size: 1_000_000,
            max_block_sigops_cost: 80_000,
            witness_scale_factor: 4,
            max_tx_size: 1_000_000,
        }
    }
}

impl ConsensusOptions {
    pub fn max_block_sigops(&self) -> u64 {
        self.max_block_sigops_cost / self.witness_scale_factor as u64
    }
}

/// Heights at which soft forks that predate version-bits signalling became
/// mandatory.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuriedDeployments {
    pub bip34: u32,
    pub bip65: u32,
    pub bip66: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeploymentId {
    Csv,
    Segwit,
    ColdStaking,
}

impl DeploymentId {
    pub const ALL: [DeploymentId; 3] = [
        DeploymentId::Csv,
        DeploymentId::Segwit,
        DeploymentId::ColdStaking,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentId::Csv => "csv",
            DeploymentId::Segwit => "segwit",
            DeploymentId::ColdStaking => "coldstaking",
        }
    }
}

/// BIP9 version-bits deployment. Start and timeout compare against the
/// median time past at each window boundary.
#[derive(Clone, Debug)]
pub struct Bip9Deployment {
    pub bit: u8,
    pub start_time: i64,
    pub timeout: i64,
}

impl Bip9Deployment {
    pub const ALWAYS_ACTIVE: i64 = -1;
    pub const NO_TIMEOUT: i64 = i64::MAX;

    pub fn always_active(bit: u8) -> Self {
        Self {
            bit,
            start_time: Self::ALWAYS_ACTIVE,
            timeout: Self::NO_TIMEOUT,
        }
    }

    pub fn mask(&self) -> u32 {
        1u32 << self.bit
    }
}

/// Network-mandated share of the block reward paid to a fixed script.
#[derive(Clone, Debug)]
pub struct RewardSplit {
    pub percentage: u8,
    pub script: Script,
}

impl RewardSplit {
    pub fn required_amount(&self, reward: i64) -> i64 {
        reward * self.percentage as i64 / 100
    }
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub options: ConsensusOptions,

    pub pow_limit: Target,
    pub pow_target_timespan: u32,
    pub pow_target_spacing: u32,
    pub pow_allow_min_difficulty_blocks: bool,
    pub pow_no_retargeting: bool,
    pub minimum_chain_work: Option<Target>,

    pub coinbase_maturity: u32,
    pub max_money: i64,
    pub subsidy_halving_interval: u32,
    pub proof_of_work_reward: i64,
    pub premine_height: u32,
    pub premine_reward: i64,

    pub buried: BuriedDeployments,
    pub miner_confirmation_window: u32,
    pub rule_change_activation_threshold: u32,
    pub deployments: [Option<Bip9Deployment>; 3],

    /// Zero means unlimited.
    pub max_reorg_length: u32,
    pub max_future_drift: u32,

    pub is_proof_of_stake: bool,
    pub pos_limit: Option<Target>,
    pub pos_target_timespan: u32,
    pub proof_of_stake_reward: i64,
    pub last_pow_block: Option<u32>,
    pub stake_min_confirmations: u32,
    pub stake_timestamp_mask: u32,
    pub reward_split: Option<RewardSplit>,
}

impl ConsensusParams {
    pub fn difficulty_adjustment_interval(&self) -> u32 {
        self.pow_target_timespan / self.pow_target_spacing
    }

    pub fn deployment(&self, id: DeploymentId) -> Option<&Bip9Deployment> {
        self.deployments[id.index()].as_ref()
    }

    pub fn is_pow_block_allowed(&self, height: u32) -> bool {
        match self.last_pow_block {
            Some(last) => height <= last,
            None => true,
        }
    }

    /// Schedule reward for a proof-of-work block at `height`, excluding fees.
    pub fn proof_of_work_reward_at(&self, height: u32) -> i64 {
        if self.premine_reward > 0 && height == self.premine_height {
            return self.premine_reward;
        }
        if self.subsidy_halving_interval == 0 {
            return self.proof_of_work_reward;
        }
        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 64 {
            return 0;
        }
        self.proof_of_work_reward >> halvings
    }

    pub fn proof_of_stake_reward_at(&self, height: u32) -> i64 {
        if self.premine_reward > 0 && height == self.premine_height {
            return self.premine_reward;
        }
        self.proof_of_stake_reward
    }

    pub fn money_range(&self, v: i64) -> bool {
        (0..=self.max_money).contains(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks;

    #[test]
    fn halving_schedule() {
        let p = networks::main_params();
        assert_eq!(p.proof_of_work_reward_at(1), 50 * COIN);
        assert_eq!(p.proof_of_work_reward_at(209_999), 50 * COIN);
        assert_eq!(p.proof_of_work_reward_at(210_000), 25 * COIN);
        assert_eq!(p.proof_of_work_reward_at(210_000 * 64), 0);
    }

    #[test]
    fn regtest_halves_every_150_blocks() {
        let p = networks::regtest_params();
        assert_eq!(p.proof_of_work_reward_at(149), 50 * COIN);
        assert_eq!(p.proof_of_work_reward_at(150), 25 * COIN);
    }

    #[test]
    fn premine_and_last_pow_block() {
        let p = networks::stake_main_params();
        assert_eq!(p.proof_of_work_reward_at(p.premine_height), p.premine_reward);
        let last = p.last_pow_block.expect("pos network");
        assert!(p.is_pow_block_allowed(last));
        assert!(!p.is_pow_block_allowed(last + 1));
    }
}
