//! Built-in network tables: parameters, genesis block and rule registration.

use std::sync::Arc;

use num_bigint::BigUint;

use crate::block::{Block, BlockHeader};
use crate::hash::Hash256;
use crate::params::{
    Bip9Deployment, BuriedDeployments, ConsensusOptions, ConsensusParams, DeploymentId, COIN,
};
use crate::rules::{ConsensusRules, RuleId};
use crate::script::{push_data, Script};
use crate::target::{CompactTarget, Target};
use crate::tx::{OutPoint, Transaction, TxIn, TxOut};

const GENESIS_PUBKEY: [u8; 65] = [
    0x04, 0x67, 0x8a, 0xfd, 0xb0, 0xfe, 0x55, 0x48, 0x27, 0x19, 0x67, 0xf1, 0xa6, 0x71, 0x30,
    0xb7, 0x10, 0x5c, 0xd6, 0xa8, 0x28, 0xe0, 0x39, 0x09, 0xa6, 0x79, 0x62, 0xe0, 0xea, 0x1f,
    0x61, 0xde, 0xb6, 0x49, 0xf6, 0xbc, 0x3f, 0x4c, 0xef, 0x38, 0xc4, 0xf3, 0x55, 0x04, 0xe5,
    0x1e, 0xc1, 0x12, 0xde, 0x5c, 0x38, 0x4d, 0xf7, 0xba, 0x0b, 0x8d, 0x57, 0x8a, 0x4c, 0x70,
    0x2b, 0x6b, 0xf1, 0x1d, 0x5f,
];
const GENESIS_MESSAGE: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";
const STAKE_GENESIS_MESSAGE: &str =
    "http://www.theonion.com/article/olympics-head-priestess-slits-throat-official-rio--53466";

pub const POW_HEADER_RULES: &[RuleId] = &[
    RuleId::HeaderTimeChecks,
    RuleId::CheckDifficultyPow,
    RuleId::ActivationVersion,
];
pub const POS_HEADER_RULES: &[RuleId] = &[RuleId::HeaderTimeChecks, RuleId::ActivationVersion];

const COMMON_PARTIAL_RULES: &[RuleId] = &[
    RuleId::SetActivationDeploymentsPartial,
    RuleId::TransactionLocktime,
    RuleId::CoinbaseHeight,
    RuleId::BlockSize,
    RuleId::EnsureCoinbase,
    RuleId::CheckTransaction,
    RuleId::CheckSigOps,
];

/// A chain the engine can validate.
#[derive(Debug)]
pub struct Network {
    pub name: &'static str,
    pub params: ConsensusParams,
    pub genesis: Block,
    pub rules: ConsensusRules,
}

impl Network {
    pub fn main() -> Arc<Self> {
        Self::build(
            "main",
            main_params(),
            pow_genesis(1_231_006_505, 2_083_236_893, 0x1d00_ffff),
            pow_rules(),
        )
    }

    pub fn testnet() -> Arc<Self> {
        Self::build(
            "test",
            testnet_params(),
            pow_genesis(1_296_688_602, 414_098_458, 0x1d00_ffff),
            pow_rules(),
        )
    }

    pub fn regtest() -> Arc<Self> {
        Self::build(
            "regtest",
            regtest_params(),
            pow_genesis(1_296_688_602, 2, 0x207f_ffff),
            pow_rules(),
        )
    }

    pub fn stake_main() -> Arc<Self> {
        Self::build(
            "stake-main",
            stake_main_params(),
            stake_genesis(1_470_467_000, 1_831_645, 0x1e0f_ffff),
            pos_rules(),
        )
    }

    pub fn stake_regtest() -> Arc<Self> {
        Self::build(
            "stake-regtest",
            stake_regtest_params(),
            stake_genesis(1_470_467_000, 2_433_759, 0x207f_ffff),
            pos_rules(),
        )
    }

    pub fn by_name(name: &str) -> Option<Arc<Self>> {
        match name {
            "main" => Some(Self::main()),
            "test" | "testnet" => Some(Self::testnet()),
            "regtest" => Some(Self::regtest()),
            "stake-main" => Some(Self::stake_main()),
            "stake-regtest" => Some(Self::stake_regtest()),
            _ => None,
        }
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis.hash()
    }

    fn build(
        name: &'static str,
        params: ConsensusParams,
        genesis: Block,
        rules: ConsensusRules,
    ) -> Arc<Self> {
        Arc::new(Network {
            name,
            params,
            genesis,
            rules,
        })
    }
}

pub fn pow_rules() -> ConsensusRules {
    ConsensusRules::builder()
        .register_all(POW_HEADER_RULES)
        .register(RuleId::BlockMerkleRoot)
        .register_all(COMMON_PARTIAL_RULES)
        .register_all(&[
            RuleId::SetActivationDeploymentsFull,
            RuleId::LoadCoinview,
            RuleId::Coinview,
            RuleId::SaveCoinview,
        ])
        .build()
        .expect("built-in proof-of-work rules are well ordered")
}

pub fn pos_rules() -> ConsensusRules {
    ConsensusRules::builder()
        .register_all(POS_HEADER_RULES)
        .register_all(&[RuleId::BlockMerkleRoot, RuleId::PosBlockSignature])
        .register_all(COMMON_PARTIAL_RULES)
        .register_all(&[
            RuleId::CheckLastPowBlock,
            RuleId::PosCoinstake,
            RuleId::CheckDifficultyHybrid,
        ])
        .register_all(&[
            RuleId::SetActivationDeploymentsFull,
            RuleId::LoadCoinview,
            RuleId::PosColdStaking,
            RuleId::PosCoinview,
            RuleId::SaveCoinview,
        ])
        .build()
        .expect("built-in proof-of-stake rules are well ordered")
}

// ---------------------------------------------------------------------------
// Genesis blocks
// ---------------------------------------------------------------------------

fn genesis_block(coinbase: Transaction, time: u32, nonce: u32, bits: u32) -> Block {
    let mut block = Block::new(
        BlockHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            time,
            bits: CompactTarget(bits),
            nonce,
        },
        vec![coinbase],
    );
    block.update_merkle_root();
    block
}

fn genesis_script_sig(message: &str) -> Script {
    let mut s = Vec::with_capacity(8 + message.len());
    push_data(&mut s, &0x1d00_ffffu32.to_le_bytes());
    push_data(&mut s, &[4]);
    push_data(&mut s, message.as_bytes());
    Script(s)
}

fn pow_genesis(time: u32, nonce: u32, bits: u32) -> Block {
    let coinbase = Transaction::new(
        1,
        vec![TxIn::new(OutPoint::NULL, genesis_script_sig(GENESIS_MESSAGE))],
        vec![TxOut::new(50 * COIN, Script::p2pk(&GENESIS_PUBKEY))],
        0,
    );
    genesis_block(coinbase, time, nonce, bits)
}

fn stake_genesis(time: u32, nonce: u32, bits: u32) -> Block {
    let coinbase = Transaction::new(
        1,
        vec![TxIn::new(OutPoint::NULL, genesis_script_sig(STAKE_GENESIS_MESSAGE))],
        vec![TxOut::new(0, Script::empty())],
        0,
    );
    genesis_block(coinbase, time, nonce, bits)
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn limit(mantissa: u32, shift: usize) -> Target {
    Target::from_biguint(BigUint::from(mantissa) << shift)
}

pub fn main_params() -> ConsensusParams {
    ConsensusParams {
        options: ConsensusOptions::default(),

        pow_limit: limit(0xffff, 208),
        pow_target_timespan: 14 * 24 * 60 * 60,
        pow_target_spacing: 10 * 60,
        pow_allow_min_difficulty_blocks: false,
        pow_no_retargeting: false,
        minimum_chain_work: None,

        coinbase_maturity: 100,
        max_money: 21_000_000 * COIN,
        subsidy_halving_interval: 210_000,
        proof_of_work_reward: 50 * COIN,
        premine_height: 0,
        premine_reward: 0,

        buried: BuriedDeployments {
            bip34: 227_931,
            bip65: 388_381,
            bip66: 363_725,
        },
        miner_confirmation_window: 2016,
        rule_change_activation_threshold: 1916,
        deployments: [
            Some(Bip9Deployment {
                bit: 0,
                start_time: 1_462_060_800,
                timeout: 1_493_596_800,
            }),
            Some(Bip9Deployment {
                bit: 1,
                start_time: 1_479_168_000,
                timeout: 1_510_704_000,
            }),
            None,
        ],

        max_reorg_length: 0,
        max_future_drift: 2 * 60 * 60,

        is_proof_of_stake: false,
        pos_limit: None,
        pos_target_timespan: 0,
        proof_of_stake_reward: 0,
        last_pow_block: None,
        stake_min_confirmations: 0,
        stake_timestamp_mask: 0,
        reward_split: None,
    }
}

pub fn testnet_params() -> ConsensusParams {
    let mut p = main_params();
    p.pow_allow_min_difficulty_blocks = true;
    p.buried = BuriedDeployments {
        bip34: 21_111,
        bip65: 581_885,
        bip66: 330_776,
    };
    p.rule_change_activation_threshold = 1512;
    p.deployments[DeploymentId::Csv.index()] = Some(Bip9Deployment {
        bit: 0,
        start_time: 1_456_790_400,
        timeout: 1_493_596_800,
    });
    p.deployments[DeploymentId::Segwit.index()] = Some(Bip9Deployment {
        bit: 1,
        start_time: 1_462_060_800,
        timeout: 1_493_596_800,
    });
    p
}

pub fn regtest_params() -> ConsensusParams {
    let mut p = main_params();
    p.pow_limit = limit(0x7f_ffff, 232);
    p.pow_allow_min_difficulty_blocks = true;
    p.pow_no_retargeting = true;
    p.subsidy_halving_interval = 150;
    p.buried = BuriedDeployments {
        bip34: 500,
        bip65: 1351,
        bip66: 1251,
    };
    p.miner_confirmation_window = 144;
    p.rule_change_activation_threshold = 108;
    p.deployments = [
        Some(Bip9Deployment {
            bit: 0,
            start_time: 0,
            timeout: Bip9Deployment::NO_TIMEOUT,
        }),
        Some(Bip9Deployment {
            bit: 1,
            start_time: 0,
            timeout: Bip9Deployment::NO_TIMEOUT,
        }),
        None,
    ];
    p
}

pub fn stake_main_params() -> ConsensusParams {
    let pos_limit = limit(0x0f_ffff, 216);
    ConsensusParams {
        options: ConsensusOptions::default(),

        pow_limit: pos_limit.clone(),
        pow_target_timespan: 14 * 24 * 60 * 60,
        pow_target_spacing: 64,
        pow_allow_min_difficulty_blocks: false,
        pow_no_retargeting: false,
        minimum_chain_work: None,

        coinbase_maturity: 50,
        max_money: 20_000_000_000 * COIN,
        subsidy_halving_interval: 0,
        proof_of_work_reward: 4 * COIN,
        premine_height: 2,
        premine_reward: 98_000_000 * COIN,

        buried: BuriedDeployments::default(),
        miner_confirmation_window: 2016,
        rule_change_activation_threshold: 1916,
        deployments: [
            None,
            None,
            Some(Bip9Deployment {
                bit: 2,
                start_time: 1_561_939_200,
                timeout: 1_593_561_600,
            }),
        ],

        max_reorg_length: 500,
        max_future_drift: 2 * 60 * 60,

        is_proof_of_stake: true,
        pos_limit: Some(pos_limit),
        pos_target_timespan: 16 * 60,
        proof_of_stake_reward: COIN,
        last_pow_block: Some(12_500),
        stake_min_confirmations: 500,
        stake_timestamp_mask: 0x0f,
        reward_split: None,
    }
}

pub fn stake_regtest_params() -> ConsensusParams {
    let mut p = stake_main_params();
    let regtest_limit = limit(0x7f_ffff, 232);
    p.pow_limit = regtest_limit.clone();
    p.pos_limit = Some(regtest_limit);
    p.pow_allow_min_difficulty_blocks = true;
    p.pow_no_retargeting = true;
    p.coinbase_maturity = 10;
    p.stake_min_confirmations = 10;
    p.max_reorg_length = 0;
    p.deployments[DeploymentId::ColdStaking.index()] = Some(Bip9Deployment::always_active(2));
    p
}
