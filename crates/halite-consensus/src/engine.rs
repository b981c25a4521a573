//! Validation pipeline driver.
//!
//! Stages run in order: header, integrity, partial, full. Only the full stage
//! touches the coin database, and it runs under a single commit lock together
//! with `rewind`, so there is one writer at a time.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::chain::ChainedHeader;
use crate::coins::HashHeightPair;
use crate::coinview::CoinDatabase;
use crate::deployments::NodeDeployments;
use crate::error::{EngineError, ErrorCode, ValidationError};
use crate::hash::to_hex;
use crate::networks::Network;
use crate::params::ConsensusParams;
use crate::rules::{RuleContext, RuleEnv, Stage};
use crate::stake::StakeChain;
use crate::stake_chain::StakeChainStore;

type Clock = Box<dyn Fn() -> u32 + Send + Sync>;

pub struct ConsensusEngine {
    network: Arc<Network>,
    coin_db: Arc<dyn CoinDatabase>,
    stake_chain: Option<Arc<StakeChainStore>>,
    deployments: NodeDeployments,
    commit_lock: Mutex<()>,
    clock: Clock,
}

fn system_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

impl ConsensusEngine {
    pub fn new(network: Arc<Network>, coin_db: Arc<dyn CoinDatabase>) -> Self {
        let stake_chain = network.params.is_proof_of_stake.then(|| {
            Arc::new(StakeChainStore::new(
                Arc::clone(&coin_db),
                network.genesis_hash(),
            ))
        });
        Self {
            network,
            coin_db,
            stake_chain,
            deployments: NodeDeployments::new(),
            commit_lock: Mutex::new(()),
            clock: Box::new(system_time),
        }
    }

    /// Replaces the wall clock used by the future-time header check.
    pub fn with_clock(mut self, clock: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.network.params
    }

    pub fn coin_db(&self) -> &Arc<dyn CoinDatabase> {
        &self.coin_db
    }

    pub fn stake_chain(&self) -> Option<&Arc<StakeChainStore>> {
        self.stake_chain.as_ref()
    }

    pub fn deployments(&self) -> &NodeDeployments {
        &self.deployments
    }

    /// Commits the genesis block on an empty database and returns the tip.
    pub fn initialize(&self) -> Result<HashHeightPair, EngineError> {
        let _guard = self.commit_lock.lock();
        let genesis = self.network.genesis_hash();
        self.coin_db.initialize(&genesis)?;
        let tip = self.coin_db.get_tip_hash()?.ok_or(EngineError::Uninitialized)?;
        info!(
            network = self.network.name,
            height = tip.height,
            tip = %to_hex(&tip.hash),
            "coin database ready"
        );
        Ok(tip)
    }

    pub fn tip(&self) -> Result<HashHeightPair, EngineError> {
        self.coin_db.get_tip_hash()?.ok_or(EngineError::Uninitialized)
    }

    /// Warms the stake cache from the database for the chain ending at `tip`.
    pub fn load_stake_chain(&self, tip: &ChainedHeader) -> Result<(), EngineError> {
        match &self.stake_chain {
            Some(sc) => sc.load(tip),
            None => Ok(()),
        }
    }

    /// Persists every cached stake entry.
    pub fn flush(&self) -> Result<(), EngineError> {
        match &self.stake_chain {
            Some(sc) => sc.flush(true),
            None => Ok(()),
        }
    }

    fn env(&self) -> RuleEnv<'_> {
        RuleEnv {
            params: &self.network.params,
            coin_db: self.coin_db.as_ref(),
            stake_chain: self.stake_chain.as_deref().map(|s| s as &dyn StakeChain),
            deployments: &self.deployments,
            now: (self.clock)(),
        }
    }

    fn run_stage(
        &self,
        stage: Stage,
        env: &RuleEnv<'_>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ValidationError> {
        for rule in self.network.rules.stage(stage) {
            if let Err(e) = (rule.check)(env, ctx) {
                debug!(
                    stage = stage.as_str(),
                    rule = ?rule.id,
                    height = ctx.chained.height,
                    hash = %to_hex(&ctx.chained.hash),
                    error = %e,
                    "rule rejected block"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub fn validate_header(&self, chained: &Arc<ChainedHeader>) -> Result<(), ValidationError> {
        let env = self.env();
        let mut ctx = RuleContext::new(Arc::clone(chained), None);
        self.run_stage(Stage::Header, &env, &mut ctx)
    }

    /// Integrity and context-free checks. Touches no persistent state.
    pub fn partial_validation(
        &self,
        chained: &Arc<ChainedHeader>,
        block: &Block,
    ) -> Result<(), ValidationError> {
        let env = self.env();
        let mut ctx = RuleContext::new(Arc::clone(chained), Some(block));
        self.run_stage(Stage::Integrity, &env, &mut ctx)?;
        self.run_stage(Stage::Partial, &env, &mut ctx)
    }

    /// Coin view checks and the commit. A rejection at any rule leaves the
    /// database at its previous tip.
    pub fn full_validation(
        &self,
        chained: &Arc<ChainedHeader>,
        block: &Block,
    ) -> Result<(), ValidationError> {
        let _guard = self.commit_lock.lock();
        let env = self.env();
        let mut ctx = RuleContext::new(Arc::clone(chained), Some(block));
        self.run_stage(Stage::Full, &env, &mut ctx)?;
        if !ctx.committed {
            return Err(EngineError::RuleOrder("full stage finished without a commit").into());
        }

        if let Some(sc) = &self.stake_chain {
            let stake = ctx
                .stake
                .take()
                .ok_or(EngineError::RuleOrder("stake network committed without a stake record"))?;
            sc.set(chained, stake)?;
            sc.flush(false)?;
        }
        Ok(())
    }

    /// Runs every stage for `block` and commits it.
    pub fn validate_block(
        &self,
        chained: &Arc<ChainedHeader>,
        block: &Block,
    ) -> Result<(), ValidationError> {
        self.validate_header(chained)?;
        self.partial_validation(chained, block)?;
        self.full_validation(chained, block)
    }

    /// Undoes the block at the tip.
    pub fn rewind(&self) -> Result<HashHeightPair, EngineError> {
        let _guard = self.commit_lock.lock();
        let tip = self.coin_db.rewind()?;
        info!(height = tip.height, tip = %to_hex(&tip.hash), "rewound coin database");
        Ok(tip)
    }

    // -----------------------------------------------------------------------
    // Reorganization
    // -----------------------------------------------------------------------

    /// Switches the coin database from `old_tip` to the branch ending with
    /// the last entry of `new_branch`. The branch starts right after the fork
    /// point and is in ascending height order.
    ///
    /// On a rejected branch block the database stays at the last block that
    /// connected; the caller decides whether to reconnect the old branch.
    pub fn reorganize(
        &self,
        old_tip: &Arc<ChainedHeader>,
        new_branch: &[(Arc<ChainedHeader>, &Block)],
    ) -> Result<HashHeightPair, ValidationError> {
        let Some((first, _)) = new_branch.first() else {
            return Ok(self.tip()?);
        };
        let fork = first
            .previous()
            .ok_or_else(|| EngineError::ForkPointNotFound(to_hex(&first.hash)))?;
        match old_tip.get_ancestor(fork.height) {
            Some(a) if a.hash == fork.hash => {}
            _ => return Err(EngineError::ForkPointNotFound(to_hex(&fork.hash)).into()),
        }
        for pair in new_branch.windows(2) {
            let linked = pair[1].0.previous().is_some_and(|p| p.hash == pair[0].0.hash);
            if !linked {
                let parent = to_hex(&pair[1].0.header.prev_block_hash);
                return Err(EngineError::UnknownParent(parent).into());
            }
        }

        let tip = self.tip()?;
        if tip.hash != old_tip.hash {
            return Err(EngineError::tip_mismatch(&old_tip.hash, Some(&tip.hash)).into());
        }

        let depth = old_tip.height - fork.height;
        let max = self.network.params.max_reorg_length;
        if max != 0 && depth > max {
            warn!(depth, max, "reorganization exceeds the maximum length");
            return Err(ErrorCode::MaxReorgViolation.into());
        }

        info!(
            fork = fork.height,
            disconnect = depth,
            connect = new_branch.len(),
            "reorganizing"
        );
        for _ in 0..depth {
            self.rewind()?;
        }
        for (chained, block) in new_branch {
            if let Err(e) = self.validate_block(chained, block) {
                warn!(
                    height = chained.height,
                    hash = %to_hex(&chained.hash),
                    error = %e,
                    "reorganization stopped at rejected block"
                );
                return Err(e);
            }
        }
        Ok(self.tip()?)
    }
}
