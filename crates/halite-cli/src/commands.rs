//! Subcommand implementations. Each returns a serializable report; `main`
//! prints it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use halite_consensus::hash::to_hex;
use halite_consensus::{
    CoinDatabase, Coins, ConsensusEngine, EngineError, HashHeightPair, Network, OutPoint,
    RewindData,
};
use halite_store::{open_coin_db, Backend, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Resolved `--network`, `--datadir` and `--backend` flags.
pub struct Context {
    pub network: Arc<Network>,
    pub datadir: PathBuf,
    pub backend: Backend,
}

impl Context {
    pub fn new(network: &str, datadir: &Path, backend: Backend) -> Result<Self, CliError> {
        let network =
            Network::by_name(network).ok_or_else(|| CliError::UnknownNetwork(network.to_string()))?;
        // One subdirectory per network so chains never share a database.
        let datadir = datadir.join(network.name);
        Ok(Self {
            network,
            datadir,
            backend,
        })
    }

    fn open(&self) -> Result<Arc<dyn CoinDatabase>, CliError> {
        Ok(open_coin_db(self.backend, &self.datadir)?)
    }

    fn engine(&self) -> Result<ConsensusEngine, CliError> {
        Ok(ConsensusEngine::new(Arc::clone(&self.network), self.open()?))
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct TipReport {
    pub hash: String,
    pub height: u32,
}

impl From<HashHeightPair> for TipReport {
    fn from(t: HashHeightPair) -> Self {
        Self {
            hash: to_hex(&t.hash),
            height: t.height,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CoinReport {
    pub txid: String,
    pub vout: u32,
    pub value: i64,
    pub height: u32,
    pub coinbase: bool,
    pub coinstake: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,
    pub script_pubkey: String,
}

impl CoinReport {
    fn new(op: &OutPoint, c: &Coins) -> Self {
        Self {
            txid: to_hex(&op.txid),
            vout: op.n,
            value: c.tx_out.value,
            height: c.height,
            coinbase: c.is_coinbase,
            coinstake: c.is_coinstake,
            time: c.time,
            script_pubkey: hex::encode(c.tx_out.script_pubkey.as_bytes()),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CoinsReport {
    pub count: usize,
    pub total_value: i64,
    pub coins: Vec<CoinReport>,
}

#[derive(Serialize, Debug)]
pub struct RewindReport {
    pub height: u32,
    pub previous_tip: Option<TipReport>,
    pub outputs_to_remove: Vec<String>,
    pub outputs_to_restore: Vec<CoinReport>,
}

impl RewindReport {
    fn new(height: u32, rd: &RewindData) -> Self {
        Self {
            height,
            previous_tip: rd.previous_tip.map(TipReport::from),
            outputs_to_remove: rd
                .outputs_to_remove
                .iter()
                .map(|op| op.to_string())
                .collect(),
            outputs_to_restore: rd
                .outputs_to_restore
                .iter()
                .map(|(op, c)| CoinReport::new(op, c))
                .collect(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct InfoReport {
    pub network: &'static str,
    pub backend: &'static str,
    pub genesis: String,
    pub proof_of_stake: bool,
    pub pow_limit_bits: String,
    pub pow_target_spacing: u32,
    pub coinbase_maturity: u32,
    pub max_reorg_length: u32,
    pub tip: Option<TipReport>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn init(ctx: &Context) -> Result<TipReport, CliError> {
    let engine = ctx.engine()?;
    let tip = engine.initialize()?;
    info!(network = ctx.network.name, datadir = %ctx.datadir.display(), "initialized");
    Ok(tip.into())
}

pub fn tip(ctx: &Context) -> Result<TipReport, CliError> {
    let db = ctx.open()?;
    let tip = db.get_tip_hash()?.ok_or(EngineError::Uninitialized)?;
    Ok(tip.into())
}

pub fn coins(ctx: &Context, limit: Option<usize>) -> Result<CoinsReport, CliError> {
    let all = ctx.open()?.all_coins()?;
    let total_value = all.iter().map(|(_, c)| c.tx_out.value).sum();
    let count = all.len();
    let coins = all
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(op, c)| CoinReport::new(op, c))
        .collect();
    Ok(CoinsReport {
        count,
        total_value,
        coins,
    })
}

pub fn rewind_data(ctx: &Context, height: u32) -> Result<Option<RewindReport>, CliError> {
    let rd = ctx.open()?.get_rewind_data(height)?;
    Ok(rd.map(|rd| RewindReport::new(height, &rd)))
}

/// Undoes `blocks` blocks from the tip, stopping with an error at the first
/// height without a rewind record.
pub fn rewind(ctx: &Context, blocks: u32) -> Result<TipReport, CliError> {
    let engine = ctx.engine()?;
    let mut tip = engine.tip()?;
    for _ in 0..blocks {
        tip = engine.rewind()?;
    }
    Ok(tip.into())
}

pub fn info(ctx: &Context) -> Result<InfoReport, CliError> {
    let params = &ctx.network.params;
    let tip = ctx.open()?.get_tip_hash()?;
    Ok(InfoReport {
        network: ctx.network.name,
        backend: ctx.backend.as_str(),
        genesis: to_hex(&ctx.network.genesis_hash()),
        proof_of_stake: params.is_proof_of_stake,
        pow_limit_bits: format!("{:08x}", params.pow_limit.to_compact().0),
        pow_target_spacing: params.pow_target_spacing,
        coinbase_maturity: params.coinbase_maturity,
        max_reorg_length: params.max_reorg_length,
        tip: tip.map(TipReport::from),
    })
}
