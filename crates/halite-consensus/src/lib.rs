pub mod block;
pub mod chain;
pub mod coins;
pub mod coinview;
pub mod compactsize;
pub mod deployments;
pub mod engine;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod networks;
pub mod params;
pub mod retarget;
pub mod rules;
pub mod script;
pub mod stake;
pub mod stake_chain;
pub mod target;
pub mod tx;
pub mod utxo_set;
pub mod wire_read;

pub use block::{Block, BlockHeader, BLOCK_HEADER_BYTES};
pub use chain::{ChainIndex, ChainedHeader};
pub use coins::{Coins, HashHeightPair, RewindData, UnspentOutput};
pub use coinview::{CoinDatabase, MemoryCoinDatabase};
pub use engine::ConsensusEngine;
pub use error::{ConsensusError, EngineError, ErrorCode, ValidationError};
pub use hash::Hash256;
pub use networks::Network;
pub use params::{ConsensusOptions, ConsensusParams, COIN};
pub use rules::{ConsensusRules, RuleId, Stage};
pub use stake::{BlockStake, StakeChain};
pub use target::{CompactError, CompactTarget, Target};
pub use tx::{OutPoint, Transaction, TxIn, TxOut};
pub use utxo_set::UnspentOutputSet;
