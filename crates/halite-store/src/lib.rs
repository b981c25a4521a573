//! `halite-store`: persistent coin database backends.
//!
//! Both backends implement `halite_consensus::coinview::CoinDatabase` over the
//! same four logical tables (`tip_hash`, `coins`, `rewind`, `stake`):
//! - [`RedbCoinDatabase`]: redb B-tree, one write transaction per commit.
//! - `FjallCoinDatabase` (feature `fjall`): LSM partitions, atomic batches.

pub mod keys;
pub mod redb;

#[cfg(feature = "fjall")]
pub mod fjall;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use halite_consensus::coinview::CoinDatabase;
use halite_consensus::EngineError;
use thiserror::Error;

pub use crate::redb::RedbCoinDatabase;

#[cfg(feature = "fjall")]
pub use crate::fjall::FjallCoinDatabase;

/// File (redb) or directory (fjall) name under the data directory.
pub const REDB_FILE: &str = "coins.redb";
pub const FJALL_DIR: &str = "coins.fjall";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown backend {0:?} (expected \"redb\" or \"fjall\")")]
    UnknownBackend(String),

    #[error("backend {0} is not compiled in; rebuild with --features {0}")]
    Disabled(&'static str),

    #[error("create data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Redb,
    Fjall,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Redb => "redb",
            Backend::Fjall => "fjall",
        }
    }
}

impl FromStr for Backend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redb" => Ok(Backend::Redb),
            "fjall" => Ok(Backend::Fjall),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

/// Opens (creating if needed) the coin database for `backend` under `datadir`.
pub fn open_coin_db(
    backend: Backend,
    datadir: &Path,
) -> Result<Arc<dyn CoinDatabase>, StoreError> {
    std::fs::create_dir_all(datadir)?;
    match backend {
        Backend::Redb => Ok(Arc::new(RedbCoinDatabase::open(&datadir.join(REDB_FILE))?)),
        #[cfg(feature = "fjall")]
        Backend::Fjall => Ok(Arc::new(FjallCoinDatabase::open(datadir.join(FJALL_DIR))?)),
        #[cfg(not(feature = "fjall"))]
        Backend::Fjall => Err(StoreError::Disabled("fjall")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("redb".parse::<Backend>().expect("redb"), Backend::Redb);
        assert_eq!("fjall".parse::<Backend>().expect("fjall"), Backend::Fjall);
        let err = "rocksdb".parse::<Backend>().unwrap_err();
        assert!(err.to_string().contains("rocksdb"));
        assert_eq!(Backend::default().as_str(), "redb");
    }

    #[test]
    fn open_creates_the_data_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let datadir = dir.path().join("nested").join("regtest");
        let db = open_coin_db(Backend::Redb, &datadir).expect("open");
        assert!(datadir.join(REDB_FILE).exists());
        assert_eq!(db.get_tip_hash().expect("tip"), None);
    }

    #[cfg(not(feature = "fjall"))]
    #[test]
    fn disabled_backend_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = open_coin_db(Backend::Fjall, dir.path()).err().expect("disabled");
        assert!(matches!(err, StoreError::Disabled("fjall")));
    }
}
