use std::{path::PathBuf, time::Duration};

pub(crate) const DEFAULT_WITNESSGEN_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub(crate) const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(15);

/// File name of the proof database inside its chain directory.
pub const DB_FILE_NAME: &str = "proofs.db";

/// Where the store lives and how it treats stale work.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Database file, or `None` for a private in-memory database.
    pub path: Option<PathBuf>,
    /// Keep an existing database file instead of starting from an empty one.
    pub use_cached_db: bool,
    /// Age after which a WITNESSGEN row without a prover id counts as stalled.
    pub witnessgen_timeout: Duration,
    pub busy_timeout: Duration,
}

impl SqliteStoreConfig {
    /// On-disk store at `<datadir>/<l2_chain_id>/proofs.db`.
    pub fn on_disk(datadir: impl Into<PathBuf>, l2_chain_id: u64) -> Self {
        Self {
            path: Some(db_file_path(datadir, l2_chain_id)),
            use_cached_db: false,
            witnessgen_timeout: DEFAULT_WITNESSGEN_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            use_cached_db: false,
            witnessgen_timeout: DEFAULT_WITNESSGEN_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_use_cached_db(mut self, use_cached_db: bool) -> Self {
        self.use_cached_db = use_cached_db;
        self
    }

    pub fn with_witnessgen_timeout(mut self, timeout: Duration) -> Self {
        self.witnessgen_timeout = timeout;
        self
    }
}

pub fn db_file_path(datadir: impl Into<PathBuf>, l2_chain_id: u64) -> PathBuf {
    let mut path = datadir.into();
    path.push(l2_chain_id.to_string());
    path.push(DB_FILE_NAME);
    path
}
