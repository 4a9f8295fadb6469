//! Configuration for the proposer.
//!
//! Loaded from a TOML file whose sections all default, then overridden by command-line
//! arguments. The signing key never lives in the file; `rpc.signer_key_env` names the
//! environment variable holding it.

use std::{fs, path::PathBuf, time::Duration};

use alloy_primitives::Address;
use anyhow::{bail, Context};
use proposer_db_store_sqlite::SqliteStoreConfig;
use proposer_driver::DriverConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_L1_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_L2_NODE_RPC_URL: &str = "http://localhost:9545";
const DEFAULT_SIGNER_KEY_ENV: &str = "PROPOSER_PRIVATE_KEY";
const DEFAULT_PROVER_URL: &str = "http://localhost:3000";

const DEFAULT_MAX_BLOCK_RANGE_PER_SPAN_PROOF: u64 = 300;
const DEFAULT_MAX_CONCURRENT_WITNESS_GEN: u64 = 5;
const DEFAULT_MAX_CONCURRENT_PROOF_REQUESTS: u64 = 40;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;
const DEFAULT_WITNESSGEN_TIMEOUT_SECS: u64 = 20 * 60;
const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 4 * 60 * 60;
const DEFAULT_PROOF_REQUEST_TIMEOUT_SECS: u64 = 20 * 60;
const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TX_RECEIPT_TIMEOUT_SECS: u64 = 5 * 60;

const DEFAULT_VALIDATE_CONFIG_ATTEMPTS: u32 = 5;
const DEFAULT_VALIDATE_CONFIG_BACKOFF_MS: u64 = 1_000;

const DEFAULT_DATADIR: &str = "./data";

/// Proposer configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct ProposerConfig {
    #[serde(default)]
    pub(crate) rpc: RpcConfig,

    #[serde(default)]
    pub(crate) prover: ProverConfig,

    /// Pipeline sizing.
    #[serde(default)]
    pub(crate) driver: DriverSection,

    #[serde(default)]
    pub(crate) timing: TimingConfig,

    #[serde(default)]
    pub(crate) retry: RetryConfig,

    #[serde(default)]
    pub(crate) db: DbConfig,

    #[serde(default)]
    pub(crate) logging: LoggingConfig,
}

/// Endpoints and the settlement contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RpcConfig {
    #[serde(default = "default_values::l1_rpc_url")]
    pub(crate) l1_rpc_url: String,

    /// Rollup node (op-node) JSON-RPC endpoint.
    #[serde(default = "default_values::l2_node_rpc_url")]
    pub(crate) l2_node_rpc_url: String,

    /// L2 output oracle the proposals go to.
    #[serde(default)]
    pub(crate) l2oo_address: Address,

    /// Name of the environment variable holding the hex signing key.
    #[serde(default = "default_values::signer_key_env")]
    pub(crate) signer_key_env: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            l1_rpc_url: default_values::l1_rpc_url(),
            l2_node_rpc_url: default_values::l2_node_rpc_url(),
            l2oo_address: Address::ZERO,
            signer_key_env: default_values::signer_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProverConfig {
    #[serde(default = "default_values::prover_url")]
    pub(crate) url: String,

    /// Request mock proofs instead of real ones.
    #[serde(default)]
    pub(crate) mock: bool,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            url: default_values::prover_url(),
            mock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DriverSection {
    #[serde(default = "default_values::max_block_range_per_span_proof")]
    pub(crate) max_block_range_per_span_proof: u64,

    #[serde(default = "default_values::max_concurrent_witness_gen")]
    pub(crate) max_concurrent_witness_gen: u64,

    #[serde(default = "default_values::max_concurrent_proof_requests")]
    pub(crate) max_concurrent_proof_requests: u64,

    /// Prove up to the safe head instead of the finalized head.
    #[serde(default)]
    pub(crate) allow_non_finalized: bool,

    #[serde(default)]
    pub(crate) wait_node_sync: bool,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            max_block_range_per_span_proof: DEFAULT_MAX_BLOCK_RANGE_PER_SPAN_PROOF,
            max_concurrent_witness_gen: DEFAULT_MAX_CONCURRENT_WITNESS_GEN,
            max_concurrent_proof_requests: DEFAULT_MAX_CONCURRENT_PROOF_REQUESTS,
            allow_non_finalized: false,
            wait_node_sync: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TimingConfig {
    #[serde(default = "default_values::poll_interval_secs")]
    pub(crate) poll_interval_secs: u64,

    #[serde(default = "default_values::witnessgen_timeout_secs")]
    pub(crate) witnessgen_timeout_secs: u64,

    #[serde(default = "default_values::proof_timeout_secs")]
    pub(crate) proof_timeout_secs: u64,

    /// HTTP timeout of proof requests, which block through witness generation.
    #[serde(default = "default_values::proof_request_timeout_secs")]
    pub(crate) proof_request_timeout_secs: u64,

    #[serde(default = "default_values::status_timeout_secs")]
    pub(crate) status_timeout_secs: u64,

    #[serde(default = "default_values::network_timeout_secs")]
    pub(crate) network_timeout_secs: u64,

    #[serde(default = "default_values::tx_receipt_timeout_secs")]
    pub(crate) tx_receipt_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            witnessgen_timeout_secs: DEFAULT_WITNESSGEN_TIMEOUT_SECS,
            proof_timeout_secs: DEFAULT_PROOF_TIMEOUT_SECS,
            proof_request_timeout_secs: DEFAULT_PROOF_REQUEST_TIMEOUT_SECS,
            status_timeout_secs: DEFAULT_STATUS_TIMEOUT_SECS,
            network_timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
            tx_receipt_timeout_secs: DEFAULT_TX_RECEIPT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RetryConfig {
    /// Halve range requests the proving program failed to execute.
    #[serde(default)]
    pub(crate) split_on_execution_failure: bool,

    #[serde(default = "default_values::validate_config_attempts")]
    pub(crate) validate_config_attempts: u32,

    #[serde(default = "default_values::validate_config_backoff_ms")]
    pub(crate) validate_config_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            split_on_execution_failure: false,
            validate_config_attempts: DEFAULT_VALIDATE_CONFIG_ATTEMPTS,
            validate_config_backoff_ms: DEFAULT_VALIDATE_CONFIG_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DbConfig {
    /// Directory; the database lives at `<path>/<l2_chain_id>/proofs.db`.
    #[serde(default = "default_values::datadir")]
    pub(crate) path: PathBuf,

    #[serde(default)]
    pub(crate) l2_chain_id: u64,

    /// Keep the database of a previous run instead of deleting it on startup.
    #[serde(default)]
    pub(crate) use_cached_db: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_values::datadir(),
            l2_chain_id: 0,
            use_cached_db: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct LoggingConfig {
    /// JSON lines on stdout.
    #[serde(default)]
    pub(crate) json: bool,

    /// Also write daily rolling log files here.
    #[serde(default)]
    pub(crate) file_dir: Option<PathBuf>,

    #[serde(default)]
    pub(crate) otlp_url: Option<String>,
}

/// Default value functions to make [`serde`] happy and make the [`super`] code mess easy to read.
mod default_values {
    use super::*;

    pub(super) fn l1_rpc_url() -> String {
        DEFAULT_L1_RPC_URL.to_string()
    }

    pub(super) fn l2_node_rpc_url() -> String {
        DEFAULT_L2_NODE_RPC_URL.to_string()
    }

    pub(super) fn signer_key_env() -> String {
        DEFAULT_SIGNER_KEY_ENV.to_string()
    }

    pub(super) fn prover_url() -> String {
        DEFAULT_PROVER_URL.to_string()
    }

    pub(super) fn max_block_range_per_span_proof() -> u64 {
        DEFAULT_MAX_BLOCK_RANGE_PER_SPAN_PROOF
    }

    pub(super) fn max_concurrent_witness_gen() -> u64 {
        DEFAULT_MAX_CONCURRENT_WITNESS_GEN
    }

    pub(super) fn max_concurrent_proof_requests() -> u64 {
        DEFAULT_MAX_CONCURRENT_PROOF_REQUESTS
    }

    pub(super) fn poll_interval_secs() -> u64 {
        DEFAULT_POLL_INTERVAL_SECS
    }

    pub(super) fn witnessgen_timeout_secs() -> u64 {
        DEFAULT_WITNESSGEN_TIMEOUT_SECS
    }

    pub(super) fn proof_timeout_secs() -> u64 {
        DEFAULT_PROOF_TIMEOUT_SECS
    }

    pub(super) fn proof_request_timeout_secs() -> u64 {
        DEFAULT_PROOF_REQUEST_TIMEOUT_SECS
    }

    pub(super) fn status_timeout_secs() -> u64 {
        DEFAULT_STATUS_TIMEOUT_SECS
    }

    pub(super) fn network_timeout_secs() -> u64 {
        DEFAULT_NETWORK_TIMEOUT_SECS
    }

    pub(super) fn tx_receipt_timeout_secs() -> u64 {
        DEFAULT_TX_RECEIPT_TIMEOUT_SECS
    }

    pub(super) fn validate_config_attempts() -> u32 {
        DEFAULT_VALIDATE_CONFIG_ATTEMPTS
    }

    pub(super) fn validate_config_backoff_ms() -> u64 {
        DEFAULT_VALIDATE_CONFIG_BACKOFF_MS
    }

    pub(super) fn datadir() -> PathBuf {
        PathBuf::from(DEFAULT_DATADIR)
    }
}

impl ProposerConfig {
    /// Loads configuration from a TOML file.
    pub(crate) fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Checks what serde cannot.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.l2oo_address == Address::ZERO {
            bail!("rpc.l2oo_address must be set");
        }
        self.driver_config()
            .validate()
            .context("invalid [driver] or [timing] section")?;
        Ok(())
    }

    pub(crate) fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            poll_interval: Duration::from_secs(self.timing.poll_interval_secs),
            max_range_width: self.driver.max_block_range_per_span_proof,
            max_concurrent_witness_gen: self.driver.max_concurrent_witness_gen,
            max_concurrent_proof_requests: self.driver.max_concurrent_proof_requests,
            proof_timeout: Duration::from_secs(self.timing.proof_timeout_secs),
            allow_non_finalized: self.driver.allow_non_finalized,
            wait_node_sync: self.driver.wait_node_sync,
            mock: self.prover.mock,
            validate_config_attempts: self.retry.validate_config_attempts,
            validate_config_backoff: Duration::from_millis(self.retry.validate_config_backoff_ms),
        }
    }

    pub(crate) fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig::on_disk(&self.db.path, self.db.l2_chain_id)
            .with_use_cached_db(self.db.use_cached_db)
            .with_witnessgen_timeout(Duration::from_secs(self.timing.witnessgen_timeout_secs))
    }

    pub(crate) fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.status_timeout_secs)
    }

    pub(crate) fn proof_request_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.proof_request_timeout_secs)
    }

    pub(crate) fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.network_timeout_secs)
    }

    pub(crate) fn tx_receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.tx_receipt_timeout_secs)
    }
}
