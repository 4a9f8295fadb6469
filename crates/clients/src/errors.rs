use alloy_primitives::B256;
use thiserror::Error;

/// Errors from reading the rollup node, L1 or the settlement contract.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Network-related error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// RPC call failed.
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// The node answered for a different block than requested.
    #[error("output requested for block {expected}, node returned block {actual}")]
    OutputBlockMismatch { expected: u64, actual: u64 },

    #[error("unsupported output root version {0}")]
    UnsupportedOutputVersion(B256),

    #[error("L1 block {0} not found")]
    MissingL1Block(u64),
}

impl ChainError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates an RPC error.
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }
}

/// Errors from the proving service.
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("proving service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decoding proving service response: {0}")]
    Decode(String),

    /// The response parsed but does not make sense.
    #[error("invalid proving service response: {0}")]
    Invalid(String),
}

/// Errors from submitting L1 transactions.
#[derive(Debug, Clone, Error)]
pub enum TxError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("waiting for receipt: {0}")]
    Receipt(String),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    #[error("reading L1 head: {0}")]
    Head(String),
}

/// The proving service does not agree with the on-chain verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("on-chain configuration mismatch: {} invalid", .invalid.join(", "))]
pub struct ConfigError {
    pub invalid: Vec<&'static str>,
}
