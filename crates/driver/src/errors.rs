use proposer_clients::{ChainError, ConfigError, ProverError, TxError};
use proposer_db_types::{ProofRequestId, StoreError};
use thiserror::Error;

/// Errors surfaced by a pipeline stage or the startup sequence.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("prover: {0}")]
    Prover(#[from] ProverError),

    #[error("tx: {0}")]
    Tx(#[from] TxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An aggregation row reached the proving stage without its L1 checkpoint.
    #[error("aggregation request {0} has no L1 checkpoint")]
    MissingCheckpoint(ProofRequestId),

    #[error("proof request {0} is COMPLETE without a proof")]
    MissingProof(ProofRequestId),

    #[error("L1 head {0} has no parent to checkpoint")]
    NoCheckpointCandidate(u64),

    #[error("invalid driver config: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,
}

impl DriverError {
    /// Whether the proving service could not be reached or answered with a transport error.
    pub fn is_prover_unreachable(&self) -> bool {
        matches!(
            self,
            DriverError::Prover(ProverError::Http(_) | ProverError::Status { .. })
        )
    }
}
