use thiserror::Error;

use crate::types::{ProofEvent, ProofRequestId, ProofStatus};

/// A lifecycle event that is not allowed from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to a proof request in {from}")]
pub struct InvalidTransition {
    pub from: ProofStatus,
    pub event: ProofEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("proof request {0} does not exist")]
    NotFound(ProofRequestId),

    #[error("proof request {0}: {1}")]
    InvalidTransition(ProofRequestId, InvalidTransition),

    #[error("proof request {0} cannot move to {1} through update_status")]
    UnsupportedTarget(ProofRequestId, ProofStatus),

    #[error("aggregation request {0} has no L1 checkpoint")]
    MissingL1Checkpoint(ProofRequestId),

    #[error("no UNREQ aggregation request spans [{start}, {end}]")]
    NoPendingAgg { start: u64, end: u64 },

    #[error("proof request {0} already stores a proof")]
    ProofAlreadyStored(ProofRequestId),

    #[error("refusing to store an empty proof for request {0}")]
    EmptyProof(ProofRequestId),

    #[error("aggregation request starting at {start} already exists (id {existing})")]
    DuplicateAgg {
        start: u64,
        existing: ProofRequestId,
    },

    #[error("range request {id} overlaps completed range request {existing}")]
    OverlappingRange {
        id: ProofRequestId,
        existing: ProofRequestId,
    },

    #[error("proof request {0} is not FAILED and cannot be retried")]
    RetryOfNonFailed(ProofRequestId),

    #[error("retry range [{start}, {end}] is outside of proof request {parent}")]
    RetryOutOfBounds {
        parent: ProofRequestId,
        start: u64,
        end: u64,
    },

    #[error("invalid block range [{start}, {end}]")]
    InvalidRange { start: u64, end: u64 },

    /// A completed range proof chain skips blocks.
    #[error("gap in completed range proofs: expected block {expected}, found {found}")]
    Gap { expected: u64, found: u64 },

    /// Completed range proofs stop before the requested end.
    #[error("completed range proofs cover up to {covered_to}, need {end}")]
    Incomplete { covered_to: u64, end: u64 },

    #[error("decode: {0}")]
    Decode(String),

    #[error("store is closed")]
    Closed,

    #[error("backend: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
