//! Retry planning for failed proof requests.

use std::fmt::Debug;

use proposer_clients::UnclaimDescription;
use proposer_db_types::{
    BlockRange, InvalidTransition, ProofKind, ProofRequest, ProofRequestId, ProofStatus,
    ProofStore, StoreError,
};
use tracing::{info, warn};

use crate::errors::DriverError;

/// Why a proof request attempt ended without a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Stuck in witness generation past the stall threshold.
    WitnessgenStalled,
    /// The proof request to the proving service failed.
    DispatchFailed,
    /// The proving network gave the request up.
    Unclaimed(Option<UnclaimDescription>),
    /// PROVING for longer than the proof timeout.
    ProofTimeout,
}

impl FailureReason {
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, FailureReason::Unclaimed(Some(desc)) if desc.is_execution_failure())
    }
}

/// Decides which ranges replace a failed request.
pub trait RetryPolicy: Debug + Send + Sync + 'static {
    /// Ranges of the replacement rows, each within `failed`'s range.
    fn plan(&self, failed: &ProofRequest, reason: FailureReason) -> Vec<BlockRange>;
}

/// Retries the same range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameRange;

impl RetryPolicy for SameRange {
    fn plan(&self, failed: &ProofRequest, _reason: FailureReason) -> Vec<BlockRange> {
        vec![failed.range()]
    }
}

/// Halves range requests that the program could not execute, retries everything else as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitOnExecutionFailure;

impl RetryPolicy for SplitOnExecutionFailure {
    fn plan(&self, failed: &ProofRequest, reason: FailureReason) -> Vec<BlockRange> {
        if failed.kind == ProofKind::Range && reason.is_execution_failure() {
            if let Some((left, right)) = failed.range().split_half() {
                return vec![left, right];
            }
        }
        vec![failed.range()]
    }
}

/// Marks `req` FAILED and queues its retries.
///
/// A row another writer already failed still gets its retries; a row that completed in the
/// meantime is left alone. Returns the ids of the new rows.
pub async fn fail_and_retry(
    store: &dyn ProofStore,
    policy: &dyn RetryPolicy,
    req: &ProofRequest,
    reason: FailureReason,
) -> Result<Vec<ProofRequestId>, DriverError> {
    match store.update_status(req.id, ProofStatus::Failed).await {
        Ok(()) => {}
        Err(StoreError::InvalidTransition(
            _,
            InvalidTransition {
                from: ProofStatus::Failed,
                ..
            },
        )) => {}
        Err(StoreError::InvalidTransition(_, InvalidTransition { from, .. })) => {
            warn!(id = req.id, status = %from, ?reason, "not failing proof request, it moved on");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    }

    retry_failed(store, policy, req, reason).await
}

/// Queues the retries of an already FAILED row.
pub async fn retry_failed(
    store: &dyn ProofStore,
    policy: &dyn RetryPolicy,
    req: &ProofRequest,
    reason: FailureReason,
) -> Result<Vec<ProofRequestId>, DriverError> {
    let ranges = policy.plan(req, reason);
    let ids = store.create_retry(req.id, &ranges).await?;
    if !ids.is_empty() {
        info!(
            id = req.id,
            kind = %req.kind,
            start = req.start_block,
            end = req.end_block,
            ?reason,
            retries = ?ids,
            "queued retry"
        );
    }
    Ok(ids)
}
