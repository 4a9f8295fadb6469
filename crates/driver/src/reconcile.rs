//! Status reconciliation against the proving service.

use std::time::Duration;

use futures::{stream, StreamExt};
use proposer_clients::RemoteProofState;
use proposer_db_types::ProofRequest;
use tracing::{debug, info, instrument, warn};

use crate::{
    context::ProposerContext,
    errors::DriverError,
    retry::{fail_and_retry, retry_failed, FailureReason},
};

/// Status requests in flight at once while polling.
const STATUS_POLL_CONCURRENCY: usize = 16;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub stalled: usize,
    pub retried: usize,
    pub fulfilled: usize,
    pub unclaimed: usize,
    pub timed_out: usize,
}

/// Fails stalled witness generation, retries undispatched failures and polls in-flight proofs.
///
/// Per-row errors are logged and skipped; only the listing queries abort the pass. A row whose
/// status cannot be read is still subject to the proof timeout.
#[instrument(skip_all)]
pub async fn reconcile(ctx: &ProposerContext) -> Result<ReconcileReport, DriverError> {
    let mut report = ReconcileReport::default();

    for req in ctx.store.witnessgen_timed_out().await? {
        warn!(
            id = req.id,
            kind = %req.kind,
            start = req.start_block,
            end = req.end_block,
            "witness generation stalled"
        );
        match fail_and_retry(
            ctx.store.as_ref(),
            ctx.retry.as_ref(),
            &req,
            FailureReason::WitnessgenStalled,
        )
        .await
        {
            Ok(_) => report.stalled += 1,
            Err(e) => warn!(id = req.id, %e, "failed to retry stalled request"),
        }
    }

    for req in ctx.store.failed_without_dispatch().await? {
        match retry_failed(
            ctx.store.as_ref(),
            ctx.retry.as_ref(),
            &req,
            FailureReason::DispatchFailed,
        )
        .await
        {
            Ok(ids) if !ids.is_empty() => report.retried += 1,
            Ok(_) => {}
            Err(e) => warn!(id = req.id, %e, "failed to retry undispatched request"),
        }
    }

    let pending = ctx.store.pending_proofs().await?;
    let polled: Vec<_> = stream::iter(pending)
        .map(|req| async move {
            let state = poll_state(ctx, &req).await;
            (req, state)
        })
        .buffer_unordered(STATUS_POLL_CONCURRENCY)
        .collect()
        .await;

    for (req, state) in polled {
        let state = match state {
            Ok(state) => state,
            Err(e) => {
                warn!(id = req.id, prover_id = ?req.prover_request_id, %e, "status poll failed");
                RemoteProofState::Pending
            }
        };
        if let Err(e) = apply_state(ctx, &req, state, &mut report).await {
            warn!(id = req.id, %e, "failed to apply proof status");
        }
    }

    Ok(report)
}

async fn poll_state(
    ctx: &ProposerContext,
    req: &ProofRequest,
) -> Result<RemoteProofState, DriverError> {
    let Some(prover_id) = req.prover_request_id.as_deref() else {
        return Ok(RemoteProofState::Pending);
    };
    Ok(ctx.prover.proof_status(prover_id).await?.into_state()?)
}

async fn apply_state(
    ctx: &ProposerContext,
    req: &ProofRequest,
    state: RemoteProofState,
    report: &mut ReconcileReport,
) -> Result<(), DriverError> {
    match state {
        RemoteProofState::Fulfilled(proof) => {
            ctx.store.add_fulfilled_proof(req.id, &proof).await?;
            info!(
                id = req.id,
                kind = %req.kind,
                start = req.start_block,
                end = req.end_block,
                "proof fulfilled"
            );
            report.fulfilled += 1;
        }
        RemoteProofState::Unclaimed(description) => {
            warn!(
                id = req.id,
                kind = %req.kind,
                start = req.start_block,
                end = req.end_block,
                ?description,
                "proof request unclaimed"
            );
            let reason = FailureReason::Unclaimed(description);
            fail_and_retry(ctx.store.as_ref(), ctx.retry.as_ref(), req, reason).await?;
            report.unclaimed += 1;
        }
        RemoteProofState::Pending => {
            let requested_at = req.proof_request_time.unwrap_or(req.last_updated_time);
            if !is_timed_out(requested_at, ctx.now(), ctx.config.proof_timeout) {
                debug!(id = req.id, "proof still in progress");
                return Ok(());
            }
            warn!(
                id = req.id,
                kind = %req.kind,
                start = req.start_block,
                end = req.end_block,
                requested_at,
                "proof request timed out"
            );
            let reason = FailureReason::ProofTimeout;
            fail_and_retry(ctx.store.as_ref(), ctx.retry.as_ref(), req, reason).await?;
            report.timed_out += 1;
        }
    }
    Ok(())
}

fn is_timed_out(requested_at: u64, now: u64, timeout: Duration) -> bool {
    now > requested_at.saturating_add(timeout.as_secs())
}
