//! Dispatch: move one queued request per tick into the proving pipeline.

use proposer_db_types::{ProofKind, ProofRequest, ProofRequestId, ProofStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::{
    context::{ProposerContext, Workers},
    errors::DriverError,
    finalize::checkpoint_l1_block,
    retry::{fail_and_retry, FailureReason},
};

/// What the dispatcher did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing is queued.
    Idle,
    /// The concurrency caps are reached.
    AtCapacity,
    /// The aggregation row got its L1 checkpoint and is dispatched on a later tick.
    CheckpointAttached(ProofRequestId),
    /// The row is in WITNESSGEN and a worker is requesting its proof.
    Dispatched(ProofRequestId),
}

/// Picks the next UNREQ row and starts a worker for it.
#[instrument(skip_all)]
pub async fn dispatch_next(
    ctx: &ProposerContext,
    workers: &Workers,
) -> Result<DispatchOutcome, DriverError> {
    let Some(next) = ctx.store.next_unrequested().await? else {
        return Ok(DispatchOutcome::Idle);
    };

    match next.kind {
        ProofKind::Agg if next.l1_checkpoint().is_none() => {
            let checkpoint = checkpoint_l1_block(ctx).await?;
            ctx.store
                .attach_l1_checkpoint(
                    next.start_block,
                    next.end_block,
                    checkpoint.number,
                    checkpoint.hash,
                )
                .await?;
            info!(
                id = next.id,
                start = next.start_block,
                end = next.end_block,
                l1_block = checkpoint.number,
                "attached L1 checkpoint to aggregation request"
            );
            return Ok(DispatchOutcome::CheckpointAttached(next.id));
        }
        ProofKind::Agg => {}
        ProofKind::Range => {
            if at_capacity(ctx).await? {
                return Ok(DispatchOutcome::AtCapacity);
            }
        }
    }

    ctx.store
        .update_status(next.id, ProofStatus::WitnessGen)
        .await?;
    info!(
        id = next.id,
        kind = %next.kind,
        start = next.start_block,
        end = next.end_block,
        mock = ctx.config.mock,
        "dispatching proof request"
    );

    let id = next.id;
    let span = info_span!("proof_worker", id, kind = %next.kind);
    let cancel = workers.cancel_token().clone();
    workers.spawn(run_worker(ctx.clone(), next, cancel).instrument(span));
    Ok(DispatchOutcome::Dispatched(id))
}

async fn at_capacity(ctx: &ProposerContext) -> Result<bool, DriverError> {
    let witnessgen = ctx
        .store
        .count_with_status(&[ProofStatus::WitnessGen])
        .await?;
    let proving = ctx.store.count_with_status(&[ProofStatus::Proving]).await?;

    let full = witnessgen >= ctx.config.max_concurrent_witness_gen
        || witnessgen + proving >= ctx.config.max_concurrent_proof_requests;
    if full {
        debug!(witnessgen, proving, "proof request caps reached");
    }
    Ok(full)
}

/// Result of the proving service call.
enum Requested {
    /// The service accepted the request under this id.
    Remote(String),
    /// Mock mode answers with the proof directly.
    Mock(Vec<u8>),
}

/// Requests the proof and records the outcome.
///
/// Cancellation only interrupts the proving service call; once it returned, the store write
/// always runs so the row does not stay in WITNESSGEN.
async fn run_worker(ctx: ProposerContext, req: ProofRequest, cancel: CancellationToken) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(id = req.id, "cancelled during proof request, row stays in WITNESSGEN");
            return;
        }
        result = request_proof(&ctx, &req) => result,
    };

    if let Err(e) = record_outcome(&ctx, &req, result).await {
        error!(id = req.id, %e, "failed to record proof request outcome");
    }
}

async fn request_proof(
    ctx: &ProposerContext,
    req: &ProofRequest,
) -> Result<Requested, DriverError> {
    match req.kind {
        ProofKind::Range => {
            if ctx.config.mock {
                let proof = ctx
                    .prover
                    .request_mock_range_proof(req.start_block, req.end_block)
                    .await?;
                Ok(Requested::Mock(proof))
            } else {
                let id = ctx
                    .prover
                    .request_range_proof(req.start_block, req.end_block)
                    .await?;
                Ok(Requested::Remote(id))
            }
        }
        ProofKind::Agg => {
            let checkpoint = req
                .l1_checkpoint()
                .ok_or(DriverError::MissingCheckpoint(req.id))?;
            let subproofs = ctx
                .store
                .consecutive_range_proofs(req.start_block, req.end_block)
                .await?;
            if ctx.config.mock {
                let proof = ctx
                    .prover
                    .request_mock_agg_proof(subproofs, checkpoint.hash)
                    .await?;
                Ok(Requested::Mock(proof))
            } else {
                let id = ctx
                    .prover
                    .request_agg_proof(subproofs, checkpoint.hash)
                    .await?;
                Ok(Requested::Remote(id))
            }
        }
    }
}

async fn record_outcome(
    ctx: &ProposerContext,
    req: &ProofRequest,
    result: Result<Requested, DriverError>,
) -> Result<(), DriverError> {
    match result {
        Ok(Requested::Remote(prover_id)) => {
            ctx.store.assign_prover(req.id, &prover_id).await?;
            info!(id = req.id, %prover_id, "proof requested");
        }
        Ok(Requested::Mock(proof)) => {
            let prover_id = mock_prover_id(req.id);
            ctx.store.assign_prover(req.id, &prover_id).await?;
            // The mock id is unknown to the proving service, so the row must not stay PROVING.
            if let Err(e) = ctx.store.add_fulfilled_proof(req.id, &proof).await {
                warn!(id = req.id, %e, "failed to store mock proof");
                fail_and_retry(
                    ctx.store.as_ref(),
                    ctx.retry.as_ref(),
                    req,
                    FailureReason::DispatchFailed,
                )
                .await?;
                return Ok(());
            }
            info!(id = req.id, "mock proof stored");
        }
        Err(e) => {
            warn!(
                id = req.id,
                kind = %req.kind,
                start = req.start_block,
                end = req.end_block,
                %e,
                "proof request failed"
            );
            fail_and_retry(
                ctx.store.as_ref(),
                ctx.retry.as_ref(),
                req,
                FailureReason::DispatchFailed,
            )
            .await?;
        }
    }
    Ok(())
}

fn mock_prover_id(id: ProofRequestId) -> String {
    format!("mock-{id}")
}
