//! L1 side of the pipeline: checkpointing L1 heads and proposing aggregated outputs.

use proposer_clients::{
    checkpoint_block_hash_calldata, output_at_block_checked, propose_l2_output_calldata,
    ChainError, TxCandidate, TxError, TxReceipt,
};
use proposer_db_types::{L1Checkpoint, ProofRequest};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{context::ProposerContext, errors::DriverError};

/// Pins the parent of the current L1 head on the settlement contract.
///
/// The parent is used because the head's hash may not yet be visible to the contract's
/// `blockhash` lookup when the transaction executes.
#[instrument(skip_all)]
pub async fn checkpoint_l1_block(ctx: &ProposerContext) -> Result<L1Checkpoint, DriverError> {
    let head = ctx.l1.block_number().await?;
    let number = head
        .checked_sub(1)
        .ok_or(DriverError::NoCheckpointCandidate(head))?;
    let header = ctx
        .l1
        .header_by_number(number)
        .await?
        .ok_or(ChainError::MissingL1Block(number))?;

    let receipt = ctx
        .tx
        .send(TxCandidate {
            to: ctx.contract.address(),
            data: checkpoint_block_hash_calldata(header.number),
        })
        .await?
        .ensure_success()?;

    info!(
        l1_block = header.number,
        l1_hash = %header.hash,
        tx_hash = %receipt.tx_hash,
        "checkpointed L1 block hash"
    );
    Ok(L1Checkpoint {
        number: header.number,
        hash: header.hash,
    })
}

/// What one finalizer pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub proposed: usize,
    pub reverted: usize,
    pub failed: usize,
}

/// Proposes every completed aggregation that continues the contract's proven chain.
///
/// A reverted or failed proposal leaves the row COMPLETE, so it is tried again on the next pass
/// until the contract moves past it.
#[instrument(skip_all)]
pub async fn submit_completed_aggs(
    ctx: &ProposerContext,
    cancel: &CancellationToken,
) -> Result<FinalizeReport, DriverError> {
    let latest_on_chain = ctx.contract.latest_block_number().await?;
    let aggs = ctx
        .store
        .completed_aggs_from(latest_on_chain.saturating_add(1))
        .await?;

    let mut report = FinalizeReport::default();
    for agg in aggs {
        match propose(ctx, &agg, cancel).await {
            Ok(receipt) => {
                info!(
                    id = agg.id,
                    start = agg.start_block,
                    end = agg.end_block,
                    tx_hash = %receipt.tx_hash,
                    l1_block = ?receipt.block_number,
                    "proposed L2 output"
                );
                report.proposed += 1;
            }
            Err(DriverError::Tx(TxError::Reverted { tx_hash })) => {
                warn!(
                    id = agg.id,
                    start = agg.start_block,
                    end = agg.end_block,
                    %tx_hash,
                    "L2 output proposal reverted"
                );
                report.reverted += 1;
            }
            Err(DriverError::Cancelled) => return Err(DriverError::Cancelled),
            Err(e) => {
                warn!(
                    id = agg.id,
                    start = agg.start_block,
                    end = agg.end_block,
                    %e,
                    "failed to propose L2 output"
                );
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

async fn propose(
    ctx: &ProposerContext,
    agg: &ProofRequest,
    cancel: &CancellationToken,
) -> Result<TxReceipt, DriverError> {
    let proof = agg
        .proof
        .as_deref()
        .ok_or(DriverError::MissingProof(agg.id))?;
    let checkpoint = agg
        .l1_checkpoint()
        .ok_or(DriverError::MissingCheckpoint(agg.id))?;

    let output = output_at_block_checked(ctx.rollup.as_ref(), agg.end_block).await?;
    wait_for_l1_head_past(ctx, output.sync_status.head_l1.number, cancel).await?;

    let receipt = ctx
        .tx
        .send(TxCandidate {
            to: ctx.contract.address(),
            data: propose_l2_output_calldata(
                output.output_root,
                agg.end_block,
                checkpoint.number,
                proof,
            ),
        })
        .await?;
    Ok(receipt.ensure_success()?)
}

/// Polls the tx manager's L1 head until it is strictly above `target`.
pub async fn wait_for_l1_head_past(
    ctx: &ProposerContext,
    target: u64,
    cancel: &CancellationToken,
) -> Result<u64, DriverError> {
    loop {
        let head = ctx.tx.block_number().await?;
        if head > target {
            return Ok(head);
        }
        debug!(head, target, "waiting for L1 head to advance");

        tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::Cancelled),
            _ = sleep(ctx.config.poll_interval) => {}
        }
    }
}
