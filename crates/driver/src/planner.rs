//! Aggregation planning.

use proposer_db_types::AggCreation;
use tracing::{debug, info, instrument};

use crate::{context::ProposerContext, errors::DriverError};

/// Queues an aggregation over the completed range chain that follows the contract's latest
/// proven block, once the chain reaches the contract's next expected block.
#[instrument(skip_all)]
pub async fn plan_aggregation(ctx: &ProposerContext) -> Result<AggCreation, DriverError> {
    let latest_on_chain = ctx.contract.latest_block_number().await?;
    let min_to = ctx.contract.next_block_number().await?;
    let start = latest_on_chain.saturating_add(1);

    let outcome = ctx.store.try_create_agg(start, min_to).await?;
    match outcome {
        AggCreation::Created { id, end } => {
            info!(id, start, end, "queued aggregation proof request");
        }
        AggCreation::AlreadyExists { id } => {
            debug!(id, start, "aggregation already queued");
        }
        AggCreation::InsufficientCoverage { max_end } => {
            debug!(start, max_end, min_to, "range chain too short to aggregate");
        }
    }
    Ok(outcome)
}
