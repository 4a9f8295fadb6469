//! Range derivation: queue fixed-width range proofs over newly finalized L2 blocks.

use proposer_db_types::{BlockRange, ProofKind};
use tracing::{debug, info, instrument};

use crate::{context::ProposerContext, errors::DriverError};

/// Queues range requests after the last block the store knows about.
///
/// Falls back to the settlement contract's latest proven block on an empty store. A tail
/// shorter than the range width waits for more blocks. Returns the queued ranges.
#[instrument(skip_all)]
pub async fn derive_ranges(ctx: &ProposerContext) -> Result<Vec<BlockRange>, DriverError> {
    let latest = match ctx.store.latest_end_block().await? {
        Some(end) => end,
        None => ctx.contract.latest_block_number().await?,
    };
    let start = latest.saturating_add(1);

    let sync = ctx.rollup.sync_status().await?;
    let head = if ctx.config.allow_non_finalized {
        sync.safe_l2.number
    } else {
        sync.finalized_l2.number
    };

    let width = ctx.config.max_range_width;
    if head < start || head - start + 1 < width {
        debug!(start, head, width, "not enough new blocks for a range proof");
        return Ok(Vec::new());
    }

    let ranges = BlockRange::fixed_width_chunks(start, head, width);
    for range in &ranges {
        let id = ctx
            .store
            .create(ProofKind::Range, range.start, range.end)
            .await?;
        info!(id, start = range.start, end = range.end, "queued range proof request");
    }
    Ok(ranges)
}
