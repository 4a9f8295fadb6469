//! Storage interface for the proof request queue.

use alloy_primitives::B256;
use async_trait::async_trait;

use crate::{
    types::{AggCreation, BlockRange, ProofKind, ProofRequest, ProofRequestId, ProofStatus},
    StoreResult,
};

/// Durable queue of proof requests.
///
/// Implementations own every invariant on the `proof_request` table: status changes go through
/// the [`ProofStatus::apply`] state machine, a COMPLETE row always carries its proof, and at most
/// one non-FAILED aggregation row exists per first block. Every method runs as one atomic unit.
#[async_trait]
pub trait ProofStore: Send + Sync + 'static {
    /// Inserts a new UNREQ row covering `[start, end]` and returns its id.
    async fn create(&self, kind: ProofKind, start: u64, end: u64) -> StoreResult<ProofRequestId>;

    async fn get(&self, id: ProofRequestId) -> StoreResult<Option<ProofRequest>>;

    /// Moves a row to `status` through the lifecycle state machine.
    ///
    /// COMPLETE is only reachable through [`ProofStore::add_fulfilled_proof`], and an AGG row
    /// cannot leave UNREQ before its L1 checkpoint is attached.
    async fn update_status(&self, id: ProofRequestId, status: ProofStatus) -> StoreResult<()>;

    /// Records the proving service's request id and stamps `proof_request_time`.
    async fn set_prover_id(&self, id: ProofRequestId, prover_id: &str) -> StoreResult<()>;

    /// Moves a WITNESSGEN row to PROVING and records its prover id in one transaction.
    async fn assign_prover(&self, id: ProofRequestId, prover_id: &str) -> StoreResult<()>;

    /// Fills the L1 checkpoint of the UNREQ aggregation row spanning `[start, end]`.
    async fn attach_l1_checkpoint(
        &self,
        start: u64,
        end: u64,
        l1_block_number: u64,
        l1_block_hash: B256,
    ) -> StoreResult<()>;

    /// Stores `proof` on a PROVING row without one and marks it COMPLETE.
    async fn add_fulfilled_proof(&self, id: ProofRequestId, proof: &[u8]) -> StoreResult<()>;

    /// Queues the retries of a FAILED row.
    ///
    /// Returns the new ids, or nothing if the row was already retried.
    async fn create_retry(
        &self,
        parent: ProofRequestId,
        ranges: &[BlockRange],
    ) -> StoreResult<Vec<ProofRequestId>>;

    /// Highest `end_block` of any row.
    async fn latest_end_block(&self) -> StoreResult<Option<u64>>;

    /// Oldest UNREQ row, aggregation rows first.
    async fn next_unrequested(&self) -> StoreResult<Option<ProofRequest>>;

    /// PROVING rows that have a prover id to poll.
    async fn pending_proofs(&self) -> StoreResult<Vec<ProofRequest>>;

    /// WITNESSGEN rows without a prover id that entered the state longer ago than the
    /// configured threshold.
    async fn witnessgen_timed_out(&self) -> StoreResult<Vec<ProofRequest>>;

    async fn rows_with_status(&self, status: ProofStatus) -> StoreResult<Vec<ProofRequest>>;

    /// FAILED rows that never reached the proving service and have not been retried yet.
    async fn failed_without_dispatch(&self) -> StoreResult<Vec<ProofRequest>>;

    /// Number of rows in any of `statuses`.
    async fn count_with_status(&self, statuses: &[ProofStatus]) -> StoreResult<u64>;

    /// COMPLETE aggregation rows whose first block is `start`.
    async fn completed_aggs_from(&self, start: u64) -> StoreResult<Vec<ProofRequest>>;

    /// Last block of the chain of COMPLETE range rows beginning at `start`, or `start - 1`.
    async fn max_contiguous_range_end(&self, start: u64) -> StoreResult<u64>;

    /// Proofs of the COMPLETE range rows tiling `[start, end]`, in block order.
    async fn consecutive_range_proofs(&self, start: u64, end: u64) -> StoreResult<Vec<Vec<u8>>>;

    /// Queues an aggregation over the completed chain from `start` if it reaches `min_end`.
    async fn try_create_agg(&self, start: u64, min_end: u64) -> StoreResult<AggCreation>;

    /// Flushes and releases the underlying database.
    async fn close(&self);
}
