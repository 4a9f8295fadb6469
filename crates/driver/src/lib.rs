//! The proposer pipeline.
//!
//! Each tick runs five stages against the proof store in order: range derivation, status
//! reconciliation, aggregation planning, dispatch and finalization. Dispatch spawns one detached
//! worker per request for the long proving service call; every other write happens on the tick.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod finalize;
pub mod orchestrator;
pub mod planner;
pub mod range;
pub mod reconcile;
pub mod retry;
pub mod status;

pub use config::DriverConfig;
pub use context::{ProposerContext, Workers};
pub use dispatch::{dispatch_next, DispatchOutcome};
pub use errors::DriverError;
pub use finalize::{checkpoint_l1_block, submit_completed_aggs, FinalizeReport};
pub use orchestrator::Orchestrator;
pub use planner::plan_aggregation;
pub use range::derive_ranges;
pub use reconcile::{reconcile, ReconcileReport};
pub use retry::{
    fail_and_retry, retry_failed, FailureReason, RetryPolicy, SameRange, SplitOnExecutionFailure,
};
pub use status::{gather_status, ProposerStatus, Stage, StageErrorCounters};
