//! Per-tick snapshot of the proposer's progress.

use std::fmt;

use prometheus::{IntCounterVec, Opts, Registry};
use proposer_db_types::ProofStatus;
use tracing::info;

use crate::{context::ProposerContext, errors::DriverError};

/// A pipeline stage, in tick order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Status,
    Range,
    Reconcile,
    Plan,
    Dispatch,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Status,
        Stage::Range,
        Stage::Reconcile,
        Stage::Plan,
        Stage::Dispatch,
        Stage::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Status => "status",
            Stage::Range => "range",
            Stage::Reconcile => "reconcile",
            Stage::Plan => "plan",
            Stage::Dispatch => "dispatch",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by each stage since startup, labelled by stage on a private registry.
#[derive(Clone)]
pub struct StageErrorCounters {
    registry: Registry,
    errors: IntCounterVec,
}

impl StageErrorCounters {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let errors = IntCounterVec::new(
            Opts::new(
                "proposer_stage_errors_total",
                "Errors returned by each pipeline stage",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        // Every stage reports, even before its first error.
        for stage in Stage::ALL {
            errors.with_label_values(&[stage.as_str()]);
        }

        Ok(Self { registry, errors })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record(&self, stage: Stage) {
        self.errors.with_label_values(&[stage.as_str()]).inc();
    }

    pub fn get(&self, stage: Stage) -> u64 {
        self.errors.with_label_values(&[stage.as_str()]).get()
    }

    pub fn total(&self) -> u64 {
        Stage::ALL.iter().map(|stage| self.get(*stage)).sum()
    }
}

impl fmt::Debug for StageErrorCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageErrorCounters({self})")
    }
}

impl fmt::Display for StageErrorCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for stage in Stage::ALL {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{stage}={}", self.get(stage))?;
        }
        Ok(())
    }
}

/// Where the proposer stands, gathered at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposerStatus {
    pub l2_unsafe_head: u64,
    pub l2_finalized_head: u64,
    pub contract_latest: u64,
    /// Last block of the completed range chain following `contract_latest`.
    pub highest_proven_contiguous: u64,
    pub proving: u64,
    pub witnessgen: u64,
    pub unrequested: u64,
}

pub async fn gather_status(ctx: &ProposerContext) -> Result<ProposerStatus, DriverError> {
    let sync = ctx.rollup.sync_status().await?;
    let contract_latest = ctx.contract.latest_block_number().await?;
    let highest_proven_contiguous = ctx
        .store
        .max_contiguous_range_end(contract_latest.saturating_add(1))
        .await?;

    Ok(ProposerStatus {
        l2_unsafe_head: sync.unsafe_l2.number,
        l2_finalized_head: sync.finalized_l2.number,
        contract_latest,
        highest_proven_contiguous,
        proving: ctx.store.count_with_status(&[ProofStatus::Proving]).await?,
        witnessgen: ctx.store.count_with_status(&[ProofStatus::WitnessGen]).await?,
        unrequested: ctx
            .store
            .count_with_status(&[ProofStatus::Unrequested])
            .await?,
    })
}

pub fn log_status(status: &ProposerStatus, counters: &StageErrorCounters) {
    info!(
        l2_unsafe = status.l2_unsafe_head,
        l2_finalized = status.l2_finalized_head,
        contract_latest = status.contract_latest,
        proven_to = status.highest_proven_contiguous,
        proving = status.proving,
        witnessgen = status.witnessgen,
        unrequested = status.unrequested,
        stage_errors = %counters,
        "proposer status"
    );
}
