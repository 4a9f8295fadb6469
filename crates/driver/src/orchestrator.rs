//! Startup checks and the periodic tick driving every stage.

use std::time::Duration;

use proposer_db_types::ProofStatus;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    context::{ProposerContext, Workers},
    dispatch::{dispatch_next, DispatchOutcome},
    errors::DriverError,
    finalize::submit_completed_aggs,
    planner::plan_aggregation,
    range::derive_ranges,
    reconcile::reconcile,
    status::{gather_status, log_status, Stage},
};

/// Owns the proposer's lifecycle: startup checks, ticks and shutdown.
#[derive(Debug)]
pub struct Orchestrator {
    ctx: ProposerContext,
    workers: Workers,
}

impl Orchestrator {
    pub fn new(ctx: ProposerContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            workers: Workers::new(cancel),
        }
    }

    pub fn context(&self) -> &ProposerContext {
        &self.ctx
    }

    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    /// Runs the startup sequence, then ticks until cancelled, then shuts down.
    pub async fn run(self) -> Result<(), DriverError> {
        let result = self.run_until_cancelled().await;
        self.shutdown().await;
        result
    }

    async fn run_until_cancelled(&self) -> Result<(), DriverError> {
        self.ctx.config.validate()?;
        self.validate_config().await?;
        self.startup_sweep().await?;
        if self.ctx.config.wait_node_sync {
            self.wait_node_sync().await?;
        }

        let cancel = self.workers.cancel_token().clone();
        let mut ticker = interval(self.ctx.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_interval = ?self.ctx.config.poll_interval, "proposer started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }

        info!("proposer stopping");
        Ok(())
    }

    /// Checks the settlement contract's verifier configuration against the proving service.
    ///
    /// Transport failures are retried with exponential backoff; a mismatch fails immediately.
    #[instrument(skip_all)]
    pub async fn validate_config(&self) -> Result<(), DriverError> {
        let address = self.ctx.contract.address();
        let attempts = self.ctx.config.validate_config_attempts;
        let mut delay = self.ctx.config.validate_config_backoff;

        let mut attempt = 1;
        loop {
            let result = self
                .ctx
                .prover
                .validate_config(address)
                .await
                .map_err(DriverError::from);

            match result {
                Ok(resp) => {
                    resp.ensure_valid()?;
                    info!(%address, "verifier configuration matches proving service");
                    return Ok(());
                }
                Err(e) if e.is_prover_unreachable() && attempt < attempts => {
                    warn!(attempt, %e, retry_in = ?delay, "config validation failed, retrying");
                    self.pause(delay).await?;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fails rows left in WITNESSGEN by a previous run; their retries are queued on the first
    /// tick.
    #[instrument(skip_all)]
    pub async fn startup_sweep(&self) -> Result<usize, DriverError> {
        let stuck = self
            .ctx
            .store
            .rows_with_status(ProofStatus::WitnessGen)
            .await?;
        for req in &stuck {
            self.ctx
                .store
                .update_status(req.id, ProofStatus::Failed)
                .await?;
            warn!(
                id = req.id,
                kind = %req.kind,
                start = req.start_block,
                end = req.end_block,
                "failed request interrupted during witness generation"
            );
        }
        Ok(stuck.len())
    }

    /// Waits until the rollup node has derived up to the L1 head seen at startup.
    #[instrument(skip_all)]
    pub async fn wait_node_sync(&self) -> Result<(), DriverError> {
        let l1_head = self.ctx.l1.block_number().await?;
        loop {
            let sync = self.ctx.rollup.sync_status().await?;
            if sync.current_l1.number >= l1_head {
                info!(l1_head, "rollup node synced");
                return Ok(());
            }
            info!(
                current_l1 = sync.current_l1.number,
                l1_head, "waiting for rollup node to sync"
            );
            self.pause(self.ctx.config.poll_interval).await?;
        }
    }

    /// Runs every stage once, in order. A failing stage is logged and counted, and the
    /// remaining stages still run.
    pub async fn tick(&self) {
        let ctx = &self.ctx;
        let cancel = self.workers.cancel_token();

        match gather_status(ctx).await {
            Ok(status) => log_status(&status, &ctx.counters),
            Err(e) => self.stage_failed(Stage::Status, e),
        }

        if let Err(e) = derive_ranges(ctx).await {
            self.stage_failed(Stage::Range, e);
        }
        if let Err(e) = reconcile(ctx).await {
            self.stage_failed(Stage::Reconcile, e);
        }
        if let Err(e) = plan_aggregation(ctx).await {
            self.stage_failed(Stage::Plan, e);
        }
        match dispatch_next(ctx, &self.workers).await {
            Ok(DispatchOutcome::Idle) => {}
            Ok(outcome) => debug!(?outcome, "dispatch"),
            Err(e) => self.stage_failed(Stage::Dispatch, e),
        }
        if let Err(e) = submit_completed_aggs(ctx, cancel).await {
            self.stage_failed(Stage::Finalize, e);
        }
    }

    fn stage_failed(&self, stage: Stage, e: DriverError) {
        if matches!(e, DriverError::Cancelled) {
            return;
        }
        self.ctx.counters.record(stage);
        error!(%stage, %e, "stage failed");
    }

    async fn pause(&self, duration: Duration) -> Result<(), DriverError> {
        tokio::select! {
            _ = self.workers.cancel_token().cancelled() => Err(DriverError::Cancelled),
            _ = sleep(duration) => Ok(()),
        }
    }

    /// Waits for in-flight workers to record their outcome, then closes the store.
    pub async fn shutdown(&self) {
        let in_flight = self.workers.in_flight();
        if in_flight > 0 {
            info!(in_flight, "waiting for proof workers");
        }
        self.workers.drain().await;
        self.ctx.store.close().await;
        info!("proposer stopped");
    }
}
