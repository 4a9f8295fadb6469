use std::{fmt, future::Future, sync::Arc};

use proposer_clients::{L1Client, ProvingService, RollupNode, SettlementContract, TxManager};
use proposer_common::Clock;
use proposer_db_types::ProofStore;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{config::DriverConfig, retry::RetryPolicy, status::StageErrorCounters};

/// Handles every stage works through.
#[derive(Clone)]
pub struct ProposerContext {
    pub store: Arc<dyn ProofStore>,
    pub prover: Arc<dyn ProvingService>,
    pub rollup: Arc<dyn RollupNode>,
    pub l1: Arc<dyn L1Client>,
    pub contract: Arc<dyn SettlementContract>,
    pub tx: Arc<dyn TxManager>,
    pub clock: Arc<dyn Clock>,
    pub retry: Arc<dyn RetryPolicy>,
    pub config: DriverConfig,
    pub counters: Arc<StageErrorCounters>,
}

impl fmt::Debug for ProposerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProposerContext")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ProposerContext {
    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }
}

/// Detached dispatcher workers and the token that stops them.
#[derive(Debug, Clone)]
pub struct Workers {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Workers {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every worker spawned so far, then accepts new ones again.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stops accepting workers and waits for the running ones.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
