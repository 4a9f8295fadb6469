//! Validity proposer.
//!
//! Proves finalized L2 blocks in fixed-width ranges, aggregates them and proposes the resulting
//! output roots to the L2 output oracle on L1.

use std::{env, sync::Arc};

use anyhow::Context;
use args::{Args, EnvArgs};
use config::ProposerConfig;
use proposer_clients::{
    provider::{http_provider, signing_provider},
    AlloyL1Client, AlloySettlementContract, AlloyTxManager, HttpProvingClient, JsonRpcRollupNode,
};
use proposer_common::{
    logging::{self, FileLoggingConfig, LoggerConfig, OtlpExportConfig},
    SystemClock,
};
use proposer_db_store_sqlite::SqliteProofStore;
use proposer_driver::{
    DriverError, Orchestrator, ProposerContext, RetryPolicy, SameRange, SplitOnExecutionFailure,
    StageErrorCounters,
};
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod args;
mod config;

const SERVICE_NAME: &str = "validity-proposer";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args).await {
        eprintln!("FATAL ERROR: {e:#}");

        return Err(e);
    }

    Ok(())
}

async fn main_inner(args: Args) -> anyhow::Result<()> {
    let env_args = EnvArgs::from_env();
    let config = args
        .resolve_config(&env_args)
        .context("Failed to resolve configuration")?;

    logging::init(logger_config(&config));
    let result = run(config).await;
    logging::finalize();
    result
}

async fn run(config: ProposerConfig) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;
    debug!(?config, "running proposer");

    let signer_key = env::var(&config.rpc.signer_key_env)
        .with_context(|| format!("Signing key not found in ${}", config.rpc.signer_key_env))?;

    let clock = Arc::new(SystemClock);
    let store = SqliteProofStore::open(config.store_config(), clock.clone())
        .await
        .context("Failed to open the proof store")?;

    let l1_provider =
        http_provider(&config.rpc.l1_rpc_url).context("Failed to connect to the L1 client")?;
    let (signer_provider, proposer_address) =
        signing_provider(&config.rpc.l1_rpc_url, &signer_key)
            .context("Failed to set up the L1 signer")?;
    let prover = HttpProvingClient::new(
        &config.prover.url,
        config.proof_request_timeout(),
        config.status_timeout(),
    )
    .context("Failed to build the proving service client")?;
    let rollup = JsonRpcRollupNode::new(&config.rpc.l2_node_rpc_url, config.network_timeout())
        .context("Failed to connect to the rollup node")?;

    let retry: Arc<dyn RetryPolicy> = if config.retry.split_on_execution_failure {
        Arc::new(SplitOnExecutionFailure)
    } else {
        Arc::new(SameRange)
    };

    let ctx = ProposerContext {
        store: Arc::new(store),
        prover: Arc::new(prover),
        rollup: Arc::new(rollup),
        l1: Arc::new(AlloyL1Client::new(l1_provider.clone())),
        contract: Arc::new(AlloySettlementContract::new(
            config.rpc.l2oo_address,
            l1_provider,
        )),
        tx: Arc::new(AlloyTxManager::new(
            signer_provider,
            config.tx_receipt_timeout(),
        )),
        clock,
        retry,
        config: config.driver_config(),
        counters: Arc::new(
            StageErrorCounters::new().context("failed to register stage error counters")?,
        ),
    };

    info!(
        l2oo = %config.rpc.l2oo_address,
        proposer = %proposer_address,
        mock = config.prover.mock,
        "starting proposer"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match Orchestrator::new(ctx, cancel).run().await {
        Ok(()) | Err(DriverError::Cancelled) => Ok(()),
        Err(e) => Err(e).context("Proposer stopped"),
    }
}

fn logger_config(config: &ProposerConfig) -> LoggerConfig {
    let mut logger = LoggerConfig::new(SERVICE_NAME)
        .with_service_version(env!("CARGO_PKG_VERSION"))
        .with_json_logging(config.logging.json)
        .with_resource_attribute("l2.chain_id", config.db.l2_chain_id.to_string());

    if let Some(dir) = &config.logging.file_dir {
        logger = logger.with_file_logging(
            FileLoggingConfig::new(dir.clone(), SERVICE_NAME).with_json_format(config.logging.json),
        );
    }
    if let Some(url) = &config.logging.otlp_url {
        logger = logger.with_otlp(OtlpExportConfig::new(url));
    }
    logger
}

/// Cancels `cancel` on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(%e, "cannot listen for SIGTERM, only SIGINT stops the proposer");
            if ctrl_c().await.is_ok() {
                cancel.cancel();
            }
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
    cancel.cancel();
}
