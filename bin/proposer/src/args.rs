use std::{env, path::PathBuf};

use anyhow::Context;
use argh::FromArgs;

use crate::config::ProposerConfig;

/// Environment variable with the OTLP collector endpoint; overrides the config file.
const OTLP_URL_ENV: &str = "PROPOSER_OTLP_URL";

/// Configs overridable by environment. Mostly for sensitive data.
#[derive(Debug, Clone)]
pub(crate) struct EnvArgs {
    /// OpenTelemetry OTLP endpoint URL
    pub otlp_url: Option<String>,
}

impl EnvArgs {
    pub(crate) fn from_env() -> Self {
        Self {
            otlp_url: env::var(OTLP_URL_ENV).ok(),
        }
    }
}

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Validity proof proposer for an OP-stack rollup")]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[argh(option, short = 'd', description = "directory holding the proof database")]
    pub datadir: Option<PathBuf>,

    #[argh(switch, description = "request mock proofs from the proving service")]
    pub mock: bool,

    #[argh(switch, description = "keep the proof database from a previous run")]
    pub use_cached_db: bool,
}

impl Args {
    /// Loads the config file, if any, and applies the command line and environment overrides.
    pub(crate) fn resolve_config(&self, env_args: &EnvArgs) -> anyhow::Result<ProposerConfig> {
        let mut config = match &self.config {
            Some(path) => ProposerConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ProposerConfig::default(),
        };

        if let Some(datadir) = &self.datadir {
            config.db.path = datadir.clone();
        }
        if self.mock {
            config.prover.mock = true;
        }
        if self.use_cached_db {
            config.db.use_cached_db = true;
        }
        if let Some(otlp_url) = &env_args.otlp_url {
            config.logging.otlp_url = Some(otlp_url.clone());
        }

        Ok(config)
    }
}
