use std::time::Duration;

use crate::errors::DriverError;

/// Tunables of the proposer pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Tick period, also used as the L1-head barrier and node sync poll period.
    pub poll_interval: Duration,

    /// Width of every range proof, in L2 blocks.
    pub max_range_width: u64,

    /// Cap on rows in WITNESSGEN at the same time.
    pub max_concurrent_witness_gen: u64,

    /// Cap on rows in WITNESSGEN or PROVING at the same time.
    pub max_concurrent_proof_requests: u64,

    /// PROVING rows older than this are failed and retried.
    pub proof_timeout: Duration,

    /// Derive ranges up to the safe head instead of the finalized head.
    pub allow_non_finalized: bool,

    /// Wait at startup until the rollup node has caught up with L1.
    pub wait_node_sync: bool,

    /// Use the proving service's mock endpoints.
    pub mock: bool,

    /// Attempts of the startup configuration check.
    pub validate_config_attempts: u32,

    /// Delay before the first retry of the configuration check, doubled on each retry.
    pub validate_config_backoff: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(12),
            max_range_width: 300,
            max_concurrent_witness_gen: 5,
            max_concurrent_proof_requests: 40,
            proof_timeout: Duration::from_secs(4 * 60 * 60),
            allow_non_finalized: false,
            wait_node_sync: false,
            mock: false,
            validate_config_attempts: 5,
            validate_config_backoff: Duration::from_secs(1),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.max_range_width == 0 {
            return Err(DriverError::InvalidConfig(
                "max_range_width must be positive".to_string(),
            ));
        }
        if self.max_concurrent_witness_gen == 0 || self.max_concurrent_proof_requests == 0 {
            return Err(DriverError::InvalidConfig(
                "concurrency caps must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(DriverError::InvalidConfig(
                "poll_interval must be positive".to_string(),
            ));
        }
        if self.validate_config_attempts == 0 {
            return Err(DriverError::InvalidConfig(
                "validate_config_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
