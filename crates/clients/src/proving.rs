//! HTTP client for the proving service.

use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tracing::debug;

use crate::errors::{ConfigError, ProverError};

const STATUS_FULFILLED: &str = "PROOF_FULFILLED";
const STATUS_UNCLAIMED: &str = "PROOF_UNCLAIMED";

/// Why the proving network gave up on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnclaimDescription {
    UnexpectedProverError,
    ProgramExecutionError,
    CycleLimitExceeded,
    #[serde(other)]
    Other,
}

impl UnclaimDescription {
    /// The program itself could not run the range, as opposed to an infrastructure fault.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            UnclaimDescription::ProgramExecutionError | UnclaimDescription::CycleLimitExceeded
        )
    }
}

/// Body of `GET /status/{proof_id}`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStatusResponse {
    pub status: String,
    #[serde_as(as = "Option<Base64>")]
    pub proof: Option<Vec<u8>>,
    pub unclaim_description: Option<UnclaimDescription>,
}

/// What a status response means for the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteProofState {
    Fulfilled(Vec<u8>),
    Unclaimed(Option<UnclaimDescription>),
    Pending,
}

impl ProofStatusResponse {
    pub fn into_state(self) -> Result<RemoteProofState, ProverError> {
        match self.status.as_str() {
            STATUS_FULFILLED => match self.proof {
                Some(proof) if !proof.is_empty() => Ok(RemoteProofState::Fulfilled(proof)),
                _ => Err(ProverError::Invalid(
                    "fulfilled proof without proof bytes".to_string(),
                )),
            },
            STATUS_UNCLAIMED => Ok(RemoteProofState::Unclaimed(self.unclaim_description)),
            _ => Ok(RemoteProofState::Pending),
        }
    }
}

/// Body of `POST /validate_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateConfigResponse {
    pub rollup_config_hash_valid: bool,
    pub agg_vkey_valid: bool,
    pub range_vkey_valid: bool,
}

impl ValidateConfigResponse {
    pub fn invalid_items(&self) -> Vec<&'static str> {
        [
            ("rollup_config_hash", self.rollup_config_hash_valid),
            ("agg_vkey", self.agg_vkey_valid),
            ("range_vkey", self.range_vkey_valid),
        ]
        .into_iter()
        .filter_map(|(name, valid)| (!valid).then_some(name))
        .collect()
    }

    /// Fails with every invalid item listed.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let invalid = self.invalid_items();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { invalid })
        }
    }
}

#[derive(Debug, Serialize)]
struct SpanProofRequest {
    start: u64,
    end: u64,
}

#[serde_as]
#[derive(Debug, Serialize)]
struct AggProofRequest {
    #[serde_as(as = "Vec<Base64>")]
    subproofs: Vec<Vec<u8>>,
    head: B256,
}

#[derive(Debug, Serialize)]
struct ValidateConfigRequest {
    address: Address,
}

#[derive(Debug, Deserialize)]
struct ProofIdResponse {
    proof_id: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct MockProofResponse {
    #[serde_as(as = "Base64")]
    proof: Vec<u8>,
}

/// Out-of-process service that generates range and aggregation proofs.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait ProvingService: Send + Sync + 'static {
    /// Requests a range proof for `[start, end]` and returns the service's request id.
    ///
    /// Blocks for the duration of witness generation.
    async fn request_range_proof(&self, start: u64, end: u64) -> Result<String, ProverError>;

    /// Requests an aggregation over `subproofs`, pinned to the L1 block `head`.
    async fn request_agg_proof(
        &self,
        subproofs: Vec<Vec<u8>>,
        head: B256,
    ) -> Result<String, ProverError>;

    /// Produces a mock range proof immediately.
    async fn request_mock_range_proof(&self, start: u64, end: u64)
        -> Result<Vec<u8>, ProverError>;

    /// Produces a mock aggregation proof immediately.
    async fn request_mock_agg_proof(
        &self,
        subproofs: Vec<Vec<u8>>,
        head: B256,
    ) -> Result<Vec<u8>, ProverError>;

    async fn proof_status(&self, proof_id: &str) -> Result<ProofStatusResponse, ProverError>;

    /// Checks the verifier configuration of the settlement contract at `address`.
    async fn validate_config(&self, address: Address)
        -> Result<ValidateConfigResponse, ProverError>;
}

/// [`ProvingService`] over the service's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProvingClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    status_timeout: Duration,
}

impl HttpProvingClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        status_timeout: Duration,
    ) -> Result<Self, ProverError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout,
            status_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, timeout: Duration) -> Result<R, ProverError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(%path, "proving service request");
        let resp = self
            .client
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ProverError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProverError::Status {
            status: status.as_u16(),
            body,
        });
    }

    resp.json::<R>()
        .await
        .map_err(|e| ProverError::Decode(e.to_string()))
}

#[async_trait]
impl ProvingService for HttpProvingClient {
    async fn request_range_proof(&self, start: u64, end: u64) -> Result<String, ProverError> {
        let resp: ProofIdResponse = self
            .post_json(
                "request_span_proof",
                &SpanProofRequest { start, end },
                self.request_timeout,
            )
            .await?;
        Ok(resp.proof_id)
    }

    async fn request_agg_proof(
        &self,
        subproofs: Vec<Vec<u8>>,
        head: B256,
    ) -> Result<String, ProverError> {
        let resp: ProofIdResponse = self
            .post_json(
                "request_agg_proof",
                &AggProofRequest { subproofs, head },
                self.request_timeout,
            )
            .await?;
        Ok(resp.proof_id)
    }

    async fn request_mock_range_proof(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, ProverError> {
        let resp: MockProofResponse = self
            .post_json(
                "request_mock_span_proof",
                &SpanProofRequest { start, end },
                self.request_timeout,
            )
            .await?;
        Ok(resp.proof)
    }

    async fn request_mock_agg_proof(
        &self,
        subproofs: Vec<Vec<u8>>,
        head: B256,
    ) -> Result<Vec<u8>, ProverError> {
        let resp: MockProofResponse = self
            .post_json(
                "request_mock_agg_proof",
                &AggProofRequest { subproofs, head },
                self.request_timeout,
            )
            .await?;
        Ok(resp.proof)
    }

    async fn proof_status(&self, proof_id: &str) -> Result<ProofStatusResponse, ProverError> {
        let resp = self
            .client
            .get(self.url(&format!("status/{proof_id}")))
            .timeout(self.status_timeout)
            .send()
            .await?;
        decode(resp).await
    }

    async fn validate_config(
        &self,
        address: Address,
    ) -> Result<ValidateConfigResponse, ProverError> {
        self.post_json(
            "validate_config",
            &ValidateConfigRequest { address },
            self.status_timeout,
        )
        .await
    }
}
