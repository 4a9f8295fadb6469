//! Rollup node RPC.

use std::time::Duration;

use alloy_primitives::{B256, U64};
use async_trait::async_trait;
use jsonrpsee::{
    core::ClientError,
    http_client::{HttpClient, HttpClientBuilder},
    proc_macros::rpc,
};
use serde::{Deserialize, Serialize};

use crate::errors::ChainError;

/// Output root version the settlement contract understands.
pub const SUPPORTED_OUTPUT_VERSION: B256 = B256::ZERO;

/// Hash and number of an L1 or L2 block as the rollup node reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub hash: B256,
    pub number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub current_l1: BlockRef,
    pub head_l1: BlockRef,
    pub safe_l1: BlockRef,
    pub finalized_l1: BlockRef,
    pub unsafe_l2: BlockRef,
    pub safe_l2: BlockRef,
    pub finalized_l2: BlockRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResponse {
    pub version: B256,
    pub output_root: B256,
    pub block_ref: BlockRef,
    #[serde(default)]
    pub state_root: Option<B256>,
    pub sync_status: SyncStatus,
}

#[rpc(client, namespace = "optimism")]
pub trait OptimismRpc {
    #[method(name = "syncStatus")]
    async fn sync_status(&self) -> RpcResult<SyncStatus>;

    #[method(name = "outputAtBlock")]
    async fn output_at_block(&self, block: U64) -> RpcResult<OutputResponse>;
}

/// Read access to the rollup node.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait RollupNode: Send + Sync + 'static {
    async fn sync_status(&self) -> Result<SyncStatus, ChainError>;

    /// Output root and sync status at L2 block `block`.
    async fn output_at_block(&self, block: u64) -> Result<OutputResponse, ChainError>;
}

/// Fetches the output at `block`, rejecting answers for another block or an unknown version.
///
/// This is a checked version of [`RollupNode::output_at_block`] that guards against stale or
/// cached node responses.
pub async fn output_at_block_checked<R: RollupNode + ?Sized>(
    node: &R,
    block: u64,
) -> Result<OutputResponse, ChainError> {
    let output = node.output_at_block(block).await?;
    if output.version != SUPPORTED_OUTPUT_VERSION {
        return Err(ChainError::UnsupportedOutputVersion(output.version));
    }
    if output.block_ref.number != block {
        return Err(ChainError::OutputBlockMismatch {
            expected: block,
            actual: output.block_ref.number,
        });
    }
    Ok(output)
}

/// [`RollupNode`] over the node's JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcRollupNode {
    client: HttpClient,
}

impl JsonRpcRollupNode {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(to_chain_error)?;
        Ok(Self { client })
    }
}

fn to_chain_error(err: ClientError) -> ChainError {
    match err {
        ClientError::Call(obj) => ChainError::rpc(obj.to_string()),
        other => ChainError::network(other.to_string()),
    }
}

#[async_trait]
impl RollupNode for JsonRpcRollupNode {
    async fn sync_status(&self) -> Result<SyncStatus, ChainError> {
        OptimismRpcClient::sync_status(&self.client)
            .await
            .map_err(to_chain_error)
    }

    async fn output_at_block(&self, block: u64) -> Result<OutputResponse, ChainError> {
        OptimismRpcClient::output_at_block(&self.client, U64::from(block))
            .await
            .map_err(to_chain_error)
    }
}
