use alloy::{
    providers::{DynProvider, Provider},
    rpc::types::BlockNumberOrTag,
};
use alloy_primitives::B256;
use async_trait::async_trait;

use crate::errors::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Header {
    pub number: u64,
    pub hash: B256,
}

/// Read access to the L1 execution client.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait L1Client: Send + Sync + 'static {
    /// Current L1 head number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn header_by_number(&self, number: u64) -> Result<Option<L1Header>, ChainError>;
}

#[derive(Debug, Clone)]
pub struct AlloyL1Client {
    provider: DynProvider,
}

impl AlloyL1Client {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl L1Client for AlloyL1Client {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::rpc(e.to_string()))
    }

    async fn header_by_number(&self, number: u64) -> Result<Option<L1Header>, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| ChainError::rpc(e.to_string()))?;

        Ok(block.map(|block| L1Header {
            number: block.header.number,
            hash: block.header.hash,
        }))
    }
}
