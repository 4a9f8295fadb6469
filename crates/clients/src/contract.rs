//! Settlement contract bindings.

use alloy::{providers::DynProvider, sol, sol_types::SolCall};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::errors::ChainError;

sol! {
    #[sol(rpc)]
    contract L2OutputOracle {
        function latestBlockNumber() external view returns (uint256);

        function nextBlockNumber() external view returns (uint256);

        function checkpointBlockHash(uint256 _blockNumber) external;

        function proposeL2Output(
            bytes32 _outputRoot,
            uint256 _l2BlockNumber,
            uint256 _l1BlockNumber,
            bytes _proof
        ) external payable;
    }
}

/// View methods of the settlement contract.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait SettlementContract: Send + Sync + 'static {
    fn address(&self) -> Address;

    /// Last L2 block whose output is already proven on L1.
    async fn latest_block_number(&self) -> Result<u64, ChainError>;

    /// Smallest L2 block the contract accepts as the next proposal.
    async fn next_block_number(&self) -> Result<u64, ChainError>;
}

/// Calldata for `checkpointBlockHash(l1_block_number)`.
pub fn checkpoint_block_hash_calldata(l1_block_number: u64) -> Bytes {
    L2OutputOracle::checkpointBlockHashCall {
        _blockNumber: U256::from(l1_block_number),
    }
    .abi_encode()
    .into()
}

/// Calldata for `proposeL2Output(output_root, l2_block_number, l1_block_number, proof)`.
pub fn propose_l2_output_calldata(
    output_root: B256,
    l2_block_number: u64,
    l1_block_number: u64,
    proof: &[u8],
) -> Bytes {
    L2OutputOracle::proposeL2OutputCall {
        _outputRoot: output_root,
        _l2BlockNumber: U256::from(l2_block_number),
        _l1BlockNumber: U256::from(l1_block_number),
        _proof: Bytes::copy_from_slice(proof),
    }
    .abi_encode()
    .into()
}

fn to_block_number(value: U256) -> Result<u64, ChainError> {
    u64::try_from(value).map_err(|_| ChainError::Decode(format!("block number {value} overflows")))
}

#[derive(Debug, Clone)]
pub struct AlloySettlementContract {
    oracle: L2OutputOracle::L2OutputOracleInstance<DynProvider>,
}

impl AlloySettlementContract {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            oracle: L2OutputOracle::new(address, provider),
        }
    }
}

#[async_trait]
impl SettlementContract for AlloySettlementContract {
    fn address(&self) -> Address {
        *self.oracle.address()
    }

    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        let value = self
            .oracle
            .latestBlockNumber()
            .call()
            .await
            .map_err(|e| ChainError::rpc(e.to_string()))?;
        to_block_number(value)
    }

    async fn next_block_number(&self) -> Result<u64, ChainError> {
        let value = self
            .oracle
            .nextBlockNumber()
            .call()
            .await
            .map_err(|e| ChainError::rpc(e.to_string()))?;
        to_block_number(value)
    }
}
