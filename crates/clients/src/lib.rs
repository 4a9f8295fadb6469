//! Thin clients for the proposer's external collaborators: the proving service, the rollup node,
//! the L1 execution client, the settlement contract and the L1 transaction manager.
//!
//! Each collaborator is a small async trait so the driver can run against mocks.

pub mod contract;
pub mod errors;
pub mod l1;
pub mod provider;
pub mod proving;
pub mod rollup;
pub mod tx;

pub use contract::{
    checkpoint_block_hash_calldata, propose_l2_output_calldata, AlloySettlementContract,
    SettlementContract,
};
pub use errors::{ChainError, ConfigError, ProverError, TxError};
pub use l1::{AlloyL1Client, L1Client, L1Header};
pub use proving::{
    HttpProvingClient, ProofStatusResponse, ProvingService, RemoteProofState, UnclaimDescription,
    ValidateConfigResponse,
};
pub use rollup::{
    output_at_block_checked, BlockRef, JsonRpcRollupNode, OutputResponse, RollupNode, SyncStatus,
};
pub use tx::{AlloyTxManager, TxCandidate, TxManager, TxReceipt};

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    //! Mock collaborators for driver tests.

    pub use crate::{
        contract::MockSettlementContract, l1::MockL1Client, proving::MockProvingService,
        rollup::MockRollupNode, tx::MockTxManager,
    };
}
