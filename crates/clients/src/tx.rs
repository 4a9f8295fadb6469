use std::time::Duration;

use alloy::{
    network::{ReceiptResponse, TransactionBuilder},
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
};
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::TxError;

/// A transaction for the manager to sign, fund and send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCandidate {
    pub to: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

impl TxReceipt {
    /// Turns a reverted receipt into [`TxError::Reverted`].
    pub fn ensure_success(self) -> Result<Self, TxError> {
        if self.success {
            Ok(self)
        } else {
            Err(TxError::Reverted {
                tx_hash: self.tx_hash,
            })
        }
    }
}

/// Sends signed L1 transactions and waits for their receipts.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait TxManager: Send + Sync + 'static {
    /// Sends `candidate` and returns its receipt, reverted or not.
    async fn send(&self, candidate: TxCandidate) -> Result<TxReceipt, TxError>;

    /// L1 head as seen by the manager's endpoint.
    async fn block_number(&self) -> Result<u64, TxError>;
}

#[derive(Debug, Clone)]
pub struct AlloyTxManager {
    provider: DynProvider,
    receipt_timeout: Duration,
}

impl AlloyTxManager {
    /// `provider` must carry a wallet filler.
    pub fn new(provider: DynProvider, receipt_timeout: Duration) -> Self {
        Self {
            provider,
            receipt_timeout,
        }
    }
}

#[async_trait]
impl TxManager for AlloyTxManager {
    async fn send(&self, candidate: TxCandidate) -> Result<TxReceipt, TxError> {
        let request = TransactionRequest::default()
            .with_to(candidate.to)
            .with_input(candidate.data);

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| TxError::Rejected(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, to = %candidate.to, "sent transaction");

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| TxError::Receipt(e.to_string()))?;

        let success = receipt.status();
        if !success {
            warn!(%tx_hash, "transaction reverted");
        }

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash(),
            success,
            block_number: receipt.block_number(),
        })
    }

    async fn block_number(&self) -> Result<u64, TxError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| TxError::Head(e.to_string()))
    }
}
