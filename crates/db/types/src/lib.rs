//! Proof request data model, lifecycle state machine and the [`ProofStore`] interface.

pub mod errors;
pub mod traits;
pub mod types;

pub use errors::{InvalidTransition, StoreError, StoreResult};
pub use traits::ProofStore;
pub use types::{
    AggCreation, BlockRange, L1Checkpoint, ProofEvent, ProofKind, ProofRequest, ProofRequestId,
    ProofStatus,
};
