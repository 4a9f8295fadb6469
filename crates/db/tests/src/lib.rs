//! Backend-agnostic tests for [`proposer_db_types::ProofStore`] implementations.
//!
//! Each module exposes the test bodies as generic functions plus a macro that stamps them out
//! as `#[tokio::test]`s for a concrete store.

pub mod invariant_tests;
pub mod proof_store_tests;
