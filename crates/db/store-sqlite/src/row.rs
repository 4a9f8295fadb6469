use alloy_primitives::B256;
use proposer_db_types::{ProofRequest, StoreError};
use sqlx::FromRow;

use crate::utils::from_sql_int;

/// Raw `proof_request` row as SQLite hands it back.
#[derive(Debug, FromRow)]
pub(crate) struct ProofRequestRow {
    id: i64,
    kind: String,
    start_block: i64,
    end_block: i64,
    status: String,
    request_added_time: i64,
    proof_request_time: Option<i64>,
    last_updated_time: i64,
    prover_request_id: Option<String>,
    l1_block_number: Option<i64>,
    l1_block_hash: Option<Vec<u8>>,
    proof: Option<Vec<u8>>,
    retry_of: Option<i64>,
}

impl TryFrom<ProofRequestRow> for ProofRequest {
    type Error = StoreError;

    fn try_from(row: ProofRequestRow) -> Result<Self, Self::Error> {
        let l1_block_hash = row
            .l1_block_hash
            .map(|bytes| {
                B256::try_from(bytes.as_slice()).map_err(|_| {
                    StoreError::Decode(format!(
                        "l1_block_hash of request {} has {} bytes",
                        row.id,
                        bytes.len()
                    ))
                })
            })
            .transpose()?;

        Ok(ProofRequest {
            id: row.id,
            kind: row.kind.parse()?,
            start_block: from_sql_int(row.start_block)?,
            end_block: from_sql_int(row.end_block)?,
            status: row.status.parse()?,
            request_added_time: from_sql_int(row.request_added_time)?,
            proof_request_time: row.proof_request_time.map(from_sql_int).transpose()?,
            last_updated_time: from_sql_int(row.last_updated_time)?,
            prover_request_id: row.prover_request_id,
            l1_block_number: row.l1_block_number.map(from_sql_int).transpose()?,
            l1_block_hash,
            proof: row.proof,
            retry_of: row.retry_of,
        })
    }
}

/// Bounds and proof of a COMPLETE range row.
#[derive(Debug, FromRow)]
pub(crate) struct RangeProofRow {
    pub(crate) start_block: i64,
    pub(crate) end_block: i64,
    pub(crate) proof: Option<Vec<u8>>,
}
