//! Table layout of the proof request queue.

use proposer_db_types::StoreResult;
use sqlx::SqlitePool;

use crate::utils::to_store_error;

pub(crate) const CREATE_PROOF_REQUEST_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS proof_request (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    kind                TEXT    NOT NULL CHECK (kind IN ('RANGE', 'AGG')),
    start_block         INTEGER NOT NULL,
    end_block           INTEGER NOT NULL CHECK (end_block >= start_block),
    status              TEXT    NOT NULL,
    request_added_time  INTEGER NOT NULL,
    proof_request_time  INTEGER,
    last_updated_time   INTEGER NOT NULL,
    prover_request_id   TEXT,
    l1_block_number     INTEGER,
    l1_block_hash       BLOB,
    proof               BLOB,
    retry_of            INTEGER REFERENCES proof_request (id)
)
"#;

const CREATE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS proof_request_status ON proof_request (status, kind)",
    "CREATE INDEX IF NOT EXISTS proof_request_start ON proof_request (kind, start_block)",
    "CREATE INDEX IF NOT EXISTS proof_request_retry_of ON proof_request (retry_of)",
];

pub(crate) async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(CREATE_PROOF_REQUEST_TABLE)
        .execute(pool)
        .await
        .map_err(to_store_error)?;

    for stmt in CREATE_INDEXES {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(to_store_error)?;
    }

    Ok(())
}
