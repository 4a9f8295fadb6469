use std::{fs, io, path::Path, str::FromStr, sync::Arc, time::Duration};

use alloy_primitives::B256;
use async_trait::async_trait;
use proposer_common::Clock;
use proposer_db_types::{
    AggCreation, BlockRange, ProofEvent, ProofKind, ProofRequest, ProofRequestId, ProofStatus,
    ProofStore, StoreError, StoreResult,
};
use sqlx::{
    sqlite::{
        SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
    SqlitePool,
};
use tracing::{debug, info};

use crate::{
    config::SqliteStoreConfig,
    row::{ProofRequestRow, RangeProofRow},
    schema::init_schema,
    utils::{from_sql_int, to_sql_int, to_store_error},
};

/// [`ProofStore`] backed by a single-connection SQLite pool.
///
/// One connection means every transaction runs alone, which gives the serialisable semantics the
/// aggregation and fulfilment paths rely on.
#[derive(Debug)]
pub struct SqliteProofStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    witnessgen_timeout: Duration,
}

impl SqliteProofStore {
    /// Opens (and unless cached, recreates) the database described by `config`.
    pub async fn open(config: SqliteStoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let options = match &config.path {
            Some(path) => {
                if !config.use_cached_db {
                    remove_db_files(path)
                        .map_err(|e| StoreError::Backend(format!("resetting database: {e}")))?;
                }
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir).map_err(|e| {
                        StoreError::Backend(format!("creating {}: {e}", dir.display()))
                    })?;
                }

                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
            }
            None => SqliteConnectOptions::from_str("sqlite::memory:").map_err(to_store_error)?,
        }
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);

        // The in-memory database lives as long as its only connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(to_store_error)?;

        init_schema(&pool).await?;

        info!(
            path = ?config.path,
            use_cached_db = config.use_cached_db,
            "opened proof store"
        );

        Ok(Self {
            pool,
            clock,
            witnessgen_timeout: config.witnessgen_timeout,
        })
    }

    /// Private in-memory store, mostly for tests.
    pub async fn open_in_memory(clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Self::open(SqliteStoreConfig::in_memory(), clock).await
    }

    fn now(&self) -> StoreResult<i64> {
        to_sql_int(self.clock.now_secs())
    }

    async fn fetch_many(&self, sql: &str, binds: &[i64]) -> StoreResult<Vec<ProofRequest>> {
        let mut query = sqlx::query_as::<_, ProofRequestRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(to_store_error)?;
        rows.into_iter().map(ProofRequest::try_from).collect()
    }
}

fn remove_db_files(path: &Path) -> io::Result<()> {
    let mut names = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        names.push(name.into());
    }

    for name in names {
        match fs::remove_file(&name) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

async fn fetch_request(
    conn: &mut SqliteConnection,
    id: ProofRequestId,
) -> StoreResult<ProofRequest> {
    let row = sqlx::query_as::<_, ProofRequestRow>("SELECT * FROM proof_request WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(to_store_error)?;

    row.ok_or(StoreError::NotFound(id))?.try_into()
}

async fn live_agg_at(conn: &mut SqliteConnection, start: u64) -> StoreResult<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM proof_request \
         WHERE kind = 'AGG' AND start_block = ? AND status != 'FAILED' \
         LIMIT 1",
    )
    .bind(to_sql_int(start)?)
    .fetch_optional(&mut *conn)
    .await
    .map_err(to_store_error)?;

    Ok(row.map(|(id,)| id))
}

async fn insert_request(
    conn: &mut SqliteConnection,
    kind: ProofKind,
    range: BlockRange,
    now: i64,
    retry_of: Option<ProofRequestId>,
) -> StoreResult<ProofRequestId> {
    let result = sqlx::query(
        r#"
        INSERT INTO proof_request (
            kind, start_block, end_block, status,
            request_added_time, last_updated_time, retry_of
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(kind.as_str())
    .bind(to_sql_int(range.start)?)
    .bind(to_sql_int(range.end)?)
    .bind(ProofStatus::Unrequested.as_str())
    .bind(now)
    .bind(now)
    .bind(retry_of)
    .execute(&mut *conn)
    .await
    .map_err(to_store_error)?;

    let id = result.last_insert_rowid();
    debug!(id, %kind, start = range.start, end = range.end, ?retry_of, "queued proof request");
    Ok(id)
}

async fn contiguous_end(conn: &mut SqliteConnection, start: u64) -> StoreResult<u64> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT start_block, end_block FROM proof_request \
         WHERE kind = 'RANGE' AND status = 'COMPLETE' AND start_block >= ? \
         ORDER BY start_block",
    )
    .bind(to_sql_int(start)?)
    .fetch_all(&mut *conn)
    .await
    .map_err(to_store_error)?;

    let mut next = start;
    for (row_start, row_end) in rows {
        if from_sql_int(row_start)? != next {
            break;
        }
        next = from_sql_int(row_end)? + 1;
    }
    Ok(next.saturating_sub(1))
}

#[async_trait]
impl ProofStore for SqliteProofStore {
    async fn create(&self, kind: ProofKind, start: u64, end: u64) -> StoreResult<ProofRequestId> {
        let range = BlockRange::new(start, end).ok_or(StoreError::InvalidRange { start, end })?;
        let now = self.now()?;

        let mut tx = self.pool.begin().await.map_err(to_store_error)?;
        if kind == ProofKind::Agg {
            if let Some(existing) = live_agg_at(&mut tx, start).await? {
                return Err(StoreError::DuplicateAgg { start, existing });
            }
        }
        let id = insert_request(&mut tx, kind, range, now, None).await?;
        tx.commit().await.map_err(to_store_error)?;

        Ok(id)
    }

    async fn get(&self, id: ProofRequestId) -> StoreResult<Option<ProofRequest>> {
        let row = sqlx::query_as::<_, ProofRequestRow>("SELECT * FROM proof_request WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_store_error)?;

        row.map(ProofRequest::try_from).transpose()
    }

    async fn update_status(&self, id: ProofRequestId, status: ProofStatus) -> StoreResult<()> {
        let event = match ProofEvent::toward(status) {
            Some(ProofEvent::Fulfilled) | None => {
                return Err(StoreError::UnsupportedTarget(id, status))
            }
            Some(event) => event,
        };
        let now = self.now()?;

        let mut tx = self.pool.begin().await.map_err(to_store_error)?;
        let req = fetch_request(&mut tx, id).await?;
        let next = req
            .status
            .apply(event)
            .map_err(|e| StoreError::InvalidTransition(id, e))?;

        if req.kind == ProofKind::Agg
            && req.status == ProofStatus::Unrequested
            && req.l1_checkpoint().is_none()
        {
            return Err(StoreError::MissingL1Checkpoint(id));
        }

        sqlx::query("UPDATE proof_request SET status = ?, last_updated_time = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(to_store_error)?;
        tx.commit().await.map_err(to_store_error)?;

        debug!(id, from = %req.status, to = %next, "proof request status changed");
        Ok(())
    }

    async fn set_prover_id(&self, id: ProofRequestId, prover_id: &str) -> StoreResult<()> {
        let now = self.now()?;
        let result = sqlx::query(
            "UPDATE proof_request \
             SET prover_request_id = ?, proof_request_time = ?, last_updated_time = ? \
             WHERE id = ?",
        )
        .bind(prover_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(to_store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn assign_prover(&self, id: ProofRequestId, prover_id: &str) -> StoreResult<()> {
        let now = self.now()?;

        let mut tx = self.pool.begin().await.map_err(to_store_error)?;
        let req = fetch_request(&mut tx, id).await?;
        let next = req
            .status
            .apply(ProofEvent::ProverAssigned)
            .map_err(|e| StoreError::InvalidTransition(id, e))?;

        sqlx::query(
            "UPDATE proof_request \
             SET status = ?, prover_request_id = ?, proof_request_time = ?, last_updated_time = ? \
             WHERE id = ?",
        )
        .bind(next.as_str())
        .bind(prover_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(to_store_error)?;
        tx.commit().await.map_err(to_store_error)?;

        debug!(id, %prover_id, "proof request assigned to prover");
        Ok(())
    }

    async fn attach_l1_checkpoint(
        &self,
        start: u64,
        end: u64,
        l1_block_number: u64,
        l1_block_hash: B256,
    ) -> StoreResult<()> {
        let now = self.now()?;
        let result = sqlx::query(
            "UPDATE proof_request \
             SET l1_block_number = ?, l1_block_hash = ?, last_updated_time = ? \
             WHERE kind = 'AGG' AND status = 'UNREQ' AND start_block = ? AND end_block = ?",
        )
        .bind(to_sql_int(l1_block_number)?)
        .bind(l1_block_hash.as_slice())
        .bind(now)
        .bind(to_sql_int(start)?)
        .bind(to_sql_int(end)?)
        .execute(&self.pool)
        .await
        .map_err(to_store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NoPendingAgg { start, end });
        }
        Ok(())
    }

    async fn add_fulfilled_proof(&self, id: ProofRequestId, proof: &[u8]) -> StoreResult<()> {
        if proof.is_empty() {
            return Err(StoreError::EmptyProof(id));
        }
        let now = self.now()?;

        let mut tx = self.pool.begin().await.map_err(to_store_error)?;
        let req = fetch_request(&mut tx, id).await?;
        if req.proof.is_some() {
            return Err(StoreError::ProofAlreadyStored(id));
        }
        let next = req
            .status
            .apply(ProofEvent::Fulfilled)
            .map_err(|e| StoreError::InvalidTransition(id, e))?;

        if req.kind == ProofKind::Range {
            let overlapping: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM proof_request \
                 WHERE kind = 'RANGE' AND status = 'COMPLETE' \
                   AND start_block <= ? AND end_block >= ? AND id != ? \
                 LIMIT 1",
            )
            .bind(to_sql_int(req.end_block)?)
            .bind(to_sql_int(req.start_block)?)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(to_store_error)?;

            if let Some((existing,)) = overlapping {
                return Err(StoreError::OverlappingRange { id, existing });
            }
        }

        sqlx::query(
            "UPDATE proof_request SET proof = ?, status = ?, last_updated_time = ? WHERE id = ?",
        )
        .bind(proof)
        .bind(next.as_str())
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(to_store_error)?;
        tx.commit().await.map_err(to_store_error)?;

        debug!(id, kind = %req.kind, start = req.start_block, end = req.end_block, "proof request complete");
        Ok(())
    }

    async fn create_retry(
        &self,
        parent: ProofRequestId,
        ranges: &[BlockRange],
    ) -> StoreResult<Vec<ProofRequestId>> {
        let now = self.now()?;

        let mut tx = self.pool.begin().await.map_err(to_store_error)?;
        let req = fetch_request(&mut tx, parent).await?;
        if req.status != ProofStatus::Failed {
            return Err(StoreError::RetryOfNonFailed(parent));
        }
        for range in ranges {
            if !req.range().contains(range) {
                return Err(StoreError::RetryOutOfBounds {
                    parent,
                    start: range.start,
                    end: range.end,
                });
            }
        }

        let (children,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM proof_request WHERE retry_of = ?")
                .bind(parent)
                .fetch_one(&mut *tx)
                .await
                .map_err(to_store_error)?;
        if children > 0 {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(ranges.len());
        for range in ranges {
            // A live aggregation for the same first block already supersedes this retry.
            if req.kind == ProofKind::Agg && live_agg_at(&mut tx, range.start).await?.is_some() {
                continue;
            }
            ids.push(insert_request(&mut tx, req.kind, *range, now, Some(parent)).await?);
        }
        tx.commit().await.map_err(to_store_error)?;

        Ok(ids)
    }

    async fn latest_end_block(&self) -> StoreResult<Option<u64>> {
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(end_block) FROM proof_request")
            .fetch_one(&self.pool)
            .await
            .map_err(to_store_error)?;

        max.map(from_sql_int).transpose()
    }

    async fn next_unrequested(&self) -> StoreResult<Option<ProofRequest>> {
        let row = sqlx::query_as::<_, ProofRequestRow>(
            "SELECT * FROM proof_request WHERE status = 'UNREQ' \
             ORDER BY CASE kind WHEN 'AGG' THEN 0 ELSE 1 END, request_added_time, id \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(to_store_error)?;

        row.map(ProofRequest::try_from).transpose()
    }

    async fn pending_proofs(&self) -> StoreResult<Vec<ProofRequest>> {
        self.fetch_many(
            "SELECT * FROM proof_request \
             WHERE status = 'PROVING' AND prover_request_id IS NOT NULL \
             ORDER BY id",
            &[],
        )
        .await
    }

    async fn witnessgen_timed_out(&self) -> StoreResult<Vec<ProofRequest>> {
        let cutoff = self
            .clock
            .now_secs()
            .saturating_sub(self.witnessgen_timeout.as_secs());

        self.fetch_many(
            "SELECT * FROM proof_request \
             WHERE status = 'WITNESSGEN' AND prover_request_id IS NULL AND last_updated_time < ? \
             ORDER BY id",
            &[to_sql_int(cutoff)?],
        )
        .await
    }

    async fn rows_with_status(&self, status: ProofStatus) -> StoreResult<Vec<ProofRequest>> {
        let rows = sqlx::query_as::<_, ProofRequestRow>(
            "SELECT * FROM proof_request WHERE status = ? ORDER BY id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(to_store_error)?;

        rows.into_iter().map(ProofRequest::try_from).collect()
    }

    async fn failed_without_dispatch(&self) -> StoreResult<Vec<ProofRequest>> {
        self.fetch_many(
            "SELECT * FROM proof_request AS p \
             WHERE p.status = 'FAILED' AND p.prover_request_id IS NULL \
               AND NOT EXISTS (SELECT 1 FROM proof_request AS c WHERE c.retry_of = p.id) \
             ORDER BY p.id",
            &[],
        )
        .await
    }

    async fn count_with_status(&self, statuses: &[ProofStatus]) -> StoreResult<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!("SELECT COUNT(*) FROM proof_request WHERE status IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let (count,) = query.fetch_one(&self.pool).await.map_err(to_store_error)?;

        from_sql_int(count)
    }

    async fn completed_aggs_from(&self, start: u64) -> StoreResult<Vec<ProofRequest>> {
        self.fetch_many(
            "SELECT * FROM proof_request \
             WHERE kind = 'AGG' AND status = 'COMPLETE' AND start_block = ? \
             ORDER BY id",
            &[to_sql_int(start)?],
        )
        .await
    }

    async fn max_contiguous_range_end(&self, start: u64) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(to_store_error)?;
        contiguous_end(&mut conn, start).await
    }

    async fn consecutive_range_proofs(&self, start: u64, end: u64) -> StoreResult<Vec<Vec<u8>>> {
        if start > end {
            return Err(StoreError::InvalidRange { start, end });
        }

        let rows = sqlx::query_as::<_, RangeProofRow>(
            "SELECT start_block, end_block, proof FROM proof_request \
             WHERE kind = 'RANGE' AND status = 'COMPLETE' AND end_block >= ? AND start_block <= ? \
             ORDER BY start_block",
        )
        .bind(to_sql_int(start)?)
        .bind(to_sql_int(end)?)
        .fetch_all(&self.pool)
        .await
        .map_err(to_store_error)?;

        let mut next = start;
        let mut proofs = Vec::with_capacity(rows.len());
        for row in rows {
            let row_start = from_sql_int(row.start_block)?;
            let row_end = from_sql_int(row.end_block)?;
            if row_start != next {
                return Err(StoreError::Gap {
                    expected: next,
                    found: row_start,
                });
            }
            if row_end > end {
                break;
            }
            let proof = row.proof.ok_or_else(|| {
                StoreError::Decode(format!("complete range [{row_start}, {row_end}] has no proof"))
            })?;
            proofs.push(proof);
            next = row_end + 1;
        }

        if next <= end {
            return Err(StoreError::Incomplete {
                covered_to: next.saturating_sub(1),
                end,
            });
        }
        Ok(proofs)
    }

    async fn try_create_agg(&self, start: u64, min_end: u64) -> StoreResult<AggCreation> {
        let now = self.now()?;

        let mut tx = self.pool.begin().await.map_err(to_store_error)?;
        if let Some(id) = live_agg_at(&mut tx, start).await? {
            return Ok(AggCreation::AlreadyExists { id });
        }

        let max_end = contiguous_end(&mut tx, start).await?;
        let range = match BlockRange::new(start, max_end) {
            Some(range) if max_end >= min_end => range,
            _ => return Ok(AggCreation::InsufficientCoverage { max_end }),
        };

        let id = insert_request(&mut tx, ProofKind::Agg, range, now, None).await?;
        tx.commit().await.map_err(to_store_error)?;

        Ok(AggCreation::Created { id, end: max_end })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
