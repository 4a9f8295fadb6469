use proposer_db_types::{StoreError, StoreResult};

pub(crate) fn to_store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed => StoreError::Closed,
        err => StoreError::Backend(err.to_string()),
    }
}

/// SQLite integers are signed; block numbers and timestamps must fit.
pub(crate) fn to_sql_int(value: u64) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Decode(format!("{value} exceeds the sqlite integer range")))
}

pub(crate) fn from_sql_int(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Decode(format!("negative integer {value}")))
}
