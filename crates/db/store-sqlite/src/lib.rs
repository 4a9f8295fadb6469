//! SQLite store for the proof request queue.

mod config;
mod row;
mod schema;
mod store;
mod utils;

pub use config::{db_file_path, SqliteStoreConfig, DB_FILE_NAME};
pub use store::SqliteProofStore;
