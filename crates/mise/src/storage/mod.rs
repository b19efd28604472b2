//! LanceDB-backed storage
//!
//! One LanceDB database under `storage.data_dir` holds both the chunk
//! index used for retrieval and the per-user memory documents.

pub mod chunks;
pub mod users;

use std::path::Path;

use lancedb::connection::Connection;

use crate::error::{MiseError, Result};

pub use chunks::{CHUNKS_TABLE, ChunkIndex, IndexedChunk};
pub use users::{LanceMemoryStore, USER_MEMORIES_TABLE};

/// Open (or create) the LanceDB database at `path`
pub async fn connect(path: &Path) -> Result<Connection> {
    let uri = path
        .to_str()
        .ok_or_else(|| MiseError::StoreUnavailable("Invalid path encoding".to_string()))?;

    lancedb::connect(uri)
        .execute()
        .await
        .map_err(|e| MiseError::StoreUnavailable(format!("Failed to connect to LanceDB: {e}")))
}

/// Whether a table with this name exists in the database
pub async fn table_exists(connection: &Connection, name: &str) -> Result<bool> {
    let names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| MiseError::StoreUnavailable(format!("Failed to list tables: {e}")))?;

    Ok(names.iter().any(|n| n == name))
}

/// Quote a value as a SQL string literal for LanceDB filter and update expressions
pub(crate) fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
