//! Error types for all schema catalog operations.

use thiserror::Error;

use crate::types::{JobId, SchemaId, TableId, Ts};

/// Opaque error reported by a bootstrap catalog loader.
pub type MetaError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for schema storage operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// True if the caller may retry the failed operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_retryable())
    }
}

/// Errors raised while applying a DDL job to a snapshot.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema not found: {0}")]
    SchemaNotFound(SchemaId),

    #[error("schema already exists: {name}({id})")]
    SchemaExists { name: String, id: SchemaId },

    #[error("table not found: {0}")]
    TableNotFound(TableId),

    #[error("table already exists: {schema}.{table}")]
    TableExists { schema: String, table: String },

    #[error("invalid DDL job: {0}")]
    InvalidDdlJob(JobId),
}

/// Errors raised by the storage facade and its history.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot at ts {ts} already garbage-collected (gc ts {gc_ts})")]
    Gced { ts: Ts, gc_ts: Ts },

    #[error("snapshot at ts {ts} not yet resolved (resolved ts {resolved_ts})")]
    Unresolved { ts: Ts, resolved_ts: Ts },

    #[error("no snapshot found for ts {0}")]
    SnapshotNotFound(Ts),

    #[error("snapshot lookup cancelled")]
    Cancelled,

    #[error("list databases from source meta: {0}")]
    MetaListDatabases(#[source] MetaError),
}

impl StorageError {
    /// Only an unresolved lookup is worth retrying; every other error is
    /// returned to the caller to escalate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unresolved { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
