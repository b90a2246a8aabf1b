//! Bootstrap catalog loader contract.
//!
//! At construction the storage reads the source's full catalog once to
//! build the initial snapshot. Everything after that comes from the DDL
//! job stream; the loader is never consulted again.

use crate::error::MetaError;
use crate::model::{DbInfo, TableInfo};
use crate::types::SchemaId;

/// Read-only view of the source catalog at the storage's start timestamp.
pub trait SchemaMeta {
    /// List every database in the source catalog.
    fn list_databases(&self) -> Result<Vec<DbInfo>, MetaError>;

    /// List every table belonging to the given database.
    fn list_tables(&self, schema_id: SchemaId) -> Result<Vec<TableInfo>, MetaError>;
}
