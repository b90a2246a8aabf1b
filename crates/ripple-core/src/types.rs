//! Core types: commit timestamps, source-side identifiers, table names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Commit timestamp assigned by the source database.
///
/// DDL jobs arrive stamped with a monotonically non-decreasing commit
/// timestamp, and every snapshot is filed under the timestamp of the DDL
/// that produced it.
pub type Ts = u64;

/// Stable schema (database) identifier assigned by the source.
pub type SchemaId = i64;

/// Stable table identifier assigned by the source.
///
/// Partition ids share this id space: each physical partition of a
/// partitioned table is independently addressable by a `TableId`.
pub type TableId = i64;

/// DDL job identifier.
pub type JobId = i64;

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
