//! Schema image records: databases, tables, columns, indexes, partitions.
//!
//! `DbInfo` and `TableInfo` mirror what the source database reports and are
//! opaque to the catalog apart from the replication-eligibility predicate.
//! [`TableEntry`] wraps a `TableInfo` with the schema context a snapshot
//! needs for reverse lookups.

pub mod job;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{SchemaId, TableId, TableName, Ts};

/// A database (schema) record. Collation metadata is carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbInfo {
    pub id: SchemaId,
    pub name: String,
    #[serde(default)]
    pub charset: String,
    #[serde(default)]
    pub collate: String,
}

/// A column of a source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub not_null: bool,
    /// Member of the table's primary key.
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

/// An index of a source table. Columns are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary: bool,
}

/// One physical partition of a logical table. The id is drawn from the
/// same space as table ids and is independently addressable for event
/// routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionDefinition {
    pub id: TableId,
    pub name: String,
}

/// The partition layout of a partitioned table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub definitions: Vec<PartitionDefinition>,
}

/// Raw table structure as reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    #[serde(default)]
    pub charset: String,
    #[serde(default)]
    pub collate: String,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub indices: Vec<IndexInfo>,
    #[serde(default)]
    pub partition: Option<PartitionInfo>,
    #[serde(default)]
    pub is_view: bool,
    #[serde(default)]
    pub is_sequence: bool,
    #[serde(default)]
    pub update_ts: Ts,
}

impl TableInfo {
    /// True if the table has a usable row identity: a primary-key column,
    /// or a unique index whose columns are all `NOT NULL`.
    fn has_row_identity(&self) -> bool {
        if self.columns.iter().any(|c| c.primary_key) {
            return true;
        }
        self.indices.iter().any(|idx| {
            (idx.primary || idx.unique)
                && !idx.columns.is_empty()
                && idx
                    .columns
                    .iter()
                    .all(|name| self.columns.iter().any(|c| c.name == *name && c.not_null))
        })
    }
}

/// A table registered in a snapshot: the raw [`TableInfo`] wrapped with the
/// owning schema's context and the commit timestamp of the DDL that
/// produced this version. Entries are immutable after construction and
/// reference-shared across snapshots.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub schema_id: SchemaId,
    pub schema_name: String,
    pub name: TableName,
    /// Commit timestamp of the DDL that produced this version.
    pub version: Ts,
    pub info: Arc<TableInfo>,
    row_identity: bool,
}

impl TableEntry {
    /// Wrap a raw table structure with its schema context.
    pub fn wrap(schema_id: SchemaId, schema_name: &str, version: Ts, info: Arc<TableInfo>) -> Self {
        let row_identity = info.has_row_identity();
        Self {
            schema_id,
            schema_name: schema_name.to_string(),
            name: TableName::new(schema_name, info.name.as_str()),
            version,
            info,
            row_identity,
        }
    }

    pub fn id(&self) -> TableId {
        self.info.id
    }

    pub fn is_view(&self) -> bool {
        self.info.is_view
    }

    pub fn is_sequence(&self) -> bool {
        self.info.is_sequence
    }

    /// Whether downstream replication can handle this table.
    ///
    /// Sequences are never eligible, even under `force_replicate`. Views
    /// are always eligible; anything else needs a usable row identity
    /// unless `force_replicate` overrides.
    pub fn is_eligible(&self, force_replicate: bool) -> bool {
        if self.info.is_sequence {
            return false;
        }
        force_replicate || self.info.is_view || self.row_identity
    }

    /// The partition layout, or `None` for an unpartitioned table.
    pub fn partition_info(&self) -> Option<&PartitionInfo> {
        self.info.partition.as_ref()
    }
}
