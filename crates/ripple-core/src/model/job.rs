//! DDL jobs: the schema-change commands delivered by the upstream puller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::types::{JobId, SchemaId, TableId, Ts};

use super::{DbInfo, TableInfo};

/// The kind of schema change a DDL job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DdlJobKind {
    CreateSchema,
    DropSchema,
    ModifySchemaCharsetAndCollate,
    CreateTable,
    DropTable,
    CreateView,
    DropView,
    RecoverTable,
    RenameTable,
    RenameTables,
    TruncateTable,
    AddTablePartition,
    DropTablePartition,
    TruncateTablePartition,
    AddColumn,
    DropColumn,
    ModifyColumn,
    AddIndex,
    DropIndex,
    SetDefaultValue,
    ModifyTableCharsetAndCollate,
    /// A kind this version does not recognize. Handled by the generic
    /// table-replace path when the job carries a table payload.
    #[serde(other)]
    Unknown,
}

/// Upstream lifecycle state of a DDL job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Queueing,
    Running,
    RollingBack,
    RollbackDone,
    Cancelled,
    Done,
    Synced,
}

impl JobState {
    /// The upstream emits one record per state transition of a job; only
    /// the Done and Synced records reflect a committed schema change.
    pub fn is_effective(&self) -> bool {
        matches!(self, JobState::Done | JobState::Synced)
    }
}

/// One schema-change command, stamped with the commit timestamp at which
/// it became visible at the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdlJob {
    pub id: JobId,
    pub kind: DdlJobKind,
    pub state: JobState,
    pub schema_id: SchemaId,
    /// May be empty on arrival; the catalog fills it from snapshot state.
    #[serde(default)]
    pub schema_name: String,
    /// For targeted kinds. On truncate this is the old table id; the new
    /// id travels in `table_info`.
    #[serde(default)]
    pub table_id: TableId,
    /// Original SQL text. Opaque; logged only.
    #[serde(default)]
    pub query: String,
    pub finished_ts: Ts,
    #[serde(default)]
    pub db_info: Option<Arc<DbInfo>>,
    #[serde(default)]
    pub table_info: Option<Arc<TableInfo>>,
    /// Payload of a multi-table rename, parallel to the decoded id arrays.
    #[serde(default)]
    pub multiple_table_infos: Vec<Arc<TableInfo>>,
    /// Kind-specific arguments, still in the source's raw encoding.
    #[serde(default)]
    pub raw_args: serde_json::Value,
}

/// Decoded arguments of a `RenameTables` job: five parallel arrays
/// describing where each renamed table came from and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameTablesArgs {
    pub old_schema_ids: Vec<SchemaId>,
    pub new_schema_ids: Vec<SchemaId>,
    pub new_table_names: Vec<String>,
    pub old_table_ids: Vec<TableId>,
    pub old_schema_names: Vec<String>,
}

impl RenameTablesArgs {
    /// Encode back into the raw wire form (an array of the five arrays).
    pub fn to_raw_args(&self) -> serde_json::Value {
        serde_json::json!([
            self.old_schema_ids,
            self.new_schema_ids,
            self.new_table_names,
            self.old_table_ids,
            self.old_schema_names,
        ])
    }
}

impl DdlJob {
    /// Decode the raw arguments of a `RenameTables` job.
    pub fn rename_tables_args(&self) -> Result<RenameTablesArgs> {
        type Raw = (
            Vec<SchemaId>,
            Vec<SchemaId>,
            Vec<String>,
            Vec<TableId>,
            Vec<String>,
        );
        let (old_schema_ids, new_schema_ids, new_table_names, old_table_ids, old_schema_names) =
            serde_json::from_value::<Raw>(self.raw_args.clone())
                .map_err(|_| SchemaError::InvalidDdlJob(self.id))?;
        Ok(RenameTablesArgs {
            old_schema_ids,
            new_schema_ids,
            new_table_names,
            old_table_ids,
            old_schema_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename_job(raw_args: serde_json::Value) -> DdlJob {
        DdlJob {
            id: 7,
            kind: DdlJobKind::RenameTables,
            state: JobState::Done,
            schema_id: 0,
            schema_name: String::new(),
            table_id: 0,
            query: String::new(),
            finished_ts: 11,
            db_info: None,
            table_info: None,
            multiple_table_infos: vec![],
            raw_args,
        }
    }

    #[test]
    fn test_rename_args_roundtrip() {
        let args = RenameTablesArgs {
            old_schema_ids: vec![1, 1],
            new_schema_ids: vec![1, 2],
            new_table_names: vec!["b".to_string(), "a".to_string()],
            old_table_ids: vec![100, 200],
            old_schema_names: vec!["db".to_string(), "db".to_string()],
        };
        let job = rename_job(args.to_raw_args());
        assert_eq!(job.rename_tables_args().unwrap(), args);
    }

    #[test]
    fn test_rename_args_malformed() {
        let job = rename_job(serde_json::json!({"not": "arrays"}));
        assert!(job.rename_tables_args().is_err());
    }

    #[test]
    fn test_effective_states() {
        assert!(JobState::Done.is_effective());
        assert!(JobState::Synced.is_effective());
        assert!(!JobState::Running.is_effective());
        assert!(!JobState::Cancelled.is_effective());
        assert!(!JobState::RollingBack.is_effective());
    }

    #[test]
    fn test_unknown_kind_deserializes() {
        let job: DdlJob = serde_json::from_value(serde_json::json!({
            "id": 1,
            "kind": "alter-storage-policy",
            "state": "done",
            "schema_id": 2,
            "finished_ts": 3,
        }))
        .unwrap();
        assert_eq!(job.kind, DdlJobKind::Unknown);
        assert_eq!(job.state, JobState::Done);
        assert!(job.table_info.is_none());
        assert!(job.raw_args.is_null());
    }
}
