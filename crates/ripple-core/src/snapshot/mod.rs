//! Point-in-time schema snapshots.
//!
//! A [`SchemaSnapshot`] is a complete image of the source schema at one
//! commit timestamp. Snapshots are read-only once published: applying a
//! DDL clones the latest snapshot and mutates the clone, so every index
//! container is owned per snapshot while the inner records ([`DbInfo`],
//! [`TableEntry`]) are `Arc`-shared across versions.

mod ops;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, SchemaError, StorageError};
use crate::meta::SchemaMeta;
use crate::model::job::{DdlJob, DdlJobKind};
use crate::model::{DbInfo, TableEntry};
use crate::types::{SchemaId, TableId, TableName, Ts};

/// The full schema image at one commit timestamp.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    table_name_to_id: HashMap<TableName, TableId>,
    schema_name_to_id: HashMap<String, SchemaId>,

    schemas: HashMap<SchemaId, Arc<DbInfo>>,
    tables: HashMap<TableId, Arc<TableEntry>>,
    /// Partition id to the owning logical table.
    partition_table: HashMap<TableId, Arc<TableEntry>>,

    /// Ordered table membership per schema.
    table_in_schema: HashMap<SchemaId, Vec<TableId>>,

    /// Old ids superseded by truncate operations, kept as dead-id markers.
    truncated_ids: HashSet<TableId>,
    /// Tables and partitions the consumer must skip.
    ineligible_ids: HashSet<TableId>,

    current_ts: Ts,
    force_replicate: bool,
}

impl SchemaSnapshot {
    /// An empty snapshot at ts 0.
    pub fn empty(force_replicate: bool) -> Self {
        Self {
            table_name_to_id: HashMap::new(),
            schema_name_to_id: HashMap::new(),
            schemas: HashMap::new(),
            tables: HashMap::new(),
            partition_table: HashMap::new(),
            table_in_schema: HashMap::new(),
            truncated_ids: HashSet::new(),
            ineligible_ids: HashSet::new(),
            current_ts: 0,
            force_replicate,
        }
    }

    /// Build the initial snapshot from the bootstrap catalog loader.
    pub fn from_meta(
        meta: &dyn SchemaMeta,
        current_ts: Ts,
        force_replicate: bool,
    ) -> Result<Self> {
        let mut snap = Self::empty(force_replicate);

        let dbs = meta
            .list_databases()
            .map_err(StorageError::MetaListDatabases)?;
        for db in dbs {
            let db = Arc::new(db);
            snap.schema_name_to_id.insert(db.name.clone(), db.id);
            snap.schemas.insert(db.id, db);
        }

        let schema_ids: Vec<SchemaId> = snap.schemas.keys().copied().collect();
        for schema_id in schema_ids {
            let db = snap.schemas[&schema_id].clone();
            let infos = meta
                .list_tables(schema_id)
                .map_err(StorageError::MetaListDatabases)?;
            let mut in_schema = Vec::with_capacity(infos.len());
            for info in infos {
                let entry = Arc::new(TableEntry::wrap(
                    db.id,
                    &db.name,
                    current_ts,
                    Arc::new(info),
                ));
                in_schema.push(entry.id());
                snap.table_name_to_id.insert(entry.name.clone(), entry.id());
                let eligible = entry.is_eligible(force_replicate);
                if !eligible {
                    snap.ineligible_ids.insert(entry.id());
                }
                if let Some(pi) = entry.partition_info() {
                    for part in &pi.definitions {
                        snap.partition_table.insert(part.id, entry.clone());
                        if !eligible {
                            snap.ineligible_ids.insert(part.id);
                        }
                    }
                }
                snap.tables.insert(entry.id(), entry);
            }
            snap.table_in_schema.insert(schema_id, in_schema);
        }

        snap.current_ts = current_ts;
        Ok(snap)
    }

    /// The commit timestamp this snapshot is filed under.
    pub fn current_ts(&self) -> Ts {
        self.current_ts
    }

    /// Name of the owning logical table, even when `id` is a partition id.
    pub fn table_name_by_id(&self, id: TableId) -> Option<TableName> {
        if let Some(entry) = self.tables.get(&id) {
            return Some(entry.name.clone());
        }
        // A registered partition always has its owning table registered too.
        let part = self.partition_table.get(&id)?;
        self.tables.get(&part.id()).map(|entry| entry.name.clone())
    }

    /// Table id for a schema-qualified name.
    pub fn table_id_by_name(&self, schema: &str, table: &str) -> Option<TableId> {
        self.table_name_to_id
            .get(&TableName::new(schema, table))
            .copied()
    }

    pub fn table_by_name(&self, schema: &str, table: &str) -> Option<&Arc<TableEntry>> {
        self.tables.get(&self.table_id_by_name(schema, table)?)
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&Arc<TableEntry>> {
        self.tables.get(&id)
    }

    /// Union lookup over tables and partitions: tables first, then the
    /// partition index.
    pub fn physical_table_by_id(&self, id: TableId) -> Option<&Arc<TableEntry>> {
        self.tables.get(&id).or_else(|| self.partition_table.get(&id))
    }

    pub fn schema_by_id(&self, id: SchemaId) -> Option<&Arc<DbInfo>> {
        self.schemas.get(&id)
    }

    /// The schema owning the given table id.
    pub fn schema_by_table_id(&self, table_id: TableId) -> Option<&Arc<DbInfo>> {
        let entry = self.tables.get(&table_id)?;
        let schema_id = self.schema_name_to_id.get(&entry.name.schema)?;
        self.schemas.get(schema_id)
    }

    /// True if the id was retired by a truncate operation.
    pub fn is_truncated(&self, id: TableId) -> bool {
        self.truncated_ids.contains(&id)
    }

    /// True if the table or partition id is ineligible for replication.
    pub fn is_ineligible(&self, id: TableId) -> bool {
        self.ineligible_ids.contains(&id)
    }

    /// Deep copy of the id-to-name mapping for external use.
    pub fn clone_table_names(&self) -> HashMap<TableId, TableName> {
        self.tables
            .iter()
            .map(|(&id, entry)| (id, entry.name.clone()))
            .collect()
    }

    /// Borrowed view of the full table map. The view is read-only; mutating
    /// the entries would corrupt every index derived from them.
    pub fn tables(&self) -> &HashMap<TableId, Arc<TableEntry>> {
        &self.tables
    }

    /// Populate `job.schema_name` from snapshot state.
    pub fn fill_schema_name(&self, job: &mut DdlJob) -> Result<()> {
        if job.kind == DdlJobKind::RenameTables {
            // Spans multiple schemas; names travel in the job arguments.
            return Ok(());
        }
        if matches!(job.kind, DdlJobKind::CreateSchema | DdlJobKind::DropSchema) {
            let db = job
                .db_info
                .as_ref()
                .ok_or(SchemaError::InvalidDdlJob(job.id))?;
            job.schema_name = db.name.clone();
            return Ok(());
        }
        let db = self
            .schema_by_id(job.schema_id)
            .ok_or(SchemaError::SchemaNotFound(job.schema_id))?;
        job.schema_name = db.name.clone();
        Ok(())
    }

    /// The table entry the given job is about to overwrite, if any.
    ///
    /// Schema-level, create-like, and multi-rename kinds have no
    /// pre-image. Targeted kinds fail with `TableNotFound` when the target
    /// is missing.
    pub fn pre_table_entry(&self, job: &DdlJob) -> Result<Option<Arc<TableEntry>>> {
        match job.kind {
            DdlJobKind::CreateSchema
            | DdlJobKind::ModifySchemaCharsetAndCollate
            | DdlJobKind::DropSchema => Ok(None),
            DdlJobKind::CreateTable | DdlJobKind::CreateView | DdlJobKind::RecoverTable => Ok(None),
            DdlJobKind::RenameTables => Ok(None),
            DdlJobKind::RenameTable
            | DdlJobKind::DropTable
            | DdlJobKind::DropView
            | DdlJobKind::TruncateTable => {
                let entry = self
                    .table_by_id(job.table_id)
                    .ok_or(SchemaError::TableNotFound(job.table_id))?;
                Ok(Some(entry.clone()))
            }
            _ => {
                let Some(info) = &job.table_info else {
                    warn!(job_id = job.id, kind = ?job.kind, query = %job.query, "ignoring invalid DDL job");
                    return Ok(None);
                };
                let entry = self
                    .table_by_id(info.id)
                    .ok_or(SchemaError::TableNotFound(info.id))?;
                Ok(Some(entry.clone()))
            }
        }
    }

    /// Dump the full snapshot state through the log, cross-checking both
    /// name indices along the way.
    pub fn log_status(&self) {
        debug!(current_ts = self.current_ts, "schema snapshot status");
        for (id, db) in &self.schemas {
            debug!(schema_id = id, name = %db.name, "--> schema");
            match self.schema_name_to_id.get(&db.name) {
                Some(mapped) if mapped == id => {}
                other => {
                    debug!(name = %db.name, mapped = ?other, "----> schema name index entry lost")
                }
            }
        }
        if self.schema_name_to_id.len() != self.schemas.len() {
            debug!("schema name index length mismatches schemas");
            for (name, id) in &self.schema_name_to_id {
                debug!(name = %name, schema_id = id, "--> schema name index");
            }
        }
        for (id, entry) in &self.tables {
            debug!(table_id = id, name = %entry.name, "--> table");
            match self.table_name_to_id.get(&entry.name) {
                Some(mapped) if mapped == id => {}
                other => {
                    debug!(name = %entry.name, mapped = ?other, "----> table name index entry lost")
                }
            }
        }
        if self.table_name_to_id.len() != self.tables.len() {
            debug!("table name index length mismatches tables");
            for (name, id) in &self.table_name_to_id {
                debug!(name = %name, table_id = id, "--> table name index");
            }
        }
        for (pid, entry) in &self.partition_table {
            debug!(partition_id = pid, table_id = entry.id(), "--> partition");
        }
        let mut truncated: Vec<TableId> = self.truncated_ids.iter().copied().collect();
        truncated.sort_unstable();
        debug!(ids = ?truncated, "truncated ids");
        let mut ineligible: Vec<TableId> = self.ineligible_ids.iter().copied().collect();
        ineligible.sort_unstable();
        debug!(ids = ?ineligible, "ineligible ids");
    }
}

#[cfg(test)]
impl SchemaSnapshot {
    /// Assert the structural invariants that must hold after every DDL.
    pub(crate) fn assert_invariants(&self) {
        assert_eq!(
            self.schema_name_to_id.len(),
            self.schemas.len(),
            "schema name index out of sync"
        );
        for (id, db) in &self.schemas {
            assert_eq!(self.schema_name_to_id.get(&db.name), Some(id));
        }
        assert_eq!(
            self.table_name_to_id.len(),
            self.tables.len(),
            "table name index out of sync"
        );
        for (id, entry) in &self.tables {
            assert_eq!(self.table_name_to_id.get(&entry.name), Some(id));
        }
        // Every table appears in exactly one membership list, under its
        // owning schema.
        for (id, entry) in &self.tables {
            let members = self
                .table_in_schema
                .get(&entry.schema_id)
                .unwrap_or_else(|| panic!("schema {} has no membership list", entry.schema_id));
            assert_eq!(
                members.iter().filter(|&&t| t == *id).count(),
                1,
                "table {id} membership"
            );
            for (other_schema, members) in &self.table_in_schema {
                if *other_schema != entry.schema_id {
                    assert!(!members.contains(id), "table {id} in foreign schema list");
                }
            }
        }
        for (&pid, entry) in &self.partition_table {
            let pi = entry
                .partition_info()
                .unwrap_or_else(|| panic!("partition {pid} maps to unpartitioned table"));
            assert!(
                pi.definitions.iter().any(|d| d.id == pid),
                "partition {pid} not in owning table layout"
            );
            assert!(
                !self.tables.contains_key(&pid) || self.tables[&pid].id() == entry.id(),
                "partition {pid} collides with a different table"
            );
        }
        for id in &self.ineligible_ids {
            assert!(
                self.tables.contains_key(id) || self.partition_table.contains_key(id),
                "ineligible id {id} is neither table nor partition"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnInfo, PartitionDefinition, PartitionInfo, TableInfo};

    struct StubMeta {
        dbs: Vec<DbInfo>,
        tables: HashMap<SchemaId, Vec<TableInfo>>,
    }

    impl SchemaMeta for StubMeta {
        fn list_databases(&self) -> std::result::Result<Vec<DbInfo>, crate::error::MetaError> {
            Ok(self.dbs.clone())
        }

        fn list_tables(
            &self,
            schema_id: SchemaId,
        ) -> std::result::Result<Vec<TableInfo>, crate::error::MetaError> {
            Ok(self.tables.get(&schema_id).cloned().unwrap_or_default())
        }
    }

    fn db(id: SchemaId, name: &str) -> DbInfo {
        DbInfo {
            id,
            name: name.to_string(),
            charset: "utf8mb4".to_string(),
            collate: "utf8mb4_bin".to_string(),
        }
    }

    fn table(id: TableId, name: &str) -> TableInfo {
        TableInfo {
            id,
            name: name.to_string(),
            charset: String::new(),
            collate: String::new(),
            columns: vec![ColumnInfo {
                id: 1,
                name: "id".to_string(),
                not_null: true,
                primary_key: true,
                default_value: None,
            }],
            indices: vec![],
            partition: None,
            is_view: false,
            is_sequence: false,
            update_ts: 0,
        }
    }

    fn partitioned_table(id: TableId, name: &str, partition_ids: &[TableId]) -> TableInfo {
        let mut info = table(id, name);
        info.partition = Some(PartitionInfo {
            definitions: partition_ids
                .iter()
                .map(|&pid| PartitionDefinition {
                    id: pid,
                    name: format!("p{pid}"),
                })
                .collect(),
        });
        info
    }

    fn meta_snapshot() -> SchemaSnapshot {
        let meta = StubMeta {
            dbs: vec![db(1, "app"), db(2, "audit")],
            tables: HashMap::from([
                (1, vec![table(100, "users"), partitioned_table(101, "events", &[10, 20])]),
                (2, vec![table(200, "log")]),
            ]),
        };
        SchemaSnapshot::from_meta(&meta, 50, false).unwrap()
    }

    #[test]
    fn test_from_meta_builds_all_indices() {
        let snap = meta_snapshot();
        snap.assert_invariants();
        assert_eq!(snap.current_ts(), 50);
        assert_eq!(snap.table_id_by_name("app", "users"), Some(100));
        assert_eq!(snap.table_id_by_name("audit", "log"), Some(200));
        assert_eq!(snap.schema_by_id(1).unwrap().name, "app");
        assert_eq!(snap.schema_by_table_id(200).unwrap().name, "audit");
        assert_eq!(
            snap.table_name_by_id(101),
            Some(TableName::new("app", "events"))
        );
    }

    #[test]
    fn test_partition_lookups() {
        let snap = meta_snapshot();
        // A partition id resolves to the owning logical table.
        assert_eq!(
            snap.table_name_by_id(10),
            Some(TableName::new("app", "events"))
        );
        assert_eq!(snap.physical_table_by_id(20).unwrap().id(), 101);
        // Tables are consulted before partitions.
        assert_eq!(snap.physical_table_by_id(100).unwrap().id(), 100);
        assert!(snap.table_by_id(10).is_none());
    }

    #[test]
    fn test_lookup_missing() {
        let snap = meta_snapshot();
        assert_eq!(snap.table_id_by_name("app", "ghost"), None);
        assert!(snap.table_by_name("ghost", "users").is_none());
        assert!(snap.table_name_by_id(999).is_none());
        assert!(snap.schema_by_id(9).is_none());
        assert!(snap.schema_by_table_id(999).is_none());
    }

    #[test]
    fn test_clone_table_names_is_deep() {
        let snap = meta_snapshot();
        let mut names = snap.clone_table_names();
        names.clear();
        assert_eq!(snap.tables().len(), 3);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = SchemaSnapshot::empty(false);
        snap.assert_invariants();
        assert_eq!(snap.current_ts(), 0);
        assert!(snap.tables().is_empty());
    }

    #[test]
    fn test_fill_schema_name_from_snapshot() {
        use crate::model::job::{DdlJobKind, JobState};
        let snap = meta_snapshot();
        let mut job = DdlJob {
            id: 1,
            kind: DdlJobKind::DropTable,
            state: JobState::Done,
            schema_id: 2,
            schema_name: String::new(),
            table_id: 200,
            query: String::new(),
            finished_ts: 60,
            db_info: None,
            table_info: None,
            multiple_table_infos: vec![],
            raw_args: serde_json::Value::Null,
        };
        snap.fill_schema_name(&mut job).unwrap();
        assert_eq!(job.schema_name, "audit");

        job.schema_id = 9;
        assert!(snap.fill_schema_name(&mut job).is_err());
    }

    #[test]
    fn test_fill_schema_name_from_payload() {
        use crate::model::job::{DdlJobKind, JobState};
        let snap = SchemaSnapshot::empty(false);
        let mut job = DdlJob {
            id: 1,
            kind: DdlJobKind::CreateSchema,
            state: JobState::Done,
            schema_id: 5,
            schema_name: String::new(),
            table_id: 0,
            query: String::new(),
            finished_ts: 60,
            db_info: Some(Arc::new(db(5, "fresh"))),
            table_info: None,
            multiple_table_infos: vec![],
            raw_args: serde_json::Value::Null,
        };
        snap.fill_schema_name(&mut job).unwrap();
        assert_eq!(job.schema_name, "fresh");

        job.db_info = None;
        assert!(snap.fill_schema_name(&mut job).is_err());
    }

    #[test]
    fn test_pre_table_entry() {
        use crate::model::job::{DdlJobKind, JobState};
        let snap = meta_snapshot();
        let mut job = DdlJob {
            id: 1,
            kind: DdlJobKind::DropTable,
            state: JobState::Done,
            schema_id: 1,
            schema_name: String::new(),
            table_id: 100,
            query: String::new(),
            finished_ts: 60,
            db_info: None,
            table_info: None,
            multiple_table_infos: vec![],
            raw_args: serde_json::Value::Null,
        };
        let pre = snap.pre_table_entry(&job).unwrap().unwrap();
        assert_eq!(pre.id(), 100);

        job.kind = DdlJobKind::CreateTable;
        assert!(snap.pre_table_entry(&job).unwrap().is_none());

        job.kind = DdlJobKind::AddColumn;
        job.table_info = Some(Arc::new(table(100, "users")));
        let pre = snap.pre_table_entry(&job).unwrap().unwrap();
        assert_eq!(pre.id(), 100);

        // Unrecognized target fails; missing payload is tolerated.
        job.table_info = Some(Arc::new(table(999, "ghost")));
        assert!(snap.pre_table_entry(&job).is_err());
        job.table_info = None;
        assert!(snap.pre_table_entry(&job).unwrap().is_none());

        job.kind = DdlJobKind::DropTable;
        job.table_id = 999;
        assert!(snap.pre_table_entry(&job).is_err());
    }
}
