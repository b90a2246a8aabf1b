//! DDL application: the write half of a snapshot.
//!
//! Every routine here runs on a freshly cloned snapshot owned by the
//! storage facade. A returned error discards the clone, so a failed DDL
//! never reaches published state.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, SchemaError};
use crate::model::job::{DdlJob, DdlJobKind};
use crate::model::{DbInfo, TableEntry};
use crate::types::{SchemaId, TableId};

use super::SchemaSnapshot;

impl SchemaSnapshot {
    /// Apply one DDL job in place. On success `current_ts` advances to the
    /// job's commit timestamp.
    pub(crate) fn apply(&mut self, job: &mut DdlJob) -> Result<()> {
        self.fill_schema_name(job)?;
        match job.kind {
            DdlJobKind::CreateSchema => {
                let db = required_db_info(job)?.clone();
                self.create_schema(&db)?;
            }
            DdlJobKind::ModifySchemaCharsetAndCollate => {
                let db = required_db_info(job)?.clone();
                self.replace_schema(&db)?;
            }
            DdlJobKind::DropSchema => {
                self.drop_schema(job.schema_id)?;
            }
            DdlJobKind::RenameTable => {
                // Drop the old registration first, then register under the
                // new name.
                self.drop_table(job.table_id)?;
                self.create_table(wrap_job_table(job)?)?;
            }
            DdlJobKind::RenameTables => {
                self.rename_tables(job)?;
            }
            DdlJobKind::CreateTable | DdlJobKind::CreateView | DdlJobKind::RecoverTable => {
                self.create_table(wrap_job_table(job)?)?;
            }
            DdlJobKind::DropTable | DdlJobKind::DropView => {
                self.drop_table(job.table_id)?;
            }
            DdlJobKind::TruncateTable => {
                // job.table_id is the old table id; the payload carries the
                // new one.
                self.drop_table(job.table_id)?;
                self.create_table(wrap_job_table(job)?)?;
                self.truncated_ids.insert(job.table_id);
            }
            DdlJobKind::TruncateTablePartition
            | DdlJobKind::AddTablePartition
            | DdlJobKind::DropTablePartition => {
                self.update_partition(wrap_job_table(job)?)?;
            }
            _ => {
                // Column changes, index changes, and kinds this version
                // does not recognize all reduce to replacing the table
                // record. Jobs with no table payload are skipped.
                if job.table_info.is_none() {
                    warn!(job_id = job.id, kind = ?job.kind, query = %job.query, "ignoring invalid DDL job");
                    return Ok(());
                }
                self.replace_table(wrap_job_table(job)?)?;
            }
        }
        self.current_ts = job.finished_ts;
        Ok(())
    }

    fn create_schema(&mut self, db: &Arc<DbInfo>) -> Result<()> {
        if self.schemas.contains_key(&db.id) {
            return Err(SchemaError::SchemaExists {
                name: db.name.clone(),
                id: db.id,
            }
            .into());
        }
        // Defensive copy: the caller may hand out shared records.
        self.schemas.insert(db.id, Arc::new(db.as_ref().clone()));
        self.schema_name_to_id.insert(db.name.clone(), db.id);
        self.table_in_schema.insert(db.id, Vec::new());

        debug!(name = %db.name, id = db.id, "create schema");
        Ok(())
    }

    fn replace_schema(&mut self, db: &Arc<DbInfo>) -> Result<()> {
        if !self.schemas.contains_key(&db.id) {
            return Err(SchemaError::SchemaNotFound(db.id).into());
        }
        self.schemas.insert(db.id, Arc::new(db.as_ref().clone()));
        self.schema_name_to_id.insert(db.name.clone(), db.id);
        Ok(())
    }

    fn drop_schema(&mut self, id: SchemaId) -> Result<()> {
        let db = self
            .schemas
            .get(&id)
            .cloned()
            .ok_or(SchemaError::SchemaNotFound(id))?;

        for table_id in self.table_in_schema.remove(&id).unwrap_or_default() {
            let Some(entry) = self.tables.remove(&table_id) else {
                continue;
            };
            if let Some(pi) = entry.partition_info() {
                for part in &pi.definitions {
                    self.partition_table.remove(&part.id);
                    self.ineligible_ids.remove(&part.id);
                }
            }
            self.table_name_to_id.remove(&entry.name);
            self.ineligible_ids.remove(&table_id);
        }

        self.schemas.remove(&id);
        self.schema_name_to_id.remove(&db.name);

        debug!(name = %db.name, id, "drop schema");
        Ok(())
    }

    fn create_table(&mut self, entry: Arc<TableEntry>) -> Result<()> {
        let id = entry.id();
        let schema_name = self
            .schemas
            .get(&entry.schema_id)
            .map(|db| db.name.clone())
            .ok_or(SchemaError::SchemaNotFound(entry.schema_id))?;
        let in_schema = self
            .table_in_schema
            .get_mut(&entry.schema_id)
            .ok_or(SchemaError::SchemaNotFound(entry.schema_id))?;
        if self.tables.contains_key(&id) {
            return Err(SchemaError::TableExists {
                schema: schema_name,
                table: entry.info.name.clone(),
            }
            .into());
        }
        in_schema.push(id);

        let eligible = entry.is_eligible(self.force_replicate);
        if !eligible {
            // Sequences are always ineligible; skip the warning for them.
            if !entry.is_sequence() {
                warn!(table = %entry.name, id, "table is ineligible to replicate");
            }
            self.ineligible_ids.insert(id);
        }
        if let Some(pi) = entry.partition_info() {
            for part in &pi.definitions {
                self.partition_table.insert(part.id, entry.clone());
                if !eligible {
                    self.ineligible_ids.insert(part.id);
                }
            }
        }
        self.table_name_to_id.insert(entry.name.clone(), id);
        self.tables.insert(id, entry.clone());

        debug!(name = %entry.name, id, "create table");
        Ok(())
    }

    fn drop_table(&mut self, id: TableId) -> Result<()> {
        let entry = self
            .tables
            .get(&id)
            .cloned()
            .ok_or(SchemaError::TableNotFound(id))?;
        let in_schema = self
            .table_in_schema
            .get_mut(&entry.schema_id)
            .ok_or(SchemaError::SchemaNotFound(entry.schema_id))?;
        if let Some(pos) = in_schema.iter().position(|&t| t == id) {
            in_schema.remove(pos);
        }

        self.tables.remove(&id);
        if let Some(pi) = entry.partition_info() {
            for part in &pi.definitions {
                self.partition_table.remove(&part.id);
                self.ineligible_ids.remove(&part.id);
            }
        }
        self.table_name_to_id.remove(&entry.name);
        self.ineligible_ids.remove(&id);

        debug!(name = %entry.name, id, "drop table");
        Ok(())
    }

    /// Replace the table record with a new version. Name and membership
    /// indices are untouched; renames go through drop-then-create.
    fn replace_table(&mut self, entry: Arc<TableEntry>) -> Result<()> {
        let id = entry.id();
        if !self.tables.contains_key(&id) {
            return Err(SchemaError::TableNotFound(id).into());
        }
        let eligible = entry.is_eligible(self.force_replicate);
        if !eligible {
            if !entry.is_sequence() {
                warn!(table = %entry.name, id, "table is ineligible to replicate");
            }
            // The set only grows here; a table regaining eligibility keeps
            // its recorded id.
            self.ineligible_ids.insert(id);
        }
        if let Some(pi) = entry.partition_info() {
            for part in &pi.definitions {
                self.partition_table.insert(part.id, entry.clone());
                if !eligible {
                    self.ineligible_ids.insert(part.id);
                }
            }
        }
        self.tables.insert(id, entry);
        Ok(())
    }

    /// Reconcile the partition set of a partitioned table against the
    /// incoming layout. Ids that disappear are retired as truncated.
    fn update_partition(&mut self, entry: Arc<TableEntry>) -> Result<()> {
        let id = entry.id();
        let old = self
            .tables
            .get(&id)
            .cloned()
            .ok_or(SchemaError::TableNotFound(id))?;
        let old_pi = old
            .partition_info()
            .ok_or(SchemaError::TableNotFound(id))?;
        let mut old_ids: HashSet<TableId> = old_pi.definitions.iter().map(|d| d.id).collect();

        let Some(new_pi) = entry.partition_info() else {
            return Err(SchemaError::TableNotFound(id).into());
        };
        self.tables.insert(id, entry.clone());
        let eligible = entry.is_eligible(self.force_replicate);
        for part in &new_pi.definitions {
            if !self.partition_table.contains_key(&part.id) {
                debug!(table = %entry.name, id, partition_id = part.id, "add table partition");
            }
            self.partition_table.insert(part.id, entry.clone());
            if !eligible {
                self.ineligible_ids.insert(part.id);
            }
            old_ids.remove(&part.id);
        }

        for pid in old_ids {
            self.truncated_ids.insert(pid);
            self.partition_table.remove(&pid);
            self.ineligible_ids.remove(&pid);
            debug!(table = %entry.name, id, partition_id = pid, "drop table partition");
        }

        Ok(())
    }

    /// Multi-table rename. All old registrations are dropped before any
    /// new one is created so that name swaps cannot collide. A failure
    /// halfway through is returned as-is; the caller discards the clone.
    fn rename_tables(&mut self, job: &DdlJob) -> Result<()> {
        let args = job.rename_tables_args()?;
        if job.multiple_table_infos.len() < args.new_table_names.len() {
            return Err(SchemaError::InvalidDdlJob(job.id).into());
        }
        for &table_id in &args.old_table_ids {
            self.drop_table(table_id)?;
        }
        for (i, info) in job.multiple_table_infos.iter().enumerate() {
            let &schema_id = args
                .new_schema_ids
                .get(i)
                .ok_or(SchemaError::InvalidDdlJob(job.id))?;
            let schema = self
                .schemas
                .get(&schema_id)
                .cloned()
                .ok_or(SchemaError::SchemaNotFound(schema_id))?;
            let entry = Arc::new(TableEntry::wrap(
                schema_id,
                &schema.name,
                job.finished_ts,
                info.clone(),
            ));
            self.create_table(entry)?;
        }
        Ok(())
    }
}

fn required_db_info(job: &DdlJob) -> Result<&Arc<DbInfo>> {
    job.db_info
        .as_ref()
        .ok_or_else(|| SchemaError::InvalidDdlJob(job.id).into())
}

fn wrap_job_table(job: &DdlJob) -> Result<Arc<TableEntry>> {
    let info = job
        .table_info
        .as_ref()
        .ok_or(SchemaError::InvalidDdlJob(job.id))?;
    Ok(Arc::new(TableEntry::wrap(
        job.schema_id,
        &job.schema_name,
        job.finished_ts,
        info.clone(),
    )))
}
