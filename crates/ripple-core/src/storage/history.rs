//! Ordered history of schema snapshots.

use std::sync::Arc;

use crate::error::StorageError;
use crate::snapshot::SchemaSnapshot;
use crate::types::Ts;

/// Snapshots ordered ascending by `current_ts`.
///
/// The history is never empty: it is constructed around an initial
/// snapshot and truncation always retains the newest snapshot at or below
/// the cut, which stays the lookup baseline at the GC watermark.
#[derive(Debug)]
pub struct SnapshotHistory {
    snaps: Vec<Arc<SchemaSnapshot>>,
}

impl SnapshotHistory {
    pub fn new(initial: Arc<SchemaSnapshot>) -> Self {
        Self {
            snaps: vec![initial],
        }
    }

    /// Append a snapshot. The caller guarantees that `current_ts` does not
    /// go backwards.
    pub fn append(&mut self, snap: Arc<SchemaSnapshot>) {
        self.snaps.push(snap);
    }

    /// The snapshot with the largest `current_ts <= ts`.
    pub fn lookup(&self, ts: Ts) -> Result<Arc<SchemaSnapshot>, StorageError> {
        let i = self.snaps.partition_point(|s| s.current_ts() <= ts);
        if i == 0 {
            return Err(StorageError::SnapshotNotFound(ts));
        }
        Ok(self.snaps[i - 1].clone())
    }

    pub fn latest(&self) -> &Arc<SchemaSnapshot> {
        self.snaps.last().expect("history is never empty")
    }

    /// Drop every snapshot with `current_ts <= ts` except the newest one at
    /// or below it. Returns the removed count and the new oldest ts.
    pub fn truncate_below(&mut self, ts: Ts) -> (usize, Ts) {
        let cut = self.snaps.partition_point(|s| s.current_ts() <= ts);
        let keep_from = cut.saturating_sub(1);
        if keep_from > 0 {
            self.snaps.drain(..keep_from);
        }
        (keep_from, self.snaps[0].current_ts())
    }

    pub fn len(&self) -> usize {
        self.snaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snaps.is_empty()
    }

    /// All snapshots, oldest first.
    pub(crate) fn snaps(&self) -> &[Arc<SchemaSnapshot>] {
        &self.snaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::job::{DdlJob, DdlJobKind, JobState};
    use crate::model::DbInfo;

    /// Build a history with snapshots at the given timestamps.
    fn history(timestamps: &[Ts]) -> SnapshotHistory {
        let mut prev = SchemaSnapshot::empty(false);
        let mut hist = SnapshotHistory::new(Arc::new(prev.clone()));
        for (i, &ts) in timestamps.iter().enumerate() {
            let mut job = DdlJob {
                id: i as i64,
                kind: DdlJobKind::CreateSchema,
                state: JobState::Done,
                schema_id: i as i64 + 1,
                schema_name: String::new(),
                table_id: 0,
                query: String::new(),
                finished_ts: ts,
                db_info: Some(Arc::new(DbInfo {
                    id: i as i64 + 1,
                    name: format!("db{i}"),
                    charset: String::new(),
                    collate: String::new(),
                })),
                table_info: None,
                multiple_table_infos: vec![],
                raw_args: serde_json::Value::Null,
            };
            let mut next = prev.clone();
            next.apply(&mut job).unwrap();
            hist.append(Arc::new(next.clone()));
            prev = next;
        }
        hist
    }

    #[test]
    fn test_lookup_returns_floor_snapshot() {
        let hist = history(&[1, 5, 7, 9]);
        assert_eq!(hist.lookup(0).unwrap().current_ts(), 0);
        assert_eq!(hist.lookup(1).unwrap().current_ts(), 1);
        assert_eq!(hist.lookup(6).unwrap().current_ts(), 5);
        assert_eq!(hist.lookup(9).unwrap().current_ts(), 9);
        assert_eq!(hist.lookup(100).unwrap().current_ts(), 9);
    }

    #[test]
    fn test_lookup_below_oldest() {
        let mut hist = history(&[5, 7]);
        // Drop the ts-0 baseline so the oldest snapshot is at ts 5.
        hist.truncate_below(5);
        assert!(matches!(
            hist.lookup(4),
            Err(StorageError::SnapshotNotFound(4))
        ));
    }

    #[test]
    fn test_truncate_retains_boundary_snapshot() {
        let mut hist = history(&[1, 5, 7, 9]);
        let (removed, oldest) = hist.truncate_below(6);
        assert_eq!(removed, 2); // ts 0 and ts 1
        assert_eq!(oldest, 5);
        assert_eq!(hist.len(), 3);
        assert_eq!(hist.lookup(5).unwrap().current_ts(), 5);
        assert_eq!(hist.lookup(8).unwrap().current_ts(), 7);
    }

    #[test]
    fn test_truncate_below_oldest_is_noop() {
        let mut hist = history(&[5, 7]);
        // Every snapshot is above the cut except the ts-0 baseline, which
        // is always retained.
        let (removed, oldest) = hist.truncate_below(0);
        assert_eq!(removed, 0);
        assert_eq!(oldest, 0);
        assert_eq!(hist.len(), 3);
    }

    #[test]
    fn test_truncate_past_newest_keeps_one() {
        let mut hist = history(&[5, 7]);
        let (removed, oldest) = hist.truncate_below(100);
        assert_eq!(removed, 2);
        assert_eq!(oldest, 7);
        assert_eq!(hist.len(), 1);
        assert_eq!(hist.latest().current_ts(), 7);
    }

    #[test]
    fn test_append_and_latest() {
        let hist = history(&[3]);
        assert_eq!(hist.latest().current_ts(), 3);
        assert_eq!(hist.len(), 2);
    }
}
