//! Multi-version schema storage: the concurrency-safe front door.
//!
//! Ingests DDL jobs on a single producer thread, serves point-in-time
//! snapshot lookups to many consumer threads, and garbage-collects history
//! below the downstream watermark. One reader-writer lock guards the
//! snapshot history; the resolved and GC watermarks are lock-free atomics,
//! and a new resolved ts is published only after the snapshot it covers is
//! in the history.

pub mod cancel;
pub mod history;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{Level, debug, error, info, warn};

use crate::error::{Result, StorageError};
use crate::filter::DdlFilter;
use crate::meta::SchemaMeta;
use crate::model::job::DdlJob;
use crate::snapshot::SchemaSnapshot;
use crate::types::Ts;

use cancel::CancelToken;
use history::SnapshotHistory;

/// Base delay between lookup retries while the resolved watermark catches
/// up. DDL arrival is rare and bursty, so lookups poll instead of waiting
/// on a condition variable.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);
/// Upper bound on the retry backoff.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);
/// How long a lookup may keep retrying before a warning is logged.
const RETRY_WARN_EVERY: Duration = Duration::from_secs(30);
/// Granularity at which a sleeping lookup rechecks its cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Multi-version schema storage for one changefeed.
pub struct SchemaStorage {
    history: RwLock<SnapshotHistory>,
    /// Watermark below which the schema history is complete.
    resolved_ts: AtomicU64,
    /// Watermark below which snapshots have been discarded.
    gc_ts: AtomicU64,

    filter: Option<Box<dyn DdlFilter>>,
    force_replicate: bool,

    /// Changefeed identifier, carried only for logging.
    changefeed: String,
}

impl SchemaStorage {
    /// Create a storage whose initial snapshot is built from the bootstrap
    /// loader at `start_ts`, or empty when no loader is given.
    pub fn new(
        meta: Option<&dyn SchemaMeta>,
        start_ts: Ts,
        filter: Option<Box<dyn DdlFilter>>,
        force_replicate: bool,
        changefeed: impl Into<String>,
    ) -> Result<Self> {
        let snap = match meta {
            Some(meta) => SchemaSnapshot::from_meta(meta, start_ts, force_replicate)?,
            None => SchemaSnapshot::empty(force_replicate),
        };
        Ok(Self {
            history: RwLock::new(SnapshotHistory::new(Arc::new(snap))),
            resolved_ts: AtomicU64::new(start_ts),
            gc_ts: AtomicU64::new(0),
            filter,
            force_replicate,
            changefeed: changefeed.into(),
        })
    }

    /// Single-shot lookup of the snapshot in effect at `ts`.
    ///
    /// Fails with `Gced` below the GC watermark (unrecoverable) and with
    /// `Unresolved` above the resolved watermark (retryable).
    pub fn snapshot(&self, ts: Ts) -> Result<Arc<SchemaSnapshot>> {
        let gc_ts = self.gc_ts.load(Ordering::Acquire);
        if ts < gc_ts {
            return Err(StorageError::Gced { ts, gc_ts }.into());
        }
        let resolved_ts = self.resolved_ts.load(Ordering::Acquire);
        if ts > resolved_ts {
            return Err(StorageError::Unresolved { ts, resolved_ts }.into());
        }
        Ok(self.history.read().lookup(ts)?)
    }

    /// Lookup that blocks until the resolved watermark covers `ts`.
    ///
    /// Retries `Unresolved` indefinitely with bounded exponential backoff;
    /// every other error is returned immediately. The token aborts a
    /// blocked lookup with `Cancelled`.
    pub fn get_snapshot(&self, ts: Ts, cancel: &CancelToken) -> Result<Arc<SchemaSnapshot>> {
        let start = Instant::now();
        let mut last_warn = start;
        let mut delay = RETRY_BASE_DELAY;
        loop {
            match self.snapshot(ts) {
                Ok(snap) => return Ok(snap),
                Err(err) if err.is_retryable() => {
                    if last_warn.elapsed() >= RETRY_WARN_EVERY {
                        warn!(
                            changefeed = %self.changefeed,
                            ts,
                            elapsed = ?start.elapsed(),
                            "get_snapshot is taking too long, DDL puller stuck?"
                        );
                        last_warn = Instant::now();
                    }
                }
                Err(err) => return Err(err),
            }
            if !sleep_cancellable(delay, cancel) {
                return Err(StorageError::Cancelled.into());
            }
            delay = (delay * 2).min(RETRY_MAX_DELAY);
        }
    }

    /// The most recent snapshot.
    pub fn get_last_snapshot(&self) -> Arc<SchemaSnapshot> {
        self.history.read().latest().clone()
    }

    /// Apply one DDL job, producing a new snapshot.
    ///
    /// Jobs rejected by the filter or still in a non-committed upstream
    /// state only advance the resolved watermark. Jobs at or below the
    /// latest snapshot's timestamp are replays and are ignored.
    pub fn handle_ddl_job(&self, mut job: DdlJob) -> Result<()> {
        if self.skip_job(&job) {
            self.advance_resolved_ts(job.finished_ts);
            return Ok(());
        }

        let mut history = self.history.write();
        let last = history.latest();
        if job.finished_ts <= last.current_ts() {
            info!(
                changefeed = %self.changefeed,
                job_id = job.id,
                query = %job.query,
                finished_ts = job.finished_ts,
                "ignoring foregone DDL job"
            );
            return Ok(());
        }

        let mut snap = last.as_ref().clone();
        if let Err(err) = snap.apply(&mut job) {
            error!(
                changefeed = %self.changefeed,
                job_id = job.id,
                query = %job.query,
                finished_ts = job.finished_ts,
                error = %err,
                "failed to handle DDL job"
            );
            return Err(err);
        }
        info!(
            changefeed = %self.changefeed,
            job_id = job.id,
            query = %job.query,
            finished_ts = job.finished_ts,
            "handled DDL job"
        );

        history.append(Arc::new(snap));
        // Publish the watermark only after the snapshot is in the history.
        self.advance_resolved_ts(job.finished_ts);
        Ok(())
    }

    fn skip_job(&self, job: &DdlJob) -> bool {
        debug!(
            changefeed = %self.changefeed,
            job_id = job.id,
            query = %job.query,
            "new DDL commit"
        );
        if let Some(filter) = &self.filter
            && filter.should_discard_ddl(job.kind)
        {
            info!(
                changefeed = %self.changefeed,
                job_id = job.id,
                query = %job.query,
                "discarding DDL job by filter"
            );
            return true;
        }
        !job.state.is_effective()
    }

    /// Advance the resolved watermark. Never moves backwards.
    pub fn advance_resolved_ts(&self, ts: Ts) {
        let mut current = self.resolved_ts.load(Ordering::Acquire);
        while ts > current {
            match self.resolved_ts.compare_exchange(
                current,
                ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn resolved_ts(&self) -> Ts {
        self.resolved_ts.load(Ordering::Acquire)
    }

    /// Whether ineligible tables are replicated anyway.
    pub fn force_replicate(&self) -> bool {
        self.force_replicate
    }

    /// Drop snapshots no longer needed at `ts` and return the timestamp
    /// from which the oldest retained snapshot is valid. That value is the
    /// new floor for lookups.
    pub fn do_gc(&self, ts: Ts) -> Ts {
        let mut history = self.history.write();
        if tracing::enabled!(Level::DEBUG) {
            let snaps = history.snaps();
            let keep = snaps
                .partition_point(|s| s.current_ts() <= ts)
                .saturating_sub(1);
            if keep > 0 {
                debug!(changefeed = %self.changefeed, "running schema storage GC");
            }
            for snap in &snaps[..keep] {
                snap.log_status();
            }
        }
        let (removed, new_oldest) = history.truncate_below(ts);
        self.gc_ts.store(new_oldest, Ordering::Release);
        if removed > 0 {
            debug!(
                changefeed = %self.changefeed,
                removed,
                gc_ts = new_oldest,
                "schema storage GC done"
            );
        }
        new_oldest
    }
}

/// Sleep for `total`, waking early if the token fires. Returns false when
/// cancelled.
fn sleep_cancellable(total: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
    }
}
