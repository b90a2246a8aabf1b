//! # ripple-core
//!
//! Multi-version schema catalog for a change-data-capture pipeline.
//!
//! A CDC pipeline replicating a relational source must interpret every
//! data event against the schema that was in effect when the event was
//! produced. This crate maintains that time-travel view: it ingests DDL
//! jobs stamped with source commit timestamps, files one immutable
//! [`snapshot::SchemaSnapshot`] per schema version, answers point-in-time
//! lookups (blocking callers that outrun the resolved watermark), and
//! garbage-collects history the downstream no longer needs.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use ripple_core::model::DbInfo;
//! use ripple_core::model::job::{DdlJob, DdlJobKind, JobState};
//! use ripple_core::storage::SchemaStorage;
//! use ripple_core::storage::cancel::CancelToken;
//!
//! let storage = SchemaStorage::new(None, 0, None, false, "changefeed-1").unwrap();
//!
//! // DDL jobs arrive from the puller in commit-ts order.
//! storage
//!     .handle_ddl_job(DdlJob {
//!         id: 1,
//!         kind: DdlJobKind::CreateSchema,
//!         state: JobState::Synced,
//!         schema_id: 2,
//!         schema_name: String::new(),
//!         table_id: 0,
//!         query: "CREATE DATABASE app".to_string(),
//!         finished_ts: 10,
//!         db_info: Some(Arc::new(DbInfo {
//!             id: 2,
//!             name: "app".to_string(),
//!             charset: "utf8mb4".to_string(),
//!             collate: "utf8mb4_bin".to_string(),
//!         })),
//!         table_info: None,
//!         multiple_table_infos: Vec::new(),
//!         raw_args: serde_json::Value::Null,
//!     })
//!     .unwrap();
//!
//! // Consumers read the schema as of any resolved timestamp.
//! let snap = storage.get_snapshot(10, &CancelToken::new()).unwrap();
//! assert!(snap.schema_by_id(2).is_some());
//! ```

pub mod error;
pub mod filter;
pub mod meta;
pub mod model;
pub mod snapshot;
pub mod storage;
pub mod types;
