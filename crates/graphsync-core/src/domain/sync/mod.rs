//! Document-to-graph synchronization
//!
//! Keeps the temporal graph eventually consistent with document edits
//! without blocking the primary ingestion path.
//!
//! # Architecture
//!
//! ```text
//! commit ──► IngestionHook ──► diff() ──► (deferred) GraphSyncWorker ──► TemporalGraph
//!                                                   ▲
//!            ReconciliationService ─────────────────┘
//! ```
//!
//! - `diff`: pure segment comparison producing a `ChangeSet`
//! - `worker`: tombstone-then-replace application of a `ChangeSet`
//! - `hook`: post-commit dispatch on a task tracker
//! - `reconcile`: retries documents with `graph_synced = false`
//! - `plan`: picks the change list a run applies, relative to the graph baseline

mod diff;
mod error;
mod hook;
mod plan;
mod reconcile;
mod worker;

pub use diff::{ChangeCounts, ChangeEntry, ChangeSet, ChangeType, diff, same_content};
pub use error::{SyncError, SyncOutcome, SyncStats};
pub use hook::{HookOutcome, IngestionHook, SegmentCommit};
pub use plan::SyncPlan;
pub use reconcile::{ReconciliationReport, ReconciliationService};
pub use worker::GraphSyncWorker;
