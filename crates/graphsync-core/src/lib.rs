//! Graphsync Core Library
//!
//! Keeps a temporal knowledge graph eventually consistent with edits to the
//! documents it was built from:
//! - Segment diffing keyed by stable segment keys
//! - A graph sync worker applying tombstone-then-replace with bi-temporal episodes
//! - A post-commit ingestion hook running syncs as deferred work
//! - Reconciliation of documents whose sync failed
//! - Per-document locking
//! - SQLite storage for documents, the audit log and the graph
//! - LLM-backed entity extraction (OpenAI-compatible API)

pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

pub use error::{Error, Result};


/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::SyncContext;
    pub use crate::config::{Config, SyncConfig};
    pub use crate::domain::document::{Document, DocumentStore, Segment, SyncAction, SyncLogEntry};
    pub use crate::domain::knowledge::{Episode, Extraction, Extractor, SourceRef, TemporalGraph};
    pub use crate::domain::sync::{
        ChangeSet, GraphSyncWorker, ReconciliationReport, SyncError, SyncOutcome, diff,
    };
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
