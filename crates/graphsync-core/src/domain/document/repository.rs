//! Repository trait for the record-of-truth store
//!
//! The graph sync subsystem reads snapshots and writes status and audit
//! records through this trait; it never owns document content.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

use super::entity::{Document, Segment};
use super::event::SyncLogEntry;

/// Store of documents, segments, sync status and the sync audit log
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ========== Snapshot Access ==========

    /// Get a document by ID
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// Get a document's current segments ordered by position
    async fn get_segments(&self, document_id: &str) -> Result<Vec<Segment>>;

    /// List all documents, most recently updated first
    async fn list_documents(&self) -> Result<Vec<Document>>;

    // ========== Primary Commit ==========

    /// Upsert a document and replace its segments atomically
    ///
    /// When the content hash differs from the stored one (or the document is
    /// new) the sync flag is cleared and the attempt counter reset.
    async fn commit_document(&self, document: &Document, segments: &[Segment]) -> Result<()>;

    /// Delete a document and its segments; the audit log is kept
    async fn delete_document(&self, document_id: &str) -> Result<bool>;

    // ========== Sync Status ==========

    /// List retryable documents with `graph_synced = false`, oldest update first
    ///
    /// Documents with `max_attempts` or more failed attempts are left out so
    /// they cannot crowd out the ones that may still succeed.
    async fn list_unsynced(&self, limit: usize, max_attempts: u32) -> Result<Vec<Document>>;

    /// List unsynced documents at or over the attempt limit
    async fn list_over_limit(&self, max_attempts: u32) -> Result<Vec<Document>>;

    /// Get the segment set the graph currently reflects (empty if never synced)
    async fn get_synced_segments(&self, document_id: &str) -> Result<Vec<Segment>>;

    /// Replace the synced snapshot and reset the attempt counter
    ///
    /// Returns whether the document converged. `graph_synced` is only set
    /// when the document's current segments match `snapshot` at the moment
    /// of the write, so a commit that lands mid-sync keeps its unsynced
    /// marker.
    async fn record_sync_success(&self, document_id: &str, snapshot: &[Segment]) -> Result<bool>;

    /// Mark a failed attempt and return the new attempt count
    async fn record_sync_failure(&self, document_id: &str, at: DateTime<Utc>) -> Result<u32>;

    // ========== Audit Log ==========

    /// Append a write-once log entry
    async fn append_log(&self, entry: &SyncLogEntry) -> Result<()>;

    /// List a document's log entries, oldest first
    async fn list_log(&self, document_id: &str) -> Result<Vec<SyncLogEntry>>;
}
