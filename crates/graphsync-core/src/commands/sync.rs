//! Sync commands
//!
//! Reconciliation and read-only views of sync status, episodes and the
//! audit log.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::document::{Document, DocumentStore, SyncLogEntry};
use crate::domain::knowledge::{Episode, TemporalGraph};
use crate::domain::sync::{ReconciliationReport, SyncOutcome, SyncPlan};
use crate::error::{Error, Result};

use super::SyncContext;

/// Holder description for manual resyncs
const RESYNC_LOCK_HOLDER: &str = "manual-resync";

/// Run one reconciliation pass
pub async fn reconcile(ctx: &SyncContext, limit: Option<usize>) -> Result<ReconciliationReport> {
    Ok(ctx.reconciler().reconcile(limit).await?)
}

/// Run reconciliation on the configured interval until `cancel` fires
pub async fn reconcile_periodically(
    ctx: &SyncContext,
    interval: Duration,
    limit: Option<usize>,
    cancel: CancellationToken,
) -> Result<()> {
    ctx.reconciler()
        .clone()
        .spawn_periodic(interval, limit, cancel)
        .await
        .map_err(|e| Error::Other(format!("Reconciliation task failed: {}", e)))
}

/// Re-derive and apply a document's changes now, waiting for its lock
///
/// Ignores the attempt limit, so it is the way to retry a document that
/// reconciliation has given up on.
pub async fn resync(ctx: &SyncContext, document_id: &str) -> Result<SyncOutcome> {
    let worker = ctx.worker();
    let guard = worker
        .locks()
        .acquire(
            document_id,
            RESYNC_LOCK_HOLDER,
            Some(worker.config().lock_timeout()),
        )
        .await
        .map_err(crate::domain::sync::SyncError::from)?;

    let plan = SyncPlan::for_document(worker.store(), document_id).await?;
    Ok(worker
        .sync_with_guard(&guard, &plan.changes, plan.valid_time)
        .await?)
}

/// One row of the status listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub document_id: String,
    pub title: String,
    pub content_hash: String,
    pub modified_at: DateTime<Utc>,
    pub graph_synced: bool,
    pub graph_sync_attempts: u32,
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    /// Reconciliation no longer retries this document
    pub over_limit: bool,
    pub live_episodes: usize,
}

impl DocumentStatus {
    fn from_document(document: Document, max_attempts: u32, live_episodes: usize) -> Self {
        Self {
            over_limit: !document.graph_synced && document.is_over_limit(max_attempts),
            document_id: document.id,
            title: document.title,
            content_hash: document.content_hash,
            modified_at: document.modified_at,
            graph_synced: document.graph_synced,
            graph_sync_attempts: document.graph_sync_attempts,
            last_sync_attempt_at: document.last_sync_attempt_at,
            live_episodes,
        }
    }
}

/// List every document with its sync status
pub async fn status(ctx: &SyncContext) -> Result<Vec<DocumentStatus>> {
    let max_attempts = ctx.worker().config().max_attempts;
    let documents = ctx.store().list_documents().await?;

    let mut rows = Vec::with_capacity(documents.len());
    for document in documents {
        let live = ctx.graph().list_episodes(&document.id, false).await?.len();
        rows.push(DocumentStatus::from_document(document, max_attempts, live));
    }
    Ok(rows)
}

/// Status of one document
pub async fn document_status(ctx: &SyncContext, document_id: &str) -> Result<DocumentStatus> {
    let document = ctx
        .store()
        .get_document(document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;
    let live = ctx.graph().list_episodes(document_id, false).await?.len();
    Ok(DocumentStatus::from_document(
        document,
        ctx.worker().config().max_attempts,
        live,
    ))
}

/// List a document's episodes, oldest transaction first
pub async fn episodes(
    ctx: &SyncContext,
    document_id: &str,
    include_invalidated: bool,
) -> Result<Vec<Episode>> {
    ctx.graph().list_episodes(document_id, include_invalidated).await
}

/// List a document's audit log, oldest first
///
/// Works for deleted documents too; the log outlives them.
pub async fn log(ctx: &SyncContext, document_id: &str) -> Result<Vec<SyncLogEntry>> {
    ctx.store().list_log(document_id).await
}
