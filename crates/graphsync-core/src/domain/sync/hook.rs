//! Ingestion hook
//!
//! Runs after the primary commit. It never blocks or fails the commit: the
//! diff is logged and the graph sync is handed to a deferred task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::document::{Segment, SyncAction, SyncLogEntry};

use super::diff::{ChangeSet, diff};
use super::error::SyncError;
use super::plan::SyncPlan;
use super::worker::GraphSyncWorker;

/// Holder description used for hook-acquired locks
const HOOK_LOCK_HOLDER: &str = "ingestion-hook";

/// What the primary commit hands to the hook
#[derive(Debug, Clone)]
pub struct SegmentCommit {
    pub document_id: String,
    /// Stored hash before the commit; `None` for a new document
    pub previous_content_hash: Option<String>,
    pub content_hash: String,
    /// Segments before the commit
    pub old_segments: Vec<Segment>,
    /// Segments after the commit
    pub new_segments: Vec<Segment>,
    /// Domain timestamp of the committed version
    pub modified_at: DateTime<Utc>,
}

impl SegmentCommit {
    /// Whether the commit changed nothing
    pub fn is_unchanged(&self) -> bool {
        self.previous_content_hash.as_deref() == Some(self.content_hash.as_str())
    }
}

/// What the hook did with a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Content hash unchanged; nothing diffed, logged, or scheduled
    Unchanged,
    /// A deferred sync was scheduled for this change list
    Scheduled(ChangeSet),
}

/// Post-commit hook that schedules deferred graph syncs
#[derive(Debug, Clone)]
pub struct IngestionHook {
    worker: Arc<GraphSyncWorker>,
    tracker: TaskTracker,
}

impl IngestionHook {
    /// Create a new hook dispatching to the given worker
    pub fn new(worker: Arc<GraphSyncWorker>) -> Self {
        Self {
            worker,
            tracker: TaskTracker::new(),
        }
    }

    /// Get the worker
    pub fn worker(&self) -> &Arc<GraphSyncWorker> {
        &self.worker
    }

    /// Handle a committed document version
    ///
    /// Returns once the sync is scheduled; it does not wait for it.
    pub async fn on_segments_committed(&self, commit: SegmentCommit) -> HookOutcome {
        if commit.is_unchanged() {
            debug!(document_id = %commit.document_id, "Content hash unchanged, skipping graph sync");
            return HookOutcome::Unchanged;
        }

        let changes = diff(&commit.old_segments, &commit.new_segments);
        let counts = changes.counts();

        let entry = SyncLogEntry::new(
            &commit.document_id,
            SyncAction::DiffComputed,
            json!({
                "previous_content_hash": commit.previous_content_hash,
                "content_hash": commit.content_hash,
                "modified_at": commit.modified_at,
                "changes": changes.summary(),
            }),
        );
        if let Err(e) = self.worker.store().append_log(&entry).await {
            warn!(document_id = %commit.document_id, error = %e, "Failed to append diff log entry");
        }

        info!(
            document_id = %commit.document_id,
            added = counts.added,
            modified = counts.modified,
            removed = counts.removed,
            "Diff computed, scheduling graph sync"
        );

        let worker = Arc::clone(&self.worker);
        let scheduled = changes.clone();
        self.tracker.spawn(async move {
            dispatch(worker, commit, scheduled).await;
        });

        HookOutcome::Scheduled(changes)
    }

    /// Number of scheduled syncs still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every scheduled sync has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Deferred body: lock, plan against the graph baseline, sync
async fn dispatch(worker: Arc<GraphSyncWorker>, commit: SegmentCommit, changes: ChangeSet) {
    let document_id = commit.document_id.as_str();
    let lock_timeout = worker.config().lock_timeout();

    let guard = match worker
        .locks()
        .acquire(document_id, HOOK_LOCK_HOLDER, Some(lock_timeout))
        .await
    {
        Ok(guard) => guard,
        Err(e) => {
            worker
                .record_failure(document_id, &changes, &SyncError::from(e))
                .await;
            return;
        }
    };

    let plan = match SyncPlan::for_commit(
        worker.store(),
        document_id,
        &commit.old_segments,
        changes,
        commit.modified_at,
    )
    .await
    {
        Ok(plan) => plan,
        Err(e) => {
            worker
                .record_failure(document_id, &ChangeSet::default(), &e)
                .await;
            return;
        }
    };

    if plan.rederived {
        debug!(
            document_id = %document_id,
            changes = plan.changes.len(),
            "Using re-derived change list"
        );
    }

    // Failures are recorded by the worker
    let _ = worker
        .sync_with_guard(&guard, &plan.changes, plan.valid_time)
        .await;
}
