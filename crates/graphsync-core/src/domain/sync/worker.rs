//! Graph sync worker
//!
//! Converges one document's episodes with a change list using
//! tombstone-then-replace:
//!
//! 1. Extract every added/modified segment (no graph writes yet)
//! 2. Invalidate the live episode of every modified/removed segment
//! 3. Re-check that the document still exists
//! 4. Create the replacement episodes
//!
//! A reader may briefly see a fact missing, never duplicated. Every step is
//! idempotent so a failed run can be re-driven with the same change list.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::domain::document::{DocumentStore, SyncAction, SyncLogEntry};
use crate::domain::knowledge::{Episode, Extraction, Extractor, SourceRef, TemporalGraph};
use crate::domain::locking::{DocumentLockGuard, LockManager};

use super::diff::{ChangeSet, ChangeType};
use super::error::{SyncError, SyncOutcome, SyncStats};

/// Holder description used for worker-acquired locks
const SYNC_LOCK_HOLDER: &str = "graph-sync";

/// A replacement episode ready to be written
struct PendingEpisode {
    source_ref: SourceRef,
    content_hash: String,
    extraction: Extraction,
}

/// Applies change lists to the temporal graph
///
/// The worker is the only writer of the graph. All collaborators are trait
/// objects so tests can swap in failing or slow implementations.
pub struct GraphSyncWorker {
    store: Arc<dyn DocumentStore>,
    graph: Arc<dyn TemporalGraph>,
    extractor: Arc<dyn Extractor>,
    locks: LockManager,
    config: SyncConfig,
}

impl GraphSyncWorker {
    /// Create a new worker
    pub fn new(
        store: Arc<dyn DocumentStore>,
        graph: Arc<dyn TemporalGraph>,
        extractor: Arc<dyn Extractor>,
        locks: LockManager,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            graph,
            extractor,
            locks,
            config,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn graph(&self) -> &dyn TemporalGraph {
        self.graph.as_ref()
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sync a document, waiting for its lock
    ///
    /// A lock timeout is recorded as a retryable failure.
    pub async fn sync(
        &self,
        document_id: &str,
        changes: &ChangeSet,
        valid_time: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let guard = match self
            .locks
            .acquire(document_id, SYNC_LOCK_HOLDER, Some(self.config.lock_timeout()))
            .await
        {
            Ok(guard) => guard,
            Err(e) => {
                let err = SyncError::from(e);
                self.record_failure(document_id, changes, &err).await;
                return Err(err);
            }
        };

        self.sync_with_guard(&guard, changes, valid_time).await
    }

    /// Sync a document whose lock the caller already holds
    pub async fn sync_with_guard(
        &self,
        guard: &DocumentLockGuard,
        changes: &ChangeSet,
        valid_time: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let document_id = guard.document_id();
        let counts = changes.counts();

        info!(
            document_id = %document_id,
            added = counts.added,
            modified = counts.modified,
            removed = counts.removed,
            valid_time = %valid_time,
            "Graph sync started"
        );

        match self.run(document_id, changes, valid_time).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.record_failure(document_id, changes, &err).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        document_id: &str,
        changes: &ChangeSet,
        valid_time: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        if !self.document_exists(document_id).await? {
            return self.abort(document_id).await;
        }

        let baseline = self
            .store
            .get_synced_segments(document_id)
            .await
            .map_err(store_error)?;

        let mut stats = SyncStats::default();
        let mut pending = Vec::new();

        // Extract before touching the graph so a failure leaves old facts live
        for entry in changes.iter().filter(|e| e.creates()) {
            let Some(segment) = &entry.new_snapshot else {
                continue;
            };
            let source_ref = SourceRef::new(document_id, &entry.segment_key);

            if self
                .already_applied(document_id, &source_ref, valid_time, &segment.content_hash)
                .await?
            {
                debug!(source = %source_ref, "Episode already present, skipping extraction");
                stats.skipped += 1;
                continue;
            }

            let extraction = self.extract(&entry.segment_key, &segment.content).await?;
            pending.push(PendingEpisode {
                source_ref,
                content_hash: segment.content_hash.clone(),
                extraction,
            });
        }

        // One transaction instant per run: retired episodes end exactly
        // where their replacements begin
        let now = Utc::now();
        for entry in changes.iter() {
            let source_ref = SourceRef::new(document_id, &entry.segment_key);
            let live = self
                .graph_call("find_live_episode", self.graph.find_live_episode(document_id, &source_ref))
                .await?;

            let Some(live) = live else {
                continue;
            };

            // A matching live episode was written by an earlier partial run
            let replaced = entry.change_type != ChangeType::Removed
                && entry.new_snapshot.as_ref().is_some_and(|segment| {
                    live.valid_time == valid_time && live.content_hash == segment.content_hash
                });
            if replaced {
                continue;
            }

            let invalidated = self
                .graph_call(
                    "invalidate_episode",
                    self.graph.invalidate_episode(document_id, &source_ref, now),
                )
                .await?;
            if invalidated {
                debug!(source = %source_ref, episode_id = %live.id, "Episode invalidated");
                stats.invalidated += 1;
            }
        }

        if !self.document_exists(document_id).await? {
            return self.abort(document_id).await;
        }

        for PendingEpisode {
            source_ref,
            content_hash,
            extraction,
        } in pending
        {
            let episode =
                Episode::new(source_ref, content_hash, valid_time, extraction).recorded_at(now);
            self.graph_call("create_episode", self.graph.create_episode(&episode))
                .await?;
            debug!(
                source = %episode.source_ref,
                episode_id = %episode.id,
                entities = episode.entities.len(),
                "Episode created"
            );
            stats.created += 1;
        }

        let snapshot = changes.apply_to(&baseline);
        stats.converged = self
            .store
            .record_sync_success(document_id, &snapshot)
            .await
            .map_err(store_error)?;

        let entry = SyncLogEntry::new(
            document_id,
            SyncAction::GraphSyncSucceeded,
            json!({
                "valid_time": valid_time,
                "changes": changes.summary(),
                "invalidated": stats.invalidated,
                "created": stats.created,
                "skipped": stats.skipped,
                "converged": stats.converged,
            }),
        );
        self.store.append_log(&entry).await.map_err(store_error)?;

        info!(
            document_id = %document_id,
            invalidated = stats.invalidated,
            created = stats.created,
            skipped = stats.skipped,
            converged = stats.converged,
            "Graph sync succeeded"
        );

        Ok(SyncOutcome::Completed(stats))
    }

    /// Retire every live episode of a deleted document
    async fn abort(&self, document_id: &str) -> Result<SyncOutcome, SyncError> {
        let invalidated = self
            .graph_call(
                "invalidate_group",
                self.graph.invalidate_group(document_id, Utc::now()),
            )
            .await?;

        let entry = SyncLogEntry::new(
            document_id,
            SyncAction::GraphSyncAborted,
            json!({ "reason": "document_deleted", "invalidated": invalidated }),
        );
        self.store.append_log(&entry).await.map_err(store_error)?;

        warn!(
            document_id = %document_id,
            invalidated = invalidated,
            "Graph sync aborted, document no longer exists"
        );

        Ok(SyncOutcome::Aborted { invalidated })
    }

    /// Record a failed attempt; never fails itself
    pub(crate) async fn record_failure(&self, document_id: &str, changes: &ChangeSet, err: &SyncError) {
        let attempts = match self.store.record_sync_failure(document_id, Utc::now()).await {
            Ok(attempts) => attempts,
            Err(e) => {
                error!(
                    document_id = %document_id,
                    error = %e,
                    "Failed to record sync failure"
                );
                return;
            }
        };

        let entry = SyncLogEntry::new(
            document_id,
            SyncAction::GraphSyncFailed,
            json!({
                "reason": err.to_string(),
                "kind": err.kind(),
                "code": err.code(),
                "retryable": err.is_retryable(),
                "attempts": attempts,
                "changes": changes.summary(),
            }),
        );
        if let Err(e) = self.store.append_log(&entry).await {
            error!(document_id = %document_id, error = %e, "Failed to append sync failure log");
        }

        warn!(
            document_id = %document_id,
            error = %err,
            attempts = attempts,
            "Graph sync failed"
        );
    }

    async fn document_exists(&self, document_id: &str) -> Result<bool, SyncError> {
        Ok(self
            .store
            .get_document(document_id)
            .await
            .map_err(store_error)?
            .is_some())
    }

    async fn already_applied(
        &self,
        document_id: &str,
        source_ref: &SourceRef,
        valid_time: DateTime<Utc>,
        content_hash: &str,
    ) -> Result<bool, SyncError> {
        let live = self
            .graph_call("find_live_episode", self.graph.find_live_episode(document_id, source_ref))
            .await?;
        Ok(live.is_some_and(|episode| {
            episode.valid_time == valid_time && episode.content_hash == content_hash
        }))
    }

    async fn extract(&self, segment_key: &str, content: &str) -> Result<Extraction, SyncError> {
        let timeout = self.config.extraction_timeout();
        match tokio::time::timeout(timeout, self.extractor.extract(content)).await {
            Ok(Ok(extraction)) => Ok(extraction),
            Ok(Err(e)) => Err(SyncError::Extraction {
                segment_key: segment_key.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(SyncError::Extraction {
                segment_key: segment_key.to_string(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn graph_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = crate::error::Result<T>>,
    ) -> Result<T, SyncError> {
        let timeout = self.config.graph_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SyncError::TransientGraph(format!("{}: {}", operation, e))),
            Err(_) => Err(SyncError::TransientGraph(format!(
                "{} timed out after {}ms",
                operation,
                timeout.as_millis()
            ))),
        }
    }
}

impl std::fmt::Debug for GraphSyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSyncWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn store_error(err: crate::error::Error) -> SyncError {
    SyncError::Store(err.to_string())
}
