//! Reconciliation service
//!
//! Re-drives documents whose graph state fell behind. It reuses the
//! worker's idempotent protocol, so it is safe to run concurrently with
//! itself and with ingestion.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::document::Document;
use crate::domain::locking::LockError;

use super::diff::ChangeSet;
use super::error::{SyncError, SyncOutcome};
use super::plan::SyncPlan;
use super::worker::GraphSyncWorker;

/// Holder description used for reconciliation locks
const RECONCILE_LOCK_HOLDER: &str = "reconcile";

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Retryable unsynced documents examined
    pub scanned: usize,
    /// Documents the worker was invoked for
    pub retried: usize,
    /// Retried documents whose sync completed
    pub succeeded: usize,
    /// Retried documents whose sync failed again
    pub still_failing: usize,
    /// Documents at or above the attempt limit; never counted in `scanned`
    pub skipped_over_limit: usize,
    /// Documents whose lock was held by another run
    pub skipped_busy: usize,
    /// Documents still inside their retry backoff window
    pub deferred: usize,
    /// Documents deleted before they could be synced
    pub aborted: usize,
    pub over_limit_documents: Vec<String>,
    pub failed_documents: Vec<String>,
}

impl ReconciliationReport {
    /// Whether the pass found nothing to do
    pub fn is_idle(&self) -> bool {
        self.retried == 0
    }
}

/// Retries unsynced documents through the graph sync worker
#[derive(Debug, Clone)]
pub struct ReconciliationService {
    worker: Arc<GraphSyncWorker>,
}

impl ReconciliationService {
    pub fn new(worker: Arc<GraphSyncWorker>) -> Self {
        Self { worker }
    }

    /// Run one pass over at most `limit` unsynced documents
    ///
    /// Uses the configured batch size when `limit` is `None`.
    pub async fn reconcile(&self, limit: Option<usize>) -> Result<ReconciliationReport, SyncError> {
        let config = self.worker.config();
        let limit = limit.unwrap_or(config.reconcile_batch_size);

        let store = self.worker.store();

        let over_limit = store
            .list_over_limit(config.max_attempts)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;
        let documents = store
            .list_unsynced(limit, config.max_attempts)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        let mut report = ReconciliationReport {
            scanned: documents.len(),
            ..Default::default()
        };

        for document in &over_limit {
            warn!(
                document_id = %document.id,
                attempts = document.graph_sync_attempts,
                max_attempts = config.max_attempts,
                "Skipping document over the retry limit"
            );
            report.skipped_over_limit += 1;
            report.over_limit_documents.push(document.id.clone());
        }

        for document in documents {
            self.reconcile_document(&document, &mut report).await;
        }

        info!(
            scanned = report.scanned,
            retried = report.retried,
            succeeded = report.succeeded,
            still_failing = report.still_failing,
            skipped_over_limit = report.skipped_over_limit,
            skipped_busy = report.skipped_busy,
            deferred = report.deferred,
            "Reconciliation pass completed"
        );

        Ok(report)
    }

    async fn reconcile_document(&self, document: &Document, report: &mut ReconciliationReport) {
        let config = self.worker.config();
        let document_id = document.id.as_str();

        if let Some(last_attempt) = document.last_sync_attempt_at {
            let backoff = config.backoff_for(document.graph_sync_attempts);
            let elapsed = (Utc::now() - last_attempt).to_std().unwrap_or_default();
            if elapsed < backoff {
                debug!(
                    document_id = %document_id,
                    remaining_ms = (backoff - elapsed).as_millis() as u64,
                    "Retry backoff not elapsed"
                );
                report.deferred += 1;
                return;
            }
        }

        let guard = match self.worker.locks().try_acquire(document_id, RECONCILE_LOCK_HOLDER) {
            Ok(guard) => guard,
            Err(LockError::Busy { holder, .. }) => {
                debug!(document_id = %document_id, holder = %holder, "Document busy, skipping");
                report.skipped_busy += 1;
                return;
            }
            Err(e) => {
                debug!(document_id = %document_id, error = %e, "Could not lock document, skipping");
                report.skipped_busy += 1;
                return;
            }
        };

        // Another run may have converged the document after it was listed
        match self.worker.store().get_document(document_id).await {
            Ok(Some(current)) if current.graph_synced => return,
            Ok(_) => {}
            Err(e) => {
                let err = SyncError::Store(e.to_string());
                self.worker
                    .record_failure(document_id, &ChangeSet::default(), &err)
                    .await;
                report.retried += 1;
                report.still_failing += 1;
                report.failed_documents.push(document.id.clone());
                return;
            }
        }

        report.retried += 1;

        let plan = match SyncPlan::for_document(self.worker.store(), document_id).await {
            Ok(plan) => plan,
            Err(e) => {
                self.worker
                    .record_failure(document_id, &ChangeSet::default(), &e)
                    .await;
                report.still_failing += 1;
                report.failed_documents.push(document.id.clone());
                return;
            }
        };

        match self
            .worker
            .sync_with_guard(&guard, &plan.changes, plan.valid_time)
            .await
        {
            Ok(SyncOutcome::Completed(_)) => report.succeeded += 1,
            Ok(SyncOutcome::Aborted { .. }) => report.aborted += 1,
            Err(_) => {
                report.still_failing += 1;
                report.failed_documents.push(document.id.clone());
            }
        }
    }

    /// Run reconciliation on a fixed interval until cancelled
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        limit: Option<usize>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Periodic reconciliation cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.reconcile(limit).await {
                            warn!(error = %e, "Reconciliation pass failed");
                        }
                    }
                }
            }
        })
    }
}
