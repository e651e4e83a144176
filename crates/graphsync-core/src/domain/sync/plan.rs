//! Sync planning
//!
//! Decides, under a document's lock, which change list a run applies. The
//! graph's baseline is the last synced snapshot; a change list is only
//! valid if it was computed against that baseline.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::document::{DocumentStore, Segment};

use super::diff::{ChangeSet, diff, same_content};
use super::error::SyncError;

/// The change list and valid time a run will apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub changes: ChangeSet,
    pub valid_time: DateTime<Utc>,
    /// Whether the change list was re-derived from the store
    pub rederived: bool,
}

impl SyncPlan {
    /// Plan for a hook dispatch
    ///
    /// Keeps the hook's change list when the graph baseline equals the
    /// hook's pre-commit snapshot. Otherwise an earlier sync failed or a
    /// later commit already synced, and the change list is re-derived from
    /// the baseline and the document's current segments.
    pub async fn for_commit(
        store: &dyn DocumentStore,
        document_id: &str,
        old_segments: &[Segment],
        changes: ChangeSet,
        valid_time: DateTime<Utc>,
    ) -> Result<Self, SyncError> {
        let baseline = store
            .get_synced_segments(document_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        if same_content(&baseline, old_segments) {
            return Ok(Self {
                changes,
                valid_time,
                rederived: false,
            });
        }

        debug!(
            document_id = %document_id,
            "Graph baseline differs from commit snapshot, re-deriving change list"
        );
        Self::derive(store, document_id, baseline, valid_time).await
    }

    /// Plan for a reconciliation pass: baseline against current segments
    pub async fn for_document(store: &dyn DocumentStore, document_id: &str) -> Result<Self, SyncError> {
        let baseline = store
            .get_synced_segments(document_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Self::derive(store, document_id, baseline, Utc::now()).await
    }

    async fn derive(
        store: &dyn DocumentStore,
        document_id: &str,
        baseline: Vec<Segment>,
        fallback_valid_time: DateTime<Utc>,
    ) -> Result<Self, SyncError> {
        let document = store
            .get_document(document_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        // The worker detects the deletion and aborts
        let Some(document) = document else {
            return Ok(Self {
                changes: ChangeSet::default(),
                valid_time: fallback_valid_time,
                rederived: true,
            });
        };

        let current = store
            .get_segments(document_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        Ok(Self {
            changes: diff(&baseline, &current),
            valid_time: document.modified_at,
            rederived: true,
        })
    }
}
