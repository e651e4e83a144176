//! Sync error taxonomy and run outcomes

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::locking::LockError;

/// Errors from a graph sync run
///
/// None of these roll back or block the primary commit; they are recorded
/// as `graph_sync_failed` entries and leave the document eligible for
/// reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Graph engine unreachable or timed out
    #[error("Graph engine unavailable: {0}")]
    TransientGraph(String),

    /// Extractor failed, returned malformed output, or timed out
    #[error("Extraction failed for segment '{segment_key}': {reason}")]
    Extraction { segment_key: String, reason: String },

    /// Status or snapshot store unavailable
    #[error("Document store unavailable: {0}")]
    Store(String),

    /// Another run holds the document lock; skipped for this pass
    #[error("Document '{0}' is being synced by another run")]
    ConcurrencyBusy(String),

    /// Could not get the document lock within the configured wait
    #[error("Timed out waiting for the sync lock on document '{0}'")]
    LockTimeout(String),
}

impl SyncError {
    /// Get the error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransientGraph(_) => "E200",
            Self::Extraction { .. } => "E201",
            Self::LockTimeout(_) => "E300",
            Self::ConcurrencyBusy(_) => "E301",
            Self::Store(_) => "E400",
        }
    }

    /// Short machine-readable kind for audit payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientGraph(_) => "transient_graph",
            Self::Extraction { .. } => "extraction",
            Self::Store(_) => "store",
            Self::ConcurrencyBusy(_) => "concurrency_busy",
            Self::LockTimeout(_) => "lock_timeout",
        }
    }

    /// Whether a later attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ConcurrencyBusy(_))
    }
}

impl From<LockError> for SyncError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { document_id, .. } => Self::LockTimeout(document_id),
            LockError::Busy { document_id, .. } => Self::ConcurrencyBusy(document_id),
        }
    }
}

impl From<SyncError> for crate::error::Error {
    fn from(err: SyncError) -> Self {
        use crate::error::Error;
        match err {
            SyncError::TransientGraph(msg) => Error::GraphError(msg),
            SyncError::Extraction { segment_key, reason } => {
                Error::EntityExtractionFailed(format!("{}: {}", segment_key, reason))
            }
            SyncError::Store(msg) => Error::Other(format!("Document store unavailable: {}", msg)),
            SyncError::ConcurrencyBusy(id) | SyncError::LockTimeout(id) => Error::LockTimeout(id),
        }
    }
}

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Episodes retired by this run
    pub invalidated: u64,
    /// Episodes written by this run
    pub created: u64,
    /// Entries already applied by an earlier partial run
    pub skipped: u64,
    /// Whether the graph now reflects the document's current segments
    pub converged: bool,
}

/// Result of a sync run that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The change list was applied
    Completed(SyncStats),
    /// The document no longer exists; its live episodes were retired
    Aborted { invalidated: u64 },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Counters of a completed run
    pub fn stats(&self) -> Option<&SyncStats> {
        match self {
            Self::Completed(stats) => Some(stats),
            Self::Aborted { .. } => None,
        }
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(stats) => write!(
                f,
                "synced ({} invalidated, {} created, {} already present{})",
                stats.invalidated,
                stats.created,
                stats.skipped,
                if stats.converged { "" } else { ", behind current version" }
            ),
            Self::Aborted { invalidated } => {
                write!(f, "document gone, {} episodes retired", invalidated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_kinds() {
        let graph = SyncError::TransientGraph("connection refused".into());
        assert_eq!(graph.code(), "E200");
        assert_eq!(graph.kind(), "transient_graph");
        assert!(graph.is_retryable());

        let extraction = SyncError::Extraction {
            segment_key: "intro".into(),
            reason: "timed out".into(),
        };
        assert_eq!(extraction.code(), "E201");
        assert!(extraction.to_string().contains("'intro'"));
        assert!(extraction.is_retryable());
    }

    #[test]
    fn test_busy_is_not_a_failure() {
        let busy = SyncError::ConcurrencyBusy("doc-1".into());
        assert!(!busy.is_retryable());
        assert!(SyncError::LockTimeout("doc-1".into()).is_retryable());
    }

    #[test]
    fn test_from_lock_error() {
        let timeout = LockError::Timeout {
            document_id: "doc-1".into(),
            holder: "hook".into(),
        };
        assert_eq!(SyncError::from(timeout), SyncError::LockTimeout("doc-1".into()));

        let busy = LockError::Busy {
            document_id: "doc-2".into(),
            holder: "hook".into(),
        };
        assert_eq!(SyncError::from(busy), SyncError::ConcurrencyBusy("doc-2".into()));
    }

    #[test]
    fn test_into_crate_error() {
        let err: crate::error::Error = SyncError::TransientGraph("down".into()).into();
        assert_eq!(err.code(), "E200");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = SyncOutcome::Completed(SyncStats {
            invalidated: 2,
            created: 2,
            skipped: 0,
            converged: true,
        });
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["created"], 2);

        let aborted = SyncOutcome::Aborted { invalidated: 3 };
        assert!(aborted.is_aborted());
        assert!(aborted.stats().is_none());
        assert_eq!(serde_json::to_value(aborted).unwrap()["status"], "aborted");
    }

    #[test]
    fn test_outcome_display() {
        let partial = SyncOutcome::Completed(SyncStats {
            invalidated: 1,
            created: 2,
            skipped: 0,
            converged: false,
        });
        assert_eq!(
            partial.to_string(),
            "synced (1 invalidated, 2 created, 0 already present, behind current version)"
        );
        assert_eq!(
            SyncOutcome::Aborted { invalidated: 3 }.to_string(),
            "document gone, 3 episodes retired"
        );
    }
}
