//! Sync audit log entries
//!
//! Entries are append-only; the store rejects updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a document's graph state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// The hook diffed a committed version
    DiffComputed,
    /// The worker converged the document's episodes
    GraphSyncSucceeded,
    /// The worker failed; the document stays eligible for reconciliation
    GraphSyncFailed,
    /// The document disappeared mid-sync and its episodes were retired
    GraphSyncAborted,
}

impl SyncAction {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiffComputed => "diff_computed",
            Self::GraphSyncSucceeded => "graph_sync_succeeded",
            Self::GraphSyncFailed => "graph_sync_failed",
            Self::GraphSyncAborted => "graph_sync_aborted",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "diff_computed" => Some(Self::DiffComputed),
            "graph_sync_succeeded" => Some(Self::GraphSyncSucceeded),
            "graph_sync_failed" => Some(Self::GraphSyncFailed),
            "graph_sync_aborted" => Some(Self::GraphSyncAborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit record for one sync-related event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: String,
    pub document_id: String,
    pub action: SyncAction,
    /// JSON payload, e.g. the serialized change list or failure reason
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SyncLogEntry {
    /// Create a new log entry stamped now
    pub fn new(
        document_id: impl Into<String>,
        action: SyncAction,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            action,
            details,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sync_action_round_trip() {
        for action in [
            SyncAction::DiffComputed,
            SyncAction::GraphSyncSucceeded,
            SyncAction::GraphSyncFailed,
            SyncAction::GraphSyncAborted,
        ] {
            assert_eq!(SyncAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(SyncAction::parse("graph_sync_retried"), None);
    }

    #[test]
    fn test_sync_action_serde_matches_as_str() {
        let json = serde_json::to_string(&SyncAction::GraphSyncFailed).unwrap();
        assert_eq!(json, "\"graph_sync_failed\"");
    }

    #[test]
    fn test_log_entry_new() {
        let entry = SyncLogEntry::new("doc-1", SyncAction::GraphSyncFailed, json!({"reason": "x"}));
        assert_eq!(entry.document_id, "doc-1");
        assert_eq!(entry.details["reason"], "x");
        assert!(!entry.id.is_empty());
    }
}
