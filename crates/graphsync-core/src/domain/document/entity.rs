//! Document and segment types
//!
//! A document is the record of truth; its segments are the ordered units
//! the graph is built from. Diff identity is `(document_id, segment_key)`,
//! never position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A document in the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Identity of the current content
    pub content_hash: String,
    /// Domain timestamp of the current version; becomes the graph valid time
    pub modified_at: DateTime<Utc>,
    /// Whether the graph reflects the current content
    pub graph_synced: bool,
    /// Failed sync attempts since the last success or content change
    pub graph_sync_attempts: u32,
    /// When the worker last tried to sync this document
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new, not-yet-synced document
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content_hash: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content_hash: content_hash.into(),
            modified_at,
            graph_synced: false,
            graph_sync_attempts: 0,
            last_sync_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the retry budget is spent
    pub fn is_over_limit(&self, max_attempts: u32) -> bool {
        self.graph_sync_attempts >= max_attempts
    }
}

/// An ordered unit of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub document_id: String,
    /// Stable key used for diffing (e.g. a section slug)
    pub segment_key: String,
    /// Order within the document
    pub position: u32,
    pub content: String,
    pub content_hash: String,
}

impl Segment {
    /// Create a segment, hashing its content
    pub fn new(
        document_id: impl Into<String>,
        segment_key: impl Into<String>,
        position: u32,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            document_id: document_id.into(),
            segment_key: segment_key.into(),
            position,
            content_hash: compute_content_hash(&content),
            content,
        }
    }
}

/// Compute SHA-256 hash of content
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_content_hash() {
        let hash = compute_content_hash("hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, compute_content_hash("hello!"));
    }

    #[test]
    fn test_segment_hashes_content() {
        let a = Segment::new("doc-1", "intro", 0, "Acme signed with Globex.");
        let b = Segment::new("doc-1", "intro", 3, "Acme signed with Globex.");
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_document_is_unsynced() {
        let doc = Document::new("doc-1", "Contract", "abc", Utc::now());
        assert!(!doc.graph_synced);
        assert_eq!(doc.graph_sync_attempts, 0);
        assert!(doc.last_sync_attempt_at.is_none());
    }

    #[test]
    fn test_is_over_limit() {
        let mut doc = Document::new("doc-1", "", "abc", Utc::now());
        doc.graph_sync_attempts = 2;
        assert!(!doc.is_over_limit(3));
        doc.graph_sync_attempts = 3;
        assert!(doc.is_over_limit(3));
    }
}
