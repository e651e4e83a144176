//! Lock types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Lock errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Lock acquisition timed out
    #[error("Lock timeout: document '{document_id}' is held by {holder}")]
    Timeout { document_id: String, holder: String },

    /// Lock is held and the caller asked not to wait
    #[error("Lock busy: document '{document_id}' is held by {holder}")]
    Busy { document_id: String, holder: String },
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E300",
            Self::Busy { .. } => "E301",
        }
    }

    /// The document the failed acquisition was for
    pub fn document_id(&self) -> &str {
        match self {
            Self::Timeout { document_id, .. } | Self::Busy { document_id, .. } => document_id,
        }
    }
}

/// Information about a held document lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Lock ID, unique per acquisition
    pub id: Uuid,

    /// Document the lock is keyed by
    pub document_id: String,

    /// Description of the lock holder (e.g., "hook", "reconcile")
    pub holder_description: String,

    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    /// Create lock info for a fresh acquisition
    pub fn new(document_id: impl Into<String>, holder_description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.into(),
            holder_description: holder_description.into(),
            acquired_at: Utc::now(),
        }
    }

    /// How long the lock has been held
    pub fn held_for(&self) -> Duration {
        (Utc::now() - self.acquired_at).to_std().unwrap_or_default()
    }
}

/// Configuration for the lock manager
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Wait bound used when the caller passes no timeout
    pub default_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
        }
    }
}

impl LockConfig {
    /// Set the default timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_error_codes() {
        let timeout = LockError::Timeout {
            document_id: "doc-1".to_string(),
            holder: "hook".to_string(),
        };
        let busy = LockError::Busy {
            document_id: "doc-2".to_string(),
            holder: "reconcile".to_string(),
        };

        assert_eq!(timeout.code(), "E300");
        assert_eq!(busy.code(), "E301");
        assert_eq!(timeout.document_id(), "doc-1");
        assert_eq!(busy.document_id(), "doc-2");
        assert!(timeout.to_string().contains("held by hook"));
    }

    #[test]
    fn test_lock_info_new() {
        let info = LockInfo::new("doc-1", "reconcile");
        assert_eq!(info.document_id, "doc-1");
        assert_eq!(info.holder_description, "reconcile");
        assert!(info.held_for() < Duration::from_secs(5));
    }

    #[test]
    fn test_lock_config_builder() {
        let config = LockConfig::default().with_default_timeout(Duration::from_millis(250));
        assert_eq!(config.default_timeout, Duration::from_millis(250));
    }
}
