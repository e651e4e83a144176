//! Error types for graphsync

use thiserror::Error;

/// Result type alias using graphsync's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Graphsync error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Document '{0}' not found. Run `graphsync status` to see all documents.")]
    DocumentNotFound(String),

    #[error("Episode '{0}' not found.")]
    EpisodeNotFound(String),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check that GRAPHSYNC_API_KEY is set.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Graph errors (E200-E299)
    #[error("Graph engine error: {0}")]
    GraphError(String),

    #[error("Entity extraction failed: {0}")]
    EntityExtractionFailed(String),

    // Lock errors (E300-E399)
    #[error("Lock timeout: document '{0}' is being synchronized by another task. Try again later.")]
    LockTimeout(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound(_) => "E001",
            Self::EpisodeNotFound(_) => "E002",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::GraphError(_) => "E200",
            Self::EntityExtractionFailed(_) => "E201",
            Self::LockTimeout(_) => "E300",
            Self::DatabaseError(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::DocumentNotFound(_) => Some("graphsync status".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("export GRAPHSYNC_API_KEY=...".to_string()),
            Self::GraphError(_) | Self::EntityExtractionFailed(_) => {
                Some("graphsync reconcile".to_string())
            }
            Self::ConfigError(_) => Some("graphsync config list".to_string()),
            _ => None,
        }
    }

    /// Whether a graph sync that hit this error should be retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_)
                | Self::LLMError(_)
                | Self::RateLimited(_)
                | Self::GraphError(_)
                | Self::EntityExtractionFailed(_)
                | Self::LockTimeout(_)
                | Self::DatabaseError(_)
        )
    }
}
