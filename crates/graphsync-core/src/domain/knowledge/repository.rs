//! Repository trait for the temporal graph engine
//!
//! The graph sync worker is the only writer. Operations are idempotent:
//! invalidating an already-invalidated episode is a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

use super::episode::{Episode, SourceRef};
use super::relationship::EntityEdge;

/// Temporal graph engine contract
#[async_trait]
pub trait TemporalGraph: Send + Sync {
    /// Persist a new episode with its entities and edges
    async fn create_episode(&self, episode: &Episode) -> Result<()>;

    /// Set `invalidated_at` on the live episode for a source, if any
    ///
    /// Returns whether an episode was invalidated.
    async fn invalidate_episode(
        &self,
        group_id: &str,
        source_ref: &SourceRef,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Find the live episode for a source
    async fn find_live_episode(
        &self,
        group_id: &str,
        source_ref: &SourceRef,
    ) -> Result<Option<Episode>>;

    /// List a group's episodes ordered by transaction time
    async fn list_episodes(&self, group_id: &str, include_invalidated: bool)
    -> Result<Vec<Episode>>;

    /// Invalidate every live episode in a group, returning how many were retired
    async fn invalidate_group(&self, group_id: &str, at: DateTime<Utc>) -> Result<u64>;

    /// List edges asserted within a group
    async fn list_edges(&self, group_id: &str, include_invalidated: bool)
    -> Result<Vec<EntityEdge>>;
}
