//! Bi-temporal episodes
//!
//! An episode is the graph's record of what one segment asserted.
//! `valid_time` is when the fact was true in the domain (the document's
//! `modified_at`); `transaction_time` is when the graph learned it. An
//! episode is live until `invalidated_at` is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::ExtractedEntity;
use super::extractor::Extraction;
use super::relationship::{EntityEdge, ExtractedRelationship};

/// The segment an episode was produced from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub segment_key: String,
}

impl SourceRef {
    pub fn new(document_id: impl Into<String>, segment_key: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            segment_key: segment_key.into(),
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document_id, self.segment_key)
    }
}

/// A versioned graph fact set for one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    /// Owning document ID
    pub group_id: String,
    pub source_ref: SourceRef,
    /// Hash of the segment content the episode was extracted from
    pub content_hash: String,
    /// Domain time the facts became true
    pub valid_time: DateTime<Utc>,
    /// Wall-clock time the episode was written
    pub transaction_time: DateTime<Utc>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl Episode {
    /// Create a live episode for a segment, stamped now
    pub fn new(
        source_ref: SourceRef,
        content_hash: impl Into<String>,
        valid_time: DateTime<Utc>,
        extraction: Extraction,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            group_id: source_ref.document_id.clone(),
            source_ref,
            content_hash: content_hash.into(),
            valid_time,
            transaction_time: Utc::now(),
            invalidated_at: None,
            entities: extraction.entities,
            relationships: extraction.relationships,
        }
    }

    /// Override the transaction time
    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.transaction_time = at;
        self
    }

    /// Check whether the episode is still live
    pub fn is_live(&self) -> bool {
        self.invalidated_at.is_none()
    }

    /// Check whether the episode was live at a given transaction time
    pub fn was_live_at(&self, at: DateTime<Utc>) -> bool {
        self.transaction_time <= at && self.invalidated_at.is_none_or(|inv| inv > at)
    }

    /// Edge records asserted by this episode
    pub fn edges(&self) -> Vec<EntityEdge> {
        self.relationships
            .iter()
            .map(|rel| {
                let mut edge = EntityEdge::from_extracted(rel, &self.id, &self.group_id, self.valid_time);
                edge.invalidated_at = self.invalidated_at;
                edge
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::EntityType;
    use chrono::Duration;

    fn sample_extraction() -> Extraction {
        Extraction {
            entities: vec![
                ExtractedEntity::new("Acme", EntityType::Organization),
                ExtractedEntity::new("Globex", EntityType::Organization),
            ],
            relationships: vec![ExtractedRelationship::new("Acme", "Globex", "supplies")],
        }
    }

    #[test]
    fn test_new_episode_is_live_and_grouped_by_document() {
        let valid = "2024-03-01T00:00:00Z".parse().unwrap();
        let episode = Episode::new(
            SourceRef::new("doc-1", "pricing"),
            "hash",
            valid,
            sample_extraction(),
        );

        assert!(episode.is_live());
        assert_eq!(episode.group_id, "doc-1");
        assert_eq!(episode.valid_time, valid);
        assert_eq!(episode.source_ref.to_string(), "doc-1#pricing");
    }

    #[test]
    fn test_was_live_at() {
        let mut episode = Episode::new(
            SourceRef::new("doc-1", "a"),
            "hash",
            Utc::now(),
            Extraction::default(),
        );
        let created = episode.transaction_time;
        let retired = created + Duration::seconds(10);
        episode.invalidated_at = Some(retired);

        assert!(!episode.was_live_at(created - Duration::seconds(1)));
        assert!(episode.was_live_at(created + Duration::seconds(5)));
        assert!(!episode.was_live_at(retired));
    }

    #[test]
    fn test_edges_follow_episode_invalidation() {
        let mut episode = Episode::new(
            SourceRef::new("doc-1", "a"),
            "hash",
            Utc::now(),
            sample_extraction(),
        );
        assert!(episode.edges().iter().all(EntityEdge::is_live));

        episode.invalidated_at = Some(Utc::now());
        let edges = episode.edges();
        assert_eq!(edges.len(), 1);
        assert!(!edges[0].is_live());
        assert_eq!(edges[0].episode_id, episode.id);
    }
}
