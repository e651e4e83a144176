//! Relationship edges for the temporal graph
//!
//! Relationships are explicit edge records keyed by
//! `(source, target, relation, valid_time)`. They are never materialized as
//! an in-memory object graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::ExtractedEntity;

/// A relationship found by the extractor, before it is stamped with time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Canonical name of the source entity
    pub source: String,
    /// Canonical name of the target entity
    pub target: String,
    /// Relation label in snake_case (e.g. "supplies", "employed_by")
    pub relation: String,
    /// The sentence-level fact supporting the edge
    pub fact: Option<String>,
    /// Weight/strength of the relationship (0.0 to 1.0)
    pub weight: f32,
}

impl ExtractedRelationship {
    /// Create a new relationship, canonicalizing both endpoints
    pub fn new(source: &str, target: &str, relation: &str) -> Self {
        Self {
            source: ExtractedEntity::canonicalize(source),
            target: ExtractedEntity::canonicalize(target),
            relation: normalize_relation(relation),
            fact: None,
            weight: 0.5,
        }
    }

    /// Set the supporting fact
    pub fn with_fact(mut self, fact: impl Into<String>) -> Self {
        self.fact = Some(fact.into());
        self
    }

    /// Set the weight
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }
}

/// Identity of an edge in the temporal graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub valid_time: DateTime<Utc>,
}

/// A stored edge, owned by the episode that asserted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    pub id: String,
    pub episode_id: String,
    pub group_id: String,
    pub source: String,
    pub target: String,
    pub relation: String,
    /// Valid time of the asserting episode
    pub valid_time: DateTime<Utc>,
    pub fact: Option<String>,
    pub weight: f32,
    /// Mirrors the owning episode's invalidation
    pub invalidated_at: Option<DateTime<Utc>>,
}

impl EntityEdge {
    /// Stamp an extracted relationship for an episode
    pub fn from_extracted(
        relationship: &ExtractedRelationship,
        episode_id: &str,
        group_id: &str,
        valid_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            episode_id: episode_id.to_string(),
            group_id: group_id.to_string(),
            source: relationship.source.clone(),
            target: relationship.target.clone(),
            relation: relationship.relation.clone(),
            valid_time,
            fact: relationship.fact.clone(),
            weight: relationship.weight,
            invalidated_at: None,
        }
    }

    /// The edge's identity key
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            relation: self.relation.clone(),
            valid_time: self.valid_time,
        }
    }

    /// Check whether the edge is still asserted
    pub fn is_live(&self) -> bool {
        self.invalidated_at.is_none()
    }
}

/// Normalize a free-form relation label to snake_case
pub fn normalize_relation(relation: &str) -> String {
    relation
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_canonicalizes_endpoints() {
        let rel = ExtractedRelationship::new("Acme, Inc.", "Globex", "Supplies To")
            .with_weight(2.0)
            .with_fact("Acme supplies widgets to Globex");

        assert_eq!(rel.source, "acme inc");
        assert_eq!(rel.target, "globex");
        assert_eq!(rel.relation, "supplies_to");
        assert_eq!(rel.weight, 1.0);
    }

    #[test]
    fn test_normalize_relation() {
        assert_eq!(normalize_relation("employed-by"), "employed_by");
        assert_eq!(normalize_relation("  REPORTS  TO "), "reports_to");
        assert_eq!(normalize_relation("owns"), "owns");
    }

    #[test]
    fn test_edge_key_includes_valid_time() {
        let rel = ExtractedRelationship::new("a", "b", "knows");
        let t1 = "2024-01-01T00:00:00Z".parse().unwrap();
        let t2 = "2024-02-01T00:00:00Z".parse().unwrap();

        let e1 = EntityEdge::from_extracted(&rel, "ep-1", "doc-1", t1);
        let e2 = EntityEdge::from_extracted(&rel, "ep-2", "doc-1", t2);

        assert_ne!(e1.key(), e2.key());
        assert_eq!(e1.key().relation, "knows");
        assert!(e1.is_live());
    }
}
