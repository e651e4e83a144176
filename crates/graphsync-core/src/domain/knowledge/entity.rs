//! Extracted entity types for the temporal graph
//!
//! Entities are the named things an extractor finds in a segment. They are
//! stored with the episode that produced them, so retiring the episode
//! retires them too.

use serde::{Deserialize, Serialize};

/// An entity extracted from one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Human-readable name as it appeared in the source
    pub name: String,
    /// Normalized name for deduplication (lowercase, no special chars)
    pub canonical_name: String,
    /// Type of entity
    pub entity_type: EntityType,
    /// Optional description of the entity
    pub description: Option<String>,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
}

impl ExtractedEntity {
    /// Create a new extracted entity
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into();
        let canonical_name = Self::canonicalize(&name);

        Self {
            name,
            canonical_name,
            entity_type,
            description: None,
            confidence: 0.5,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set confidence score
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Canonicalize a name for deduplication
    ///
    /// Converts to lowercase, removes special characters, and normalizes whitespace
    pub fn canonicalize(name: &str) -> String {
        name.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Types of business entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Product,
    /// Abstract concept or topic
    Concept,
    Event,
    Date,
    /// Monetary or numeric amount
    Amount,
    /// Another document, contract, or policy referenced by name
    Document,
    Other,
}

impl EntityType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Product => "product",
            Self::Concept => "concept",
            Self::Event => "event",
            Self::Date => "date",
            Self::Amount => "amount",
            Self::Document => "document",
            Self::Other => "other",
        }
    }

    /// Parse from string representation, accepting a few common synonyms
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "person" | "people" => Some(Self::Person),
            "organization" | "organisation" | "company" | "org" => Some(Self::Organization),
            "location" | "place" => Some(Self::Location),
            "product" | "service" => Some(Self::Product),
            "concept" | "topic" => Some(Self::Concept),
            "event" => Some(Self::Event),
            "date" | "time" => Some(Self::Date),
            "amount" | "money" | "quantity" => Some(Self::Amount),
            "document" | "contract" | "policy" => Some(Self::Document),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Get all entity types
    pub fn all() -> &'static [EntityType] {
        &[
            Self::Person,
            Self::Organization,
            Self::Location,
            Self::Product,
            Self::Concept,
            Self::Event,
            Self::Date,
            Self::Amount,
            Self::Document,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!(ExtractedEntity::canonicalize("Acme, Inc."), "acme inc");
        assert_eq!(ExtractedEntity::canonicalize("  Jane   DOE "), "jane doe");
        assert_eq!(ExtractedEntity::canonicalize("Q3-2024"), "q32024");
    }

    #[test]
    fn test_new_entity_sets_canonical_name() {
        let entity = ExtractedEntity::new("Globex Corporation", EntityType::Organization)
            .with_description("Supplier")
            .with_confidence(1.7);

        assert_eq!(entity.canonical_name, "globex corporation");
        assert_eq!(entity.confidence, 1.0);
        assert_eq!(entity.description.as_deref(), Some("Supplier"));
    }

    #[test]
    fn test_entity_type_round_trip() {
        for ty in EntityType::all() {
            assert_eq!(EntityType::parse(ty.as_str()), Some(*ty));
        }
    }

    #[test]
    fn test_entity_type_synonyms() {
        assert_eq!(EntityType::parse("Company"), Some(EntityType::Organization));
        assert_eq!(EntityType::parse("money"), Some(EntityType::Amount));
        assert_eq!(EntityType::parse("spaceship"), None);
    }
}
