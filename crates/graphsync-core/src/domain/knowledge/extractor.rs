//! Entity and relationship extraction from segment text
//!
//! The `Extractor` trait is the seam the sync worker calls; `LlmExtractor`
//! implements it against an OpenAI-compatible chat completion endpoint.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::llm::LlmClient;

use super::entity::{EntityType, ExtractedEntity};
use super::relationship::ExtractedRelationship;

/// Minimum confidence score for extracted entities
const MIN_ENTITY_CONFIDENCE: f32 = 0.5;

/// Maximum entities to keep from a single segment
const MAX_ENTITIES_PER_SEGMENT: usize = 25;

/// Maximum relationships to keep from a single segment
const MAX_RELATIONSHIPS_PER_SEGMENT: usize = 40;

/// Maximum segment characters sent to the model
const MAX_CONTENT_CHARS: usize = 12_000;

/// Entities and relationships found in one segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl Extraction {
    /// Check if anything was extracted
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Get total count of extracted items
    pub fn total_count(&self) -> usize {
        self.entities.len() + self.relationships.len()
    }
}

/// Turns segment content into entities and relationships
///
/// Implementations may fail or hang; the caller applies its own timeout.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, content: &str) -> Result<Extraction>;
}

/// Extractor backed by an LLM chat completion
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    llm_client: LlmClient,
}

impl LlmExtractor {
    /// Create a new extractor
    pub fn new(llm_client: LlmClient) -> Self {
        Self { llm_client }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, content: &str) -> Result<Extraction> {
        if content.trim().is_empty() {
            return Ok(Extraction::default());
        }

        let completion = self
            .llm_client
            .complete_json(EXTRACTION_SYSTEM_PROMPT, &build_extraction_prompt(content))
            .await?;
        if completion.truncated {
            return Err(Error::EntityExtractionFailed(format!(
                "response truncated after {} tokens",
                completion.total_tokens
            )));
        }
        let extraction = parse_extraction_response(&completion.text)?;

        debug!(
            model = %completion.model,
            entity_count = extraction.entities.len(),
            relationship_count = extraction.relationships.len(),
            "Extracted entities from segment"
        );

        Ok(extraction)
    }
}

/// Extractor used when no LLM credentials are configured
///
/// Every call fails as a retryable extraction error, so commits still land
/// and the documents wait for reconciliation once a key is provided.
#[derive(Debug, Clone)]
pub struct UnavailableExtractor {
    reason: String,
}

impl UnavailableExtractor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Extractor for UnavailableExtractor {
    async fn extract(&self, _content: &str) -> Result<Extraction> {
        Err(Error::EntityExtractionFailed(self.reason.clone()))
    }
}

/// Build the user prompt for one segment
fn build_extraction_prompt(content: &str) -> String {
    format!(
        r#"Extract the entities and relationships stated in this document excerpt.

EXCERPT:
"""
{content}
"""

For each entity, classify it as one of:
person, organization, location, product, concept, event, date, amount, document, other

For each relationship, give a short snake_case relation label (e.g. "supplies",
"employed_by", "located_in", "signed_on") and the sentence that states it.

Return JSON:
{{
    "entities": [
        {{"name": "entity name", "type": "organization", "description": "brief description", "confidence": 0.9}}
    ],
    "relationships": [
        {{"source": "source entity name", "target": "target entity name", "relation": "supplies", "fact": "supporting sentence", "weight": 0.8}}
    ]
}}"#,
        content = truncate_content(content, MAX_CONTENT_CHARS),
    )
}

/// Parse the LLM extraction response
///
/// Relationships whose endpoints were not extracted as entities are dropped.
pub(crate) fn parse_extraction_response(response: &str) -> Result<Extraction> {
    let json_str = extract_json_from_response(response);

    let raw: RawExtraction = serde_json::from_str(&json_str).map_err(|e| {
        warn!(error = %e, "Failed to parse extraction response as JSON");
        Error::EntityExtractionFailed(format!("Invalid response: {}", e))
    })?;

    let mut seen = HashSet::new();
    let entities: Vec<ExtractedEntity> = raw
        .entities
        .into_iter()
        .filter(|e| e.confidence >= MIN_ENTITY_CONFIDENCE && !e.name.trim().is_empty())
        .map(|e| {
            let entity_type = EntityType::parse(&e.entity_type).unwrap_or(EntityType::Other);
            let mut entity = ExtractedEntity::new(e.name.trim(), entity_type).with_confidence(e.confidence);
            if let Some(desc) = e.description.filter(|d| !d.trim().is_empty()) {
                entity = entity.with_description(desc);
            }
            entity
        })
        .filter(|e| seen.insert(e.canonical_name.clone()))
        .take(MAX_ENTITIES_PER_SEGMENT)
        .collect();

    let mut seen_edges = HashSet::new();
    let relationships: Vec<ExtractedRelationship> = raw
        .relationships
        .into_iter()
        .filter_map(|r| {
            let mut rel = ExtractedRelationship::new(&r.source, &r.target, &r.relation)
                .with_weight(r.weight.unwrap_or(0.5));
            if !seen.contains(&rel.source) || !seen.contains(&rel.target) || rel.relation.is_empty() {
                return None;
            }
            if let Some(fact) = r.fact {
                rel = rel.with_fact(fact);
            }
            Some(rel)
        })
        .filter(|r| seen_edges.insert((r.source.clone(), r.target.clone(), r.relation.clone())))
        .take(MAX_RELATIONSHIPS_PER_SEGMENT)
        .collect();

    Ok(Extraction {
        entities,
        relationships,
    })
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: String,
    description: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source: String,
    target: String,
    #[serde(alias = "type")]
    relation: String,
    #[serde(alias = "description")]
    fact: Option<String>,
    weight: Option<f32>,
}

fn default_confidence() -> f32 {
    0.7
}

/// System prompt for entity extraction
const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured facts from business documents for a knowledge graph.

Guidelines:
1. Extract only entities the text actually names
2. Use the most specific entity type that applies
3. Only state relationships the text asserts; do not infer
4. Use the entity's fullest name as it appears in the text
5. Assign confidence based on how clearly the entity is mentioned

Return valid JSON only, with no additional text or explanation."#;

/// Truncate content to a maximum length on a character boundary
fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((idx, _)) => format!("{}...", &content[..idx]),
    }
}

/// Extract JSON from a response that might contain markdown or other text
fn extract_json_from_response(response: &str) -> String {
    // Try to find JSON in code blocks first
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    // Try to find raw JSON object
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}'))
        && start < end
    {
        return response[start..=end].to_string();
    }

    response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_response() {
        let json = r#"{
            "entities": [
                {"name": "Acme Corp", "type": "organization", "description": "Vendor", "confidence": 0.9},
                {"name": "Globex", "type": "company", "confidence": 0.8},
                {"name": "maybe thing", "type": "concept", "confidence": 0.2}
            ],
            "relationships": [
                {"source": "Acme Corp", "target": "Globex", "relation": "supplies", "fact": "Acme supplies Globex", "weight": 0.7},
                {"source": "Acme Corp", "target": "maybe thing", "relation": "mentions"}
            ]
        }"#;

        let extraction = parse_extraction_response(json).unwrap();
        assert_eq!(extraction.entities.len(), 2);
        assert_eq!(extraction.entities[0].canonical_name, "acme corp");
        assert_eq!(extraction.entities[1].entity_type, EntityType::Organization);

        // Edge to the low-confidence entity is dropped
        assert_eq!(extraction.relationships.len(), 1);
        assert_eq!(extraction.relationships[0].source, "acme corp");
        assert_eq!(extraction.relationships[0].fact.as_deref(), Some("Acme supplies Globex"));
        assert_eq!(extraction.total_count(), 3);
    }

    #[test]
    fn test_parse_deduplicates_entities_and_edges() {
        let json = r#"{
            "entities": [
                {"name": "Acme", "type": "organization"},
                {"name": "ACME", "type": "organization"},
                {"name": "Bob", "type": "person"}
            ],
            "relationships": [
                {"source": "Bob", "target": "Acme", "type": "employed by"},
                {"source": "bob", "target": "acme", "relation": "employed_by"}
            ]
        }"#;

        let extraction = parse_extraction_response(json).unwrap();
        assert_eq!(extraction.entities.len(), 2);
        assert_eq!(extraction.relationships.len(), 1);
        assert_eq!(extraction.relationships[0].relation, "employed_by");
    }

    #[test]
    fn test_unknown_entity_type_maps_to_other() {
        let extraction =
            parse_extraction_response(r#"{"entities": [{"name": "Warp drive", "type": "gadget"}]}"#)
                .unwrap();
        assert_eq!(extraction.entities[0].entity_type, EntityType::Other);
    }

    #[test]
    fn test_malformed_response_is_extraction_error() {
        let err = parse_extraction_response("no json here").unwrap_err();
        assert!(matches!(err, Error::EntityExtractionFailed(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extract_json_from_response() {
        let response = "Here's the analysis:\n```json\n{\"entities\": []}\n```";
        assert_eq!(extract_json_from_response(response), "{\"entities\": []}");

        let response = "The result is {\"entities\": []} as shown.";
        assert_eq!(extract_json_from_response(response), "{\"entities\": []}");
    }

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short", 100), "short");

        let long = "é".repeat(100);
        let truncated = truncate_content(&long, 50);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 53);
    }

    #[test]
    fn test_extraction_is_empty() {
        assert!(Extraction::default().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_extractor_fails_retryably() {
        let extractor = UnavailableExtractor::new("No API key configured");
        let err = extractor.extract("Acme supplies Globex.").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("No API key"));
    }

    #[test]
    fn test_prompt_embeds_content() {
        let prompt = build_extraction_prompt("Acme signed with Globex on 2024-01-05.");
        assert!(prompt.contains("Acme signed with Globex"));
        assert!(prompt.contains("\"relationships\""));
    }
}
