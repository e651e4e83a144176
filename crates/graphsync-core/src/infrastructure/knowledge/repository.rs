//! SQLite implementation of the TemporalGraph
//!
//! Episodes own their entities and edges. Invalidation stamps the episode
//! and its edges in one transaction; rows are never deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::knowledge::{
    EntityEdge, EntityType, Episode, ExtractedEntity, ExtractedRelationship, SourceRef,
    TemporalGraph,
};
use crate::error::{Error, Result};
use crate::infrastructure::{format_timestamp, parse_timestamp};

/// SQLite implementation of the temporal graph
#[derive(Debug, Clone)]
pub struct SqliteTemporalGraph {
    pool: SqlitePool,
}

impl SqliteTemporalGraph {
    /// Create a new SQLite temporal graph
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attach entities and relationships to a stored episode row
    async fn hydrate(&self, row: EpisodeRow) -> Result<Episode> {
        let entity_rows: Vec<EntityRow> = sqlx::query_as(
            "SELECT * FROM episode_entities WHERE episode_id = ? ORDER BY canonical_name",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let edge_rows: Vec<EdgeRow> = sqlx::query_as(
            "SELECT * FROM entity_edges WHERE episode_id = ? ORDER BY source, relation, target",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let entities = entity_rows
            .into_iter()
            .map(EntityRow::into_entity)
            .collect::<Result<Vec<_>>>()?;
        let relationships = edge_rows
            .into_iter()
            .map(|edge| ExtractedRelationship {
                source: edge.source,
                target: edge.target,
                relation: edge.relation,
                fact: edge.fact,
                weight: edge.weight,
            })
            .collect();

        row.into_episode(entities, relationships)
    }
}

#[async_trait]
impl TemporalGraph for SqliteTemporalGraph {
    async fn create_episode(&self, episode: &Episode) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO episodes (
                id, group_id, document_id, segment_key, content_hash,
                valid_time, transaction_time, invalidated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&episode.id)
        .bind(&episode.group_id)
        .bind(&episode.source_ref.document_id)
        .bind(&episode.source_ref.segment_key)
        .bind(&episode.content_hash)
        .bind(format_timestamp(episode.valid_time))
        .bind(format_timestamp(episode.transaction_time))
        .bind(episode.invalidated_at.map(format_timestamp))
        .execute(&mut *tx)
        .await?;

        for entity in &episode.entities {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO episode_entities (
                    episode_id, canonical_name, name, entity_type, description, confidence
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&episode.id)
            .bind(&entity.canonical_name)
            .bind(&entity.name)
            .bind(entity.entity_type.as_str())
            .bind(&entity.description)
            .bind(entity.confidence)
            .execute(&mut *tx)
            .await?;
        }

        for edge in episode.edges() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO entity_edges (
                    id, episode_id, group_id, source, target, relation,
                    valid_time, fact, weight, invalidated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&edge.id)
            .bind(&edge.episode_id)
            .bind(&edge.group_id)
            .bind(&edge.source)
            .bind(&edge.target)
            .bind(&edge.relation)
            .bind(format_timestamp(edge.valid_time))
            .bind(&edge.fact)
            .bind(edge.weight)
            .bind(edge.invalidated_at.map(format_timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            episode_id = %episode.id,
            source = %episode.source_ref,
            entities = episode.entities.len(),
            relationships = episode.relationships.len(),
            "Episode saved"
        );
        Ok(())
    }

    async fn invalidate_episode(
        &self,
        group_id: &str,
        source_ref: &SourceRef,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = format_timestamp(at);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE entity_edges SET invalidated_at = ?
            WHERE invalidated_at IS NULL AND episode_id IN (
                SELECT id FROM episodes
                WHERE group_id = ? AND document_id = ? AND segment_key = ?
                  AND invalidated_at IS NULL
            )
            "#,
        )
        .bind(&at)
        .bind(group_id)
        .bind(&source_ref.document_id)
        .bind(&source_ref.segment_key)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE episodes SET invalidated_at = ?
            WHERE group_id = ? AND document_id = ? AND segment_key = ?
              AND invalidated_at IS NULL
            "#,
        )
        .bind(&at)
        .bind(group_id)
        .bind(&source_ref.document_id)
        .bind(&source_ref.segment_key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_live_episode(
        &self,
        group_id: &str,
        source_ref: &SourceRef,
    ) -> Result<Option<Episode>> {
        let row: Option<EpisodeRow> = sqlx::query_as(
            r#"
            SELECT * FROM episodes
            WHERE group_id = ? AND document_id = ? AND segment_key = ?
              AND invalidated_at IS NULL
            ORDER BY transaction_time DESC
            LIMIT 1
            "#,
        )
        .bind(group_id)
        .bind(&source_ref.document_id)
        .bind(&source_ref.segment_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_episodes(
        &self,
        group_id: &str,
        include_invalidated: bool,
    ) -> Result<Vec<Episode>> {
        let rows: Vec<EpisodeRow> = sqlx::query_as(
            r#"
            SELECT * FROM episodes
            WHERE group_id = ? AND (? OR invalidated_at IS NULL)
            ORDER BY transaction_time, segment_key
            "#,
        )
        .bind(group_id)
        .bind(include_invalidated)
        .fetch_all(&self.pool)
        .await?;

        let mut episodes = Vec::with_capacity(rows.len());
        for row in rows {
            episodes.push(self.hydrate(row).await?);
        }
        Ok(episodes)
    }

    async fn invalidate_group(&self, group_id: &str, at: DateTime<Utc>) -> Result<u64> {
        let at = format_timestamp(at);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE entity_edges SET invalidated_at = ? WHERE group_id = ? AND invalidated_at IS NULL",
        )
        .bind(&at)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE episodes SET invalidated_at = ? WHERE group_id = ? AND invalidated_at IS NULL",
        )
        .bind(&at)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let invalidated = result.rows_affected();
        if invalidated > 0 {
            debug!(group_id = %group_id, invalidated = invalidated, "Episode group invalidated");
        }
        Ok(invalidated)
    }

    async fn list_edges(
        &self,
        group_id: &str,
        include_invalidated: bool,
    ) -> Result<Vec<EntityEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            SELECT * FROM entity_edges
            WHERE group_id = ? AND (? OR invalidated_at IS NULL)
            ORDER BY valid_time, source, relation, target
            "#,
        )
        .bind(group_id)
        .bind(include_invalidated)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct EpisodeRow {
    id: String,
    group_id: String,
    document_id: String,
    segment_key: String,
    content_hash: String,
    valid_time: String,
    transaction_time: String,
    invalidated_at: Option<String>,
}

impl EpisodeRow {
    fn into_episode(
        self,
        entities: Vec<ExtractedEntity>,
        relationships: Vec<ExtractedRelationship>,
    ) -> Result<Episode> {
        Ok(Episode {
            valid_time: parse_timestamp(&self.valid_time)?,
            transaction_time: parse_timestamp(&self.transaction_time)?,
            invalidated_at: self.invalidated_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            group_id: self.group_id,
            source_ref: SourceRef::new(self.document_id, self.segment_key),
            content_hash: self.content_hash,
            entities,
            relationships,
        })
    }
}

#[derive(Debug, FromRow)]
struct EntityRow {
    canonical_name: String,
    name: String,
    entity_type: String,
    description: Option<String>,
    confidence: f32,
}

impl EntityRow {
    fn into_entity(self) -> Result<ExtractedEntity> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or_else(|| Error::Other(format!("Invalid entity type: {}", self.entity_type)))?;

        Ok(ExtractedEntity {
            name: self.name,
            canonical_name: self.canonical_name,
            entity_type,
            description: self.description,
            confidence: self.confidence,
        })
    }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    id: String,
    episode_id: String,
    group_id: String,
    source: String,
    target: String,
    relation: String,
    valid_time: String,
    fact: Option<String>,
    weight: f32,
    invalidated_at: Option<String>,
}

impl EdgeRow {
    fn into_edge(self) -> Result<EntityEdge> {
        Ok(EntityEdge {
            valid_time: parse_timestamp(&self.valid_time)?,
            invalidated_at: self.invalidated_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            episode_id: self.episode_id,
            group_id: self.group_id,
            source: self.source,
            target: self.target,
            relation: self.relation,
            fact: self.fact,
            weight: self.weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::Extraction;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqliteTemporalGraph {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteTemporalGraph::new(pool)
    }

    fn valid_time() -> DateTime<Utc> {
        "2024-03-01T09:00:00Z".parse().unwrap()
    }

    fn episode(document_id: &str, segment_key: &str) -> Episode {
        let extraction = Extraction {
            entities: vec![
                ExtractedEntity::new("Acme Corp", EntityType::Organization).with_confidence(0.9),
                ExtractedEntity::new("Globex", EntityType::Organization),
            ],
            relationships: vec![
                ExtractedRelationship::new("Acme Corp", "Globex", "supplies")
                    .with_fact("Acme Corp supplies Globex with widgets."),
            ],
        };
        Episode::new(
            SourceRef::new(document_id, segment_key),
            "hash-1",
            valid_time(),
            extraction,
        )
    }

    #[tokio::test]
    async fn test_create_and_find_live_episode() {
        let graph = setup_test_db().await;
        let ep = episode("doc-1", "pricing");
        graph.create_episode(&ep).await.unwrap();

        let source = SourceRef::new("doc-1", "pricing");
        let found = graph.find_live_episode("doc-1", &source).await.unwrap().unwrap();
        assert_eq!(found.id, ep.id);
        assert_eq!(found.valid_time, valid_time());
        assert_eq!(found.transaction_time, ep.transaction_time);
        assert_eq!(found.entities.len(), 2);
        assert_eq!(found.relationships.len(), 1);
        assert_eq!(found.relationships[0].relation, "supplies");

        let other = SourceRef::new("doc-1", "terms");
        assert!(graph.find_live_episode("doc-1", &other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_episode_is_idempotent() {
        let graph = setup_test_db().await;
        let ep = episode("doc-1", "pricing");
        graph.create_episode(&ep).await.unwrap();
        let source = SourceRef::new("doc-1", "pricing");

        assert!(graph.invalidate_episode("doc-1", &source, Utc::now()).await.unwrap());
        assert!(!graph.invalidate_episode("doc-1", &source, Utc::now()).await.unwrap());
        assert!(graph.find_live_episode("doc-1", &source).await.unwrap().is_none());

        let all = graph.list_episodes("doc-1", true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_live());
        assert!(graph.list_episodes("doc-1", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_retires_edges() {
        let graph = setup_test_db().await;
        graph.create_episode(&episode("doc-1", "pricing")).await.unwrap();
        assert_eq!(graph.list_edges("doc-1", false).await.unwrap().len(), 1);

        graph
            .invalidate_episode("doc-1", &SourceRef::new("doc-1", "pricing"), Utc::now())
            .await
            .unwrap();

        assert!(graph.list_edges("doc-1", false).await.unwrap().is_empty());
        let history = graph.list_edges("doc-1", true).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_live());
        assert_eq!(history[0].valid_time, valid_time());
    }

    #[tokio::test]
    async fn test_invalidate_group() {
        let graph = setup_test_db().await;
        graph.create_episode(&episode("doc-1", "a")).await.unwrap();
        graph.create_episode(&episode("doc-1", "b")).await.unwrap();
        graph.create_episode(&episode("doc-2", "a")).await.unwrap();

        assert_eq!(graph.invalidate_group("doc-1", Utc::now()).await.unwrap(), 2);
        assert_eq!(graph.invalidate_group("doc-1", Utc::now()).await.unwrap(), 0);

        assert!(graph.list_episodes("doc-1", false).await.unwrap().is_empty());
        assert_eq!(graph.list_episodes("doc-2", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_keeps_replaced_versions() {
        let graph = setup_test_db().await;
        let source = SourceRef::new("doc-1", "pricing");
        let first = episode("doc-1", "pricing");
        graph.create_episode(&first).await.unwrap();
        graph.invalidate_episode("doc-1", &source, Utc::now()).await.unwrap();

        let second = Episode::new(
            source.clone(),
            "hash-2",
            valid_time() + chrono::Duration::days(1),
            Extraction::default(),
        );
        graph.create_episode(&second).await.unwrap();

        let live = graph.find_live_episode("doc-1", &source).await.unwrap().unwrap();
        assert_eq!(live.id, second.id);
        assert!(live.entities.is_empty());

        let history = graph.list_episodes("doc-1", true).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert!(history[0].invalidated_at.is_some());
    }
}
