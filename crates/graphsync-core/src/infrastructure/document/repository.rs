//! SQLite implementation of the DocumentStore
//!
//! Documents, segments, the synced snapshot and the audit log share one
//! database so each status change commits atomically with its snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::document::{Document, DocumentStore, Segment, SyncAction, SyncLogEntry};
use crate::domain::sync::same_content;
use crate::error::{Error, Result};
use crate::infrastructure::{format_timestamp, parse_timestamp};

/// SQLite implementation of the document store
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Create a new SQLite document store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    // ========== Snapshot Access ==========

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_document()).transpose()
    }

    async fn get_segments(&self, document_id: &str) -> Result<Vec<Segment>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            "SELECT * FROM segments WHERE document_id = ? ORDER BY position, segment_key",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SegmentRow::into_segment).collect())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> =
            sqlx::query_as("SELECT * FROM documents ORDER BY updated_at DESC, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.into_document()).collect()
    }

    // ========== Primary Commit ==========

    async fn commit_document(&self, document: &Document, segments: &[Segment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // A changed hash puts the document back in the unsynced set with a fresh budget
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, title, content_hash, modified_at, graph_synced,
                graph_sync_attempts, last_sync_attempt_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 0, 0, NULL, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content_hash = excluded.content_hash,
                modified_at = excluded.modified_at,
                updated_at = excluded.updated_at,
                graph_synced = CASE
                    WHEN documents.content_hash = excluded.content_hash THEN documents.graph_synced
                    ELSE 0
                END,
                graph_sync_attempts = CASE
                    WHEN documents.content_hash = excluded.content_hash THEN documents.graph_sync_attempts
                    ELSE 0
                END,
                last_sync_attempt_at = CASE
                    WHEN documents.content_hash = excluded.content_hash THEN documents.last_sync_attempt_at
                    ELSE NULL
                END
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(&document.content_hash)
        .bind(format_timestamp(document.modified_at))
        .bind(format_timestamp(document.created_at))
        .bind(format_timestamp(document.updated_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM segments WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        for segment in segments {
            insert_segment(&mut tx, "segments", &document.id, segment).await?;
        }

        tx.commit().await?;

        debug!(
            document_id = %document.id,
            segments = segments.len(),
            content_hash = %document.content_hash,
            "Document committed"
        );
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        for table in ["segments", "synced_segments"] {
            sqlx::query(&format!("DELETE FROM {} WHERE document_id = ?", table))
                .bind(document_id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(document_id = %document_id, "Document deleted");
        }
        Ok(deleted)
    }

    // ========== Sync Status ==========

    async fn list_unsynced(&self, limit: usize, max_attempts: u32) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT * FROM documents
            WHERE graph_synced = 0 AND graph_sync_attempts < ?
            ORDER BY updated_at, id
            LIMIT ?
            "#,
        )
        .bind(max_attempts as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_document()).collect()
    }

    async fn list_over_limit(&self, max_attempts: u32) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT * FROM documents
            WHERE graph_synced = 0 AND graph_sync_attempts >= ?
            ORDER BY updated_at, id
            "#,
        )
        .bind(max_attempts as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_document()).collect()
    }

    async fn get_synced_segments(&self, document_id: &str) -> Result<Vec<Segment>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            "SELECT * FROM synced_segments WHERE document_id = ? ORDER BY position, segment_key",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SegmentRow::into_segment).collect())
    }

    async fn record_sync_success(&self, document_id: &str, snapshot: &[Segment]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the write lock, so no commit can land between
        // the convergence check below and the status update
        sqlx::query("DELETE FROM synced_segments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for segment in snapshot {
            insert_segment(&mut tx, "synced_segments", document_id, segment).await?;
        }

        let rows: Vec<SegmentRow> = sqlx::query_as(
            "SELECT * FROM segments WHERE document_id = ? ORDER BY position, segment_key",
        )
        .bind(document_id)
        .fetch_all(&mut *tx)
        .await?;
        let current: Vec<Segment> = rows.into_iter().map(SegmentRow::into_segment).collect();
        let converged = same_content(snapshot, &current);

        sqlx::query(
            r#"
            UPDATE documents
            SET graph_synced = ?, graph_sync_attempts = 0, last_sync_attempt_at = ?
            WHERE id = ?
            "#,
        )
        .bind(converged)
        .bind(format_timestamp(Utc::now()))
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            document_id = %document_id,
            segments = snapshot.len(),
            converged = converged,
            "Sync success recorded"
        );
        Ok(converged)
    }

    async fn record_sync_failure(&self, document_id: &str, at: DateTime<Utc>) -> Result<u32> {
        let attempts: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE documents
            SET graph_synced = 0,
                graph_sync_attempts = graph_sync_attempts + 1,
                last_sync_attempt_at = ?
            WHERE id = ?
            RETURNING graph_sync_attempts
            "#,
        )
        .bind(format_timestamp(at))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts.map(|(n,)| n as u32).unwrap_or(0))
    }

    // ========== Audit Log ==========

    async fn append_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let details = serde_json::to_string(&entry.details)?;

        sqlx::query(
            "INSERT INTO sync_log (id, document_id, action, details, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.document_id)
        .bind(entry.action.as_str())
        .bind(&details)
        .bind(format_timestamp(entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_log(&self, document_id: &str) -> Result<Vec<SyncLogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT * FROM sync_log WHERE document_id = ? ORDER BY created_at, rowid",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entry()).collect()
    }
}

async fn insert_segment(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &str,
    document_id: &str,
    segment: &Segment,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {} (document_id, segment_key, position, content, content_hash) VALUES (?, ?, ?, ?, ?)",
        table
    ))
    .bind(document_id)
    .bind(&segment.segment_key)
    .bind(segment.position as i64)
    .bind(&segment.content)
    .bind(&segment.content_hash)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    content_hash: String,
    modified_at: String,
    graph_synced: bool,
    graph_sync_attempts: i64,
    last_sync_attempt_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document> {
        Ok(Document {
            modified_at: parse_timestamp(&self.modified_at)?,
            last_sync_attempt_at: self
                .last_sync_attempt_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            title: self.title,
            content_hash: self.content_hash,
            graph_synced: self.graph_synced,
            graph_sync_attempts: self.graph_sync_attempts.max(0) as u32,
        })
    }
}

#[derive(Debug, FromRow)]
struct SegmentRow {
    document_id: String,
    segment_key: String,
    position: i64,
    content: String,
    content_hash: String,
}

impl SegmentRow {
    fn into_segment(self) -> Segment {
        Segment {
            document_id: self.document_id,
            segment_key: self.segment_key,
            position: self.position.max(0) as u32,
            content: self.content,
            content_hash: self.content_hash,
        }
    }
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: String,
    document_id: String,
    action: String,
    details: String,
    created_at: String,
}

impl LogRow {
    fn into_entry(self) -> Result<SyncLogEntry> {
        let action = SyncAction::parse(&self.action)
            .ok_or_else(|| Error::Other(format!("Invalid sync action: {}", self.action)))?;

        Ok(SyncLogEntry {
            id: self.id,
            document_id: self.document_id,
            action,
            details: serde_json::from_str(&self.details)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
