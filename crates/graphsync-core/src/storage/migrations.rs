//! Versioned schema migrations
//!
//! Each step runs in its own transaction together with its `_migrations`
//! row, so a crash never leaves a half-applied version behind.

use sqlx::SqlitePool;
use tracing::{debug, info};

struct Migration {
    version: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "documents, segments, sync log",
        sql: r#"
            CREATE TABLE documents (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                content_hash TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                graph_synced INTEGER NOT NULL DEFAULT 0 CHECK (graph_synced IN (0, 1)),
                graph_sync_attempts INTEGER NOT NULL DEFAULT 0,
                last_sync_attempt_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX idx_documents_unsynced ON documents(graph_synced, updated_at);

            CREATE TABLE segments (
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                segment_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                PRIMARY KEY (document_id, segment_key)
            );

            -- Segment set the graph reflects; replaced after each successful sync
            CREATE TABLE synced_segments (
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                segment_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                PRIMARY KEY (document_id, segment_key)
            );

            -- No foreign key: the audit trail outlives the document
            CREATE TABLE sync_log (
                id TEXT PRIMARY KEY NOT NULL,
                document_id TEXT NOT NULL,
                action TEXT NOT NULL CHECK (action IN (
                    'diff_computed', 'graph_sync_succeeded', 'graph_sync_failed', 'graph_sync_aborted'
                )),
                details TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_sync_log_document ON sync_log(document_id, created_at);

            CREATE TRIGGER sync_log_write_once
            BEFORE UPDATE ON sync_log
            BEGIN
                SELECT RAISE(ABORT, 'sync_log entries are write-once');
            END;
        "#,
    },
    Migration {
        version: 2,
        description: "temporal graph episodes",
        sql: r#"
            CREATE TABLE episodes (
                id TEXT PRIMARY KEY NOT NULL,
                group_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                segment_key TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                valid_time TEXT NOT NULL,
                transaction_time TEXT NOT NULL,
                invalidated_at TEXT
            );
            CREATE INDEX idx_episodes_source ON episodes(group_id, document_id, segment_key);
            CREATE INDEX idx_episodes_live ON episodes(group_id, invalidated_at);

            CREATE TABLE episode_entities (
                episode_id TEXT NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
                canonical_name TEXT NOT NULL,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                description TEXT,
                confidence REAL NOT NULL DEFAULT 0.5,
                PRIMARY KEY (episode_id, canonical_name)
            );
            CREATE INDEX idx_episode_entities_name ON episode_entities(canonical_name);

            CREATE TABLE entity_edges (
                id TEXT PRIMARY KEY NOT NULL,
                episode_id TEXT NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
                group_id TEXT NOT NULL,
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                relation TEXT NOT NULL,
                valid_time TEXT NOT NULL,
                fact TEXT,
                weight REAL NOT NULL DEFAULT 0.5,
                invalidated_at TEXT,
                UNIQUE (episode_id, source, target, relation, valid_time)
            );
            CREATE INDEX idx_entity_edges_source ON entity_edges(source, relation);
            CREATE INDEX idx_entity_edges_target ON entity_edges(target, relation);
        "#,
    },
];

/// Latest schema version
pub const CURRENT_VERSION: i32 = 2;

/// Schema version of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}

async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the database's version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current = applied_version(pool).await?;
    if current >= CURRENT_VERSION {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}
