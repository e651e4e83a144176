//! SQLite connection pool

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::storage::migrations::{self, MigrationStatus};

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Private to one pool; gone when the pool closes
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: Location,
    pub max_connections: u32,
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            max_connections: 5,
            auto_migrate: true,
        }
    }

    /// A single-connection in-memory database
    ///
    /// Every pool connection would otherwise see its own empty database.
    pub fn memory() -> Self {
        Self {
            location: Location::Memory,
            max_connections: 1,
            auto_migrate: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        if self.location != Location::Memory {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = match &self.location {
            Location::Memory => SqliteConnectOptions::new().in_memory(true),
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {}", parent.display())
                    })?;
                }
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
            }
        };
        Ok(options.foreign_keys(true))
    }
}

/// Shared SQLite pool for the document store and the graph
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.location == Location::Memory {
            // Dropping the only connection would discard the database
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options()?)
            .await
            .with_context(|| format!("Failed to open database: {:?}", config.location))?;

        let db = Self { pool, config };
        if db.config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// Open (creating if needed) a database file and migrate it
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(DatabaseConfig::file(path)).await
    }

    /// Migrated in-memory database for tests
    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// File path, or `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        match &self.config.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Failed to run database migrations")
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::in_memory().await.expect("Failed to create database");
        db.health_check().await.expect("Health check failed");
        assert!(!db.migration_status().await.unwrap().needs_migration);
        assert!(db.path().is_none());
    }

    #[test]
    fn test_memory_stays_single_connection() {
        let config = DatabaseConfig::memory().max_connections(8);
        assert_eq!(config.max_connections, 1);

        let config = DatabaseConfig::file("/tmp/x.db").max_connections(0).no_migrate();
        assert_eq!(config.max_connections, 1);
        assert!(!config.auto_migrate);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dir() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("nested").join("graphsync.db");

        let db = Database::open(&path).await.expect("Failed to open database");
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
        db.close().await;

        // Reopening an existing file keeps its schema version
        let db = Database::open(&path).await.expect("Failed to reopen database");
        assert!(!db.migration_status().await.unwrap().needs_migration);
        db.close().await;
    }

    #[tokio::test]
    async fn test_segments_cascade_with_document() {
        let db = Database::in_memory().await.expect("Failed to create database");

        let (fk,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(fk, 1);

        sqlx::query(
            "INSERT INTO documents (id, content_hash, modified_at, created_at, updated_at) VALUES ('d1', 'h', 't', 't', 't')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO segments (document_id, segment_key, position, content, content_hash) VALUES ('d1', 'intro', 0, 'hello', 'x')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("DELETE FROM documents WHERE id = 'd1'")
            .execute(db.pool())
            .await
            .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM segments")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
