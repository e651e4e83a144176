//! Storage layer - SQLite
//!
//! One pool backs both the document store and the temporal graph.
//!
//! ```ignore
//! use graphsync_core::storage::Database;
//!
//! let db = Database::open("/var/lib/graphsync/graphsync.db").await?;
//! let scratch = Database::in_memory().await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, Location};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
