//! Temporal graph infrastructure
//!
//! SQLite implementation of the `TemporalGraph` trait. Episodes, their
//! entities and edges live in the same database as the documents.

mod repository;

pub use repository::SqliteTemporalGraph;
