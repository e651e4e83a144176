//! Document store infrastructure
//!
//! SQLite implementation of the `DocumentStore` trait.

mod repository;

pub use repository::SqliteDocumentStore;
