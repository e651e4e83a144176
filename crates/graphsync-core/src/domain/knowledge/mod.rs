//! Temporal knowledge graph domain module
//!
//! Each document segment is represented in the graph by an **episode**: the
//! entities and relationships extracted from that segment, stamped with
//! bi-temporal metadata.
//!
//! ## Data Model
//!
//! - **Episode**: versioned fact set for one `(document_id, segment_key)` source
//! - **ExtractedEntity**: a named thing found in the segment
//! - **ExtractedRelationship / EntityEdge**: an explicit edge keyed by
//!   `(source, target, relation, valid_time)`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use graphsync_core::domain::knowledge::{Episode, SourceRef, TemporalGraph};
//!
//! let source = SourceRef::new("doc-42", "pricing");
//! if graph.find_live_episode("doc-42", &source).await?.is_none() {
//!     let extraction = extractor.extract(&segment.content).await?;
//!     let episode = Episode::new(source, &segment.content_hash, modified_at, extraction);
//!     graph.create_episode(&episode).await?;
//! }
//! ```

mod entity;
mod episode;
mod extractor;
mod relationship;
mod repository;

pub use entity::{EntityType, ExtractedEntity};
pub use episode::{Episode, SourceRef};
pub use extractor::{Extraction, Extractor, LlmExtractor, UnavailableExtractor};
pub use relationship::{EdgeKey, EntityEdge, ExtractedRelationship, normalize_relation};
pub use repository::TemporalGraph;
