//! Document domain module
//!
//! Record-of-truth shapes the sync subsystem reads and the status and
//! audit records it writes.

mod entity;
mod event;
mod repository;

pub use entity::{Document, Segment, compute_content_hash};
pub use event::{SyncAction, SyncLogEntry};
pub use repository::DocumentStore;
