//! Domain layer
//!
//! Document and graph models, the per-document lock, and the sync
//! subsystem that connects them.

pub mod document;
pub mod knowledge;
pub mod locking;
pub mod sync;
