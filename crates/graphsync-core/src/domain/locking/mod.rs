//! Per-document locking for graph sync runs
//!
//! Every worker invocation for a document holds that document's lock for its
//! full duration, so two runs for the same document never interleave while
//! unrelated documents proceed in parallel. There is no global lock.
//!
//! # Architecture
//!
//! - **Lock Manager**: `LockManager`, an in-process registry keyed by document ID
//! - **Guards**: `DocumentLockGuard`, released automatically on drop
//!
//! # Example
//!
//! ```ignore
//! use graphsync_core::domain::locking::LockManager;
//!
//! let manager = LockManager::with_defaults();
//!
//! // Wait up to the configured timeout
//! let guard = manager.acquire("doc-42", "hook", None).await?;
//!
//! // Or skip the document if another run holds it
//! match manager.try_acquire("doc-42", "reconcile") {
//!     Ok(guard) => { /* sync */ }
//!     Err(LockError::Busy { .. }) => { /* try next pass */ }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

pub mod guard;
pub mod manager;
pub mod types;

pub use guard::DocumentLockGuard;
pub use manager::LockManager;
pub use types::{LockConfig, LockError, LockInfo, LockResult};
