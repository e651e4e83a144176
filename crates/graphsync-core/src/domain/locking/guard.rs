//! Lock guards for RAII-style lock management
//!
//! Guards release the document lock when dropped, so early returns and
//! panics inside a sync run never leave a document locked.

use super::manager::{LockSlot, SlotRegistry};
use super::types::LockInfo;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Exclusive hold on one document's sync path
#[derive(Debug)]
pub struct DocumentLockGuard {
    info: LockInfo,
    slot: Arc<LockSlot>,
    permit: Option<OwnedMutexGuard<()>>,
    registry: Weak<SlotRegistry>,
}

impl DocumentLockGuard {
    pub(crate) fn new(
        info: LockInfo,
        slot: Arc<LockSlot>,
        permit: OwnedMutexGuard<()>,
        registry: Weak<SlotRegistry>,
    ) -> Self {
        slot.set_holder(Some(info.clone()));
        Self {
            info,
            slot,
            permit: Some(permit),
            registry,
        }
    }

    /// Get the lock ID
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    /// Get the locked document ID
    pub fn document_id(&self) -> &str {
        &self.info.document_id
    }

    /// Get the lock info
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Explicitly release the lock (normally done automatically on drop)
    pub fn release(self) {}
}

impl Drop for DocumentLockGuard {
    fn drop(&mut self) {
        self.slot.set_holder(None);
        self.permit.take();

        if let Some(registry) = self.registry.upgrade() {
            registry.prune_slot(&self.info.document_id, &self.slot);
        }
    }
}

impl fmt::Display for DocumentLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lock[document:{}] held by {}",
            self.info.document_id, self.info.holder_description
        )
    }
}
