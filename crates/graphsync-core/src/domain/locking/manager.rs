//! Lock manager for coordinating per-document locks
//!
//! The lock manager is the single place sync runs acquire exclusion for a
//! document. It handles:
//! - Blocking acquisition with a bounded wait
//! - Non-blocking acquisition for callers that skip busy documents
//! - Tracking of the current holder for diagnostics
//! - Pruning of idle registry entries when their last guard drops

use super::guard::DocumentLockGuard;
use super::types::{LockConfig, LockError, LockInfo, LockResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// One registry entry: the async mutex plus who currently holds it
#[derive(Debug, Default)]
pub struct LockSlot {
    mutex: Arc<Mutex<()>>,
    holder: StdMutex<Option<LockInfo>>,
}

impl LockSlot {
    pub(crate) fn set_holder(&self, info: Option<LockInfo>) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    fn holder(&self) -> Option<LockInfo> {
        self.holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn holder_label(&self) -> String {
        self.holder()
            .map(|info| info.holder_description)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Map of document_id to lock slot
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: StdMutex<HashMap<String, Arc<LockSlot>>>,
}

impl SlotRegistry {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<LockSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_for(&self, document_id: &str) -> Arc<LockSlot> {
        self.slots()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the entry if nobody but the registry and the releasing guard references it
    pub(crate) fn prune_slot(&self, document_id: &str, slot: &Arc<LockSlot>) {
        let mut slots = self.slots();
        let idle = slots
            .get(document_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) <= 2);
        if idle && slot.mutex.try_lock().is_ok() {
            slots.remove(document_id);
        }
    }
}

/// Lock manager for per-document mutual exclusion
///
/// Cloning is cheap and shares the registry, so the hook and the
/// reconciliation service can hold their own handles.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    config: LockConfig,
    registry: Arc<SlotRegistry>,
}

impl LockManager {
    /// Create a new lock manager with the given configuration
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SlotRegistry::default()),
        }
    }

    /// Create a lock manager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(LockConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the lock for a document, waiting up to `timeout`
    ///
    /// # Arguments
    /// * `document_id` - The document to lock
    /// * `holder_description` - Description of what's acquiring the lock
    /// * `timeout` - How long to wait for the lock (None = use default)
    pub async fn acquire(
        &self,
        document_id: &str,
        holder_description: &str,
        timeout: Option<Duration>,
    ) -> LockResult<DocumentLockGuard> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let slot = self.registry.slot_for(document_id);
        let start = Instant::now();

        debug!(
            document_id = %document_id,
            holder = %holder_description,
            timeout_ms = timeout.as_millis() as u64,
            "Attempting to acquire document lock"
        );

        match tokio::time::timeout(timeout, slot.mutex.clone().lock_owned()).await {
            Ok(permit) => {
                debug!(
                    document_id = %document_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Document lock acquired"
                );
                let info = LockInfo::new(document_id, holder_description);
                Ok(DocumentLockGuard::new(
                    info,
                    slot,
                    permit,
                    Arc::downgrade(&self.registry),
                ))
            }
            Err(_) => Err(LockError::Timeout {
                document_id: document_id.to_string(),
                holder: slot.holder_label(),
            }),
        }
    }

    /// Try to acquire the lock for a document without waiting
    pub fn try_acquire(
        &self,
        document_id: &str,
        holder_description: &str,
    ) -> LockResult<DocumentLockGuard> {
        let slot = self.registry.slot_for(document_id);

        match slot.mutex.clone().try_lock_owned() {
            Ok(permit) => {
                let info = LockInfo::new(document_id, holder_description);
                Ok(DocumentLockGuard::new(
                    info,
                    slot,
                    permit,
                    Arc::downgrade(&self.registry),
                ))
            }
            Err(_) => Err(LockError::Busy {
                document_id: document_id.to_string(),
                holder: slot.holder_label(),
            }),
        }
    }

    /// Check whether a document is currently locked
    pub fn is_locked(&self, document_id: &str) -> bool {
        self.holder(document_id).is_some()
    }

    /// Get information about the current holder of a document lock
    pub fn holder(&self, document_id: &str) -> Option<LockInfo> {
        self.registry
            .slots()
            .get(document_id)
            .and_then(|slot| slot.holder())
    }

    /// List all held locks
    pub fn list_active_locks(&self) -> Vec<LockInfo> {
        self.registry
            .slots()
            .values()
            .filter_map(|slot| slot.holder())
            .collect()
    }

    /// Number of documents with a registry entry
    pub fn tracked_documents(&self) -> usize {
        self.registry.slots().len()
    }

    /// Remove entries that are neither held nor awaited
    pub fn prune_idle(&self) -> usize {
        let mut slots = self.registry.slots();
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1 || slot.mutex.try_lock().is_err());
        before - slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_manager() -> LockManager {
        LockManager::new(LockConfig::default().with_default_timeout(Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = create_test_manager();

        let guard = manager
            .acquire("doc-1", "test", None)
            .await
            .expect("Failed to acquire lock");

        assert_eq!(guard.document_id(), "doc-1");
        assert!(manager.is_locked("doc-1"));
        assert_eq!(
            manager.holder("doc-1").map(|info| info.holder_description),
            Some("test".to_string())
        );

        guard.release();
        assert!(!manager.is_locked("doc-1"));
    }

    #[tokio::test]
    async fn test_idle_entry_pruned_on_release() {
        let manager = create_test_manager();

        let guard = manager.acquire("doc-1", "test", None).await.unwrap();
        assert_eq!(manager.tracked_documents(), 1);

        drop(guard);
        assert_eq!(manager.tracked_documents(), 0);
    }

    #[tokio::test]
    async fn test_try_acquire_busy() {
        let manager = create_test_manager();

        let _guard = manager.acquire("doc-1", "hook", None).await.unwrap();

        let err = manager
            .try_acquire("doc-1", "reconcile")
            .expect_err("second acquisition should be busy");
        assert_eq!(
            err,
            LockError::Busy {
                document_id: "doc-1".to_string(),
                holder: "hook".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let manager = create_test_manager();

        let _guard = manager.acquire("doc-1", "hook", None).await.unwrap();

        let err = manager
            .acquire("doc-1", "hook", Some(Duration::from_millis(20)))
            .await
            .expect_err("acquisition should time out");
        assert!(matches!(err, LockError::Timeout { .. }));
        assert_eq!(err.code(), "E300");
    }

    #[tokio::test]
    async fn test_unrelated_documents_do_not_block() {
        let manager = create_test_manager();

        let _g1 = manager.acquire("doc-1", "a", None).await.unwrap();
        let g2 = manager.try_acquire("doc-2", "b");
        assert!(g2.is_ok());

        let active = manager.list_active_locks();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let manager = create_test_manager();

        let guard = manager.acquire("doc-1", "first", None).await.unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .acquire("doc-1", "second", Some(Duration::from_secs(5)))
                    .await
                    .map(|g| g.info().holder_description.clone())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        let holder = waiter.await.unwrap().expect("waiter should acquire");
        assert_eq!(holder, "second");
    }

    #[tokio::test]
    async fn test_prune_idle_keeps_held_entries() {
        let manager = create_test_manager();

        let _held = manager.acquire("doc-1", "a", None).await.unwrap();
        let _ = manager.acquire("doc-2", "b", None).await.unwrap();

        assert_eq!(manager.prune_idle(), 0);
        assert_eq!(manager.tracked_documents(), 1);
        assert!(manager.is_locked("doc-1"));
    }
}
