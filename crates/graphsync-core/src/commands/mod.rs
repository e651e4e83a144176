//! Commands module - all operations as library functions
//!
//! These commands are used by the CLI. They share a `SyncContext` that wires
//! the SQLite stores, the extractor and the sync services together.

pub mod document;
pub mod sync;

use std::sync::Arc;

use tracing::warn;

use crate::config::{Config, SyncConfig};
use crate::domain::knowledge::{Extractor, LlmExtractor, TemporalGraph, UnavailableExtractor};
use crate::domain::locking::{LockConfig, LockManager};
use crate::domain::sync::{GraphSyncWorker, IngestionHook, ReconciliationService};
use crate::infrastructure::document::SqliteDocumentStore;
use crate::infrastructure::knowledge::SqliteTemporalGraph;
use crate::llm::LlmClient;
use crate::storage::Database;

/// Wired sync services over one database
#[derive(Clone)]
pub struct SyncContext {
    store: Arc<SqliteDocumentStore>,
    graph: Arc<dyn TemporalGraph>,
    worker: Arc<GraphSyncWorker>,
    hook: IngestionHook,
    reconciler: Arc<ReconciliationService>,
}

impl SyncContext {
    /// Wire the services with an explicit extractor
    pub fn new(db: &Database, extractor: Arc<dyn Extractor>, config: SyncConfig) -> Self {
        let graph = Arc::new(SqliteTemporalGraph::new(db.pool().clone()));
        Self::with_graph(db, graph, extractor, config)
    }

    /// Wire the services against another graph engine
    pub fn with_graph(
        db: &Database,
        graph: Arc<dyn TemporalGraph>,
        extractor: Arc<dyn Extractor>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(SqliteDocumentStore::new(db.pool().clone()));
        let locks = LockManager::new(LockConfig::default().with_default_timeout(config.lock_timeout()));

        let worker = Arc::new(GraphSyncWorker::new(
            store.clone(),
            graph.clone(),
            extractor,
            locks,
            config,
        ));

        Self {
            hook: IngestionHook::new(worker.clone()),
            reconciler: Arc::new(ReconciliationService::new(worker.clone())),
            store,
            graph,
            worker,
        }
    }

    /// Wire the services from configuration
    ///
    /// Without an API key every extraction fails retryably, so ingestion
    /// still commits and reconciliation picks the documents up later.
    pub fn from_config(db: &Database, config: &Config) -> Self {
        let extractor: Arc<dyn Extractor> = match LlmClient::from_env(config.llm.clone()) {
            Ok(client) => Arc::new(LlmExtractor::new(client)),
            Err(e) => {
                warn!(error = %e, "LLM extractor unavailable, graph syncs will fail until configured");
                Arc::new(UnavailableExtractor::new(e.to_string()))
            }
        };
        Self::new(db, extractor, config.sync.clone())
    }

    pub fn store(&self) -> &SqliteDocumentStore {
        &self.store
    }

    pub fn graph(&self) -> &dyn TemporalGraph {
        self.graph.as_ref()
    }

    pub fn worker(&self) -> &Arc<GraphSyncWorker> {
        &self.worker
    }

    pub fn hook(&self) -> &IngestionHook {
        &self.hook
    }

    pub fn reconciler(&self) -> &Arc<ReconciliationService> {
        &self.reconciler
    }

    /// Wait for every deferred sync scheduled by the hook
    pub async fn wait_idle(&self) {
        self.hook.wait_idle().await;
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("worker", &self.worker)
            .field("pending", &self.hook.pending())
            .finish_non_exhaustive()
    }
}
