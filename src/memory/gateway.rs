//! Public entry point for the conversational loop.
//!
//! Composes the retrieval engine, cache invalidation, and performance
//! monitoring into the three operations the assistant actually calls:
//! `retrieve`, `add`, and `clear`, all scoped per user.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::memory::cache::{user_key_prefix, CacheStats, CacheStore};
use crate::memory::retrieval::{RetrievalEngine, RetrievalOptions};
use crate::memory::{MemoryRecord, VectorStore};
use crate::perf::{OperationStats, PerformanceMonitor};

/// Gateway owning the memory mediator's moving parts. One instance per
/// application session; dropping it tears everything down.
pub struct MemoryGateway {
    engine: RetrievalEngine,
    cache: Arc<CacheStore>,
    monitor: Arc<PerformanceMonitor>,
    store: Arc<dyn VectorStore>,
}

impl MemoryGateway {
    pub fn new(store: Arc<dyn VectorStore>, config: MemoryConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Build the gateway with an injected clock. Tests use this with a
    /// manual clock to exercise TTL expiry and slow-operation paths.
    pub fn with_clock(
        store: Arc<dyn VectorStore>,
        config: MemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(
            config.effective_cache_size(),
            config.cache_ttl,
            clock.clone(),
        ));
        let monitor = Arc::new(PerformanceMonitor::new(
            config.performance_monitoring,
            config.slow_op_threshold,
            clock,
        ));
        let engine = RetrievalEngine::new(
            store.clone(),
            cache.clone(),
            monitor.clone(),
            config,
        );
        Self {
            engine,
            cache,
            monitor,
            store,
        }
    }

    /// Retrieve the memories most relevant to `query` for this user.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        opts: &RetrievalOptions,
    ) -> Result<Vec<MemoryRecord>> {
        self.monitor
            .measure("memory.retrieve", self.engine.retrieve(user_id, query, opts))
            .await
    }

    /// Store a new memory, stamping timestamp and application metadata the
    /// way the vector store expects. The user's cached retrievals are
    /// invalidated eagerly so a query issued right after the add never sees
    /// pre-insertion results.
    pub async fn add(
        &self,
        user_id: &str,
        content: &str,
        mut metadata: HashMap<String, Value>,
    ) -> Result<String> {
        metadata
            .entry("timestamp".to_string())
            .or_insert_with(|| json!(Utc::now().to_rfc3339()));
        metadata
            .entry("app".to_string())
            .or_insert_with(|| json!("memgate"));

        let id = self
            .monitor
            .measure("memory.add", self.store.add(user_id, content, metadata))
            .await?;

        let prefix = user_key_prefix(user_id);
        let dropped = self.cache.invalidate(|key| key.starts_with(&prefix)).await;
        debug!(user_id, memory_id = id.as_str(), dropped, "memory added");
        Ok(id)
    }

    /// Remove every memory belonging to the user, from the backend and the
    /// cache both. Returns how many backend memories were removed.
    ///
    /// The cache invalidation is unconditional: a failed backend clear may
    /// have removed some memories already, so cached pre-clear results must
    /// not outlive the call either way.
    pub async fn clear(&self, user_id: &str) -> Result<usize> {
        let cleared = self
            .monitor
            .measure("memory.clear", self.store.clear(user_id))
            .await;

        let prefix = user_key_prefix(user_id);
        let dropped = self.cache.invalidate(|key| key.starts_with(&prefix)).await;

        let removed = cleared?;
        info!(user_id, removed, dropped, "cleared user memories");
        Ok(removed)
    }

    /// Cache usage counters for the diagnostics view.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Timing statistics for one operation name.
    pub fn operation_stats(&self, operation: &str) -> OperationStats {
        self.monitor.stats_for(operation)
    }

    /// Log a summary of every tracked operation.
    pub fn log_performance_summary(&self) {
        self.monitor.log_summary();
    }

    /// Drop expired cache entries eagerly. Optional maintenance; reads
    /// already re-validate lazily.
    pub async fn evict_expired(&self) -> usize {
        self.cache.evict_expired().await
    }
}
