//! Retrieval engine: similarity queries with caching, threshold filtering,
//! and top-k truncation.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::memory::cache::{self, CacheStore};
use crate::memory::{MemoryRecord, VectorStore};
use crate::perf::PerformanceMonitor;

/// Per-call overrides for retrieval parameters. Unset fields fall back to
/// the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub max_results: Option<usize>,
    pub similarity_threshold: Option<f32>,
}

/// Issues similarity queries against the vector store and produces the final
/// ordered memory list.
pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    cache: Arc<CacheStore>,
    monitor: Arc<PerformanceMonitor>,
    config: MemoryConfig,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        cache: Arc<CacheStore>,
        monitor: Arc<PerformanceMonitor>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            cache,
            monitor,
            config,
        }
    }

    /// Retrieve the memories most relevant to `query` for `user_id`.
    ///
    /// Consults the cache first; on a miss, queries the backend, keeps only
    /// records at or above the similarity threshold, orders them by
    /// descending score (stable, so backend order breaks ties), truncates to
    /// the result limit, and caches the final list. Backend failures cache
    /// nothing and propagate.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        opts: &RetrievalOptions,
    ) -> Result<Vec<MemoryRecord>> {
        let max_results = opts.max_results.unwrap_or(self.config.max_results);
        let threshold = opts
            .similarity_threshold
            .unwrap_or(self.config.similarity_threshold);

        let key = cache::fingerprint(
            user_id,
            query,
            max_results,
            threshold,
            &self.config.collection_name,
        );

        if let Some(cached) = self.cache.get(&key).await {
            debug!(user_id, results = cached.len(), "memory cache hit");
            return Ok(cached);
        }

        let candidates = self
            .monitor
            .measure(
                "vector_store.query",
                self.store.query(user_id, query, max_results),
            )
            .await?;

        let total = candidates.len();
        let mut kept: Vec<MemoryRecord> = candidates
            .into_iter()
            .filter(|r| r.relevance_score >= threshold)
            .collect();
        kept.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        kept.truncate(max_results);

        debug!(
            user_id,
            candidates = total,
            kept = kept.len(),
            threshold,
            "retrieved memories from vector store"
        );

        self.cache.put(&key, kept.clone(), None).await;
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::MemoryError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Vector store that serves a fixed candidate list and counts queries.
    struct ScriptedStore {
        results: Vec<MemoryRecord>,
        fail: bool,
        queries: AtomicUsize,
    }

    impl ScriptedStore {
        fn returning(results: Vec<MemoryRecord>) -> Self {
            Self {
                results,
                fail: false,
                queries: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                results: Vec::new(),
                fail: true,
                queries: AtomicUsize::new(0),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl VectorStore for ScriptedStore {
        async fn query(
            &self,
            _user_id: &str,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<MemoryRecord>> {
            self.queries.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail {
                return Err(MemoryError::retrieval(anyhow::anyhow!("backend timeout")));
            }
            Ok(self.results.clone())
        }

        async fn add(
            &self,
            _user_id: &str,
            _content: &str,
            _metadata: HashMap<String, serde_json::Value>,
        ) -> Result<String> {
            Ok("unused".into())
        }

        async fn clear(&self, _user_id: &str) -> Result<usize> {
            Ok(0)
        }
    }

    fn scored(scores: &[f32]) -> Vec<MemoryRecord> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| MemoryRecord::new(format!("m-{i}"), format!("memory {i}"), *s))
            .collect()
    }

    fn engine(store: Arc<ScriptedStore>, config: MemoryConfig) -> RetrievalEngine {
        let clock = Arc::new(ManualClock::new());
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
        RetrievalEngine::new(store, cache, monitor, config)
    }

    #[tokio::test]
    async fn filters_below_the_similarity_threshold() {
        let store = Arc::new(ScriptedStore::returning(scored(&[0.9, 0.85, 0.5, 0.3])));
        let engine = engine(store, MemoryConfig::default());

        let opts = RetrievalOptions {
            max_results: Some(5),
            similarity_threshold: Some(0.6),
        };
        let results = engine.retrieve("u1", "coffee", &opts).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "m-0");
        assert_eq!(results[1].id, "m-1");
    }

    #[tokio::test]
    async fn zero_threshold_admits_everything() {
        let store = Arc::new(ScriptedStore::returning(scored(&[0.9, 0.1, 0.0])));
        let engine = engine(store, MemoryConfig::default());

        let opts = RetrievalOptions {
            max_results: Some(10),
            similarity_threshold: Some(0.0),
        };
        let results = engine.retrieve("u1", "q", &opts).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn truncates_to_max_results_highest_first() {
        let scores: Vec<f32> = (0..10).map(|i| 1.0 - i as f32 * 0.05).collect();
        let store = Arc::new(ScriptedStore::returning(scored(&scores)));
        let engine = engine(store, MemoryConfig::default());

        let opts = RetrievalOptions {
            max_results: Some(5),
            similarity_threshold: Some(0.0),
        };
        let results = engine.retrieve("u1", "q", &opts).await.unwrap();

        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
        assert_eq!(results[0].id, "m-0");
    }

    #[tokio::test]
    async fn sorts_unsorted_backend_results_stably() {
        let store = Arc::new(ScriptedStore::returning(scored(&[0.5, 0.9, 0.5, 0.7])));
        let engine = engine(store, MemoryConfig::default());

        let opts = RetrievalOptions {
            max_results: Some(10),
            similarity_threshold: Some(0.0),
        };
        let results = engine.retrieve("u1", "q", &opts).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        // Equal-score records keep their original return order.
        assert_eq!(ids, vec!["m-1", "m-3", "m-0", "m-2"]);
    }

    #[tokio::test]
    async fn identical_queries_hit_the_backend_once() {
        let store = Arc::new(ScriptedStore::returning(scored(&[0.9])));
        let engine = engine(store.clone(), MemoryConfig::default());

        let opts = RetrievalOptions {
            max_results: Some(5),
            similarity_threshold: Some(0.8),
        };
        let first = engine.retrieve("u1", "q", &opts).await.unwrap();
        let second = engine.retrieve("u1", "q", &opts).await.unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn different_parameters_miss_the_cache() {
        let store = Arc::new(ScriptedStore::returning(scored(&[0.9])));
        let engine = engine(store.clone(), MemoryConfig::default());

        let a = RetrievalOptions {
            max_results: Some(5),
            similarity_threshold: Some(0.8),
        };
        let b = RetrievalOptions {
            max_results: Some(3),
            similarity_threshold: Some(0.8),
        };
        engine.retrieve("u1", "q", &a).await.unwrap();
        engine.retrieve("u1", "q", &b).await.unwrap();

        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_queries_the_backend_every_time() {
        let store = Arc::new(ScriptedStore::returning(scored(&[0.9])));
        let config = MemoryConfig {
            cache_enabled: false,
            ..MemoryConfig::default()
        };
        let engine = engine(store.clone(), config);

        let opts = RetrievalOptions::default();
        engine.retrieve("u1", "q", &opts).await.unwrap();
        engine.retrieve("u1", "q", &opts).await.unwrap();
        engine.retrieve("u1", "q", &opts).await.unwrap();

        assert_eq!(store.query_count(), 3);
    }

    #[tokio::test]
    async fn backend_failure_propagates_and_caches_nothing() {
        let store = Arc::new(ScriptedStore::failing());
        let engine = engine(store.clone(), MemoryConfig::default());

        let opts = RetrievalOptions::default();
        let err = engine.retrieve("u1", "q", &opts).await.unwrap_err();
        assert!(matches!(err, MemoryError::Retrieval { .. }));

        // The failure was not cached: the next call reaches the backend.
        let _ = engine.retrieve("u1", "q", &opts).await;
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn defaults_come_from_the_configuration() {
        let scores: Vec<f32> = (0..8).map(|i| 0.95 - i as f32 * 0.1).collect();
        let store = Arc::new(ScriptedStore::returning(scored(&scores)));
        let config = MemoryConfig {
            max_results: 3,
            similarity_threshold: 0.5,
            ..MemoryConfig::default()
        };
        let engine = engine(store, config);

        let results = engine
            .retrieve("u1", "q", &RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.relevance_score >= 0.5));
    }

    #[tokio::test]
    async fn nan_scores_are_filtered_out() {
        let mut candidates = scored(&[0.9]);
        candidates.push(MemoryRecord::new("m-nan", "garbled", f32::NAN));
        let store = Arc::new(ScriptedStore::returning(candidates));
        let engine = engine(store, MemoryConfig::default());

        let opts = RetrievalOptions {
            max_results: Some(5),
            similarity_threshold: Some(0.0),
        };
        let results = engine.retrieve("u1", "q", &opts).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m-0");
    }
}
