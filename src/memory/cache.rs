//! Bounded cache for retrieval results.
//!
//! Combines least-recently-used eviction with per-entry time-to-live, keyed
//! by a fingerprint of the normalized query parameters. Expiry is checked
//! lazily on every read; `evict_expired` exists only to bound the memory
//! held by dead entries between reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::MemoryError;
use crate::memory::MemoryRecord;

/// Deterministic cache key for one retrieval request.
///
/// The query text is trimmed and lowercased so logically identical queries
/// share an entry. The user segment is hex-encoded, so the `:` separator
/// can never occur inside it and the per-user prefix test stays unambiguous
/// for arbitrary user ids.
pub fn fingerprint(
    user_id: &str,
    query: &str,
    max_results: usize,
    similarity_threshold: f32,
    collection: &str,
) -> String {
    let normalized = query.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    hasher.update(b":");
    hasher.update(max_results.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(similarity_threshold.to_bits().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(collection.as_bytes());
    format!(
        "{}:{}",
        hex::encode(user_id.as_bytes()),
        hex::encode(hasher.finalize())
    )
}

/// Prefix shared by every cache key belonging to `user_id`, and by no key
/// belonging to any other user.
pub fn user_key_prefix(user_id: &str) -> String {
    format!("{}:", hex::encode(user_id.as_bytes()))
}

struct CacheEntry {
    records: Vec<MemoryRecord>,
    inserted_at: std::time::Instant,
    ttl: Duration,
    /// LRU position; bumped on every hit.
    last_access_seq: u64,
    /// Tie-breaker when two entries were last touched by the same sweep.
    inserted_seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: std::time::Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Usage counters for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// LRU + TTL cache over ordered memory lists.
///
/// A capacity of zero disables the store: every `put` is a no-op and every
/// `get` is a miss.
pub struct CacheStore {
    capacity: usize,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(capacity: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            default_ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Look up a cached result list. Refreshes the entry's LRU position on a
    /// hit; expired or inconsistent entries are dropped and reported as a
    /// miss. Never fails.
    pub async fn get(&self, key: &str) -> Option<Vec<MemoryRecord>> {
        if self.capacity == 0 {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if let Err(err) = self.check_entry(entries.get(key), key) {
            // Fail open: drop the entry and treat the read as a miss.
            warn!(key, error = %err, "cache entry failed validation, bypassing");
            entries.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let seq = self.next_seq();
        let entry = entries.get_mut(key)?;
        entry.last_access_seq = seq;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.records.clone())
    }

    /// Insert or replace an entry, evicting the least-recently-used one if
    /// the store would exceed capacity. `ttl` falls back to the configured
    /// default.
    pub async fn put(&self, key: &str, records: Vec<MemoryRecord>, ttl: Option<Duration>) {
        if self.capacity == 0 {
            return;
        }

        let seq = self.next_seq();
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                records,
                inserted_at: self.clock.now(),
                ttl: ttl.unwrap_or(self.default_ttl),
                last_access_seq: seq,
                inserted_seq: seq,
            },
        );

        while entries.len() > self.capacity {
            let victim = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .min_by_key(|(_, e)| (e.last_access_seq, e.inserted_seq))
                .map(|(k, _)| k.clone());
            match victim {
                Some(victim) => {
                    debug!(key = victim.as_str(), "evicting least-recently-used entry");
                    entries.remove(&victim);
                }
                None => break,
            }
        }
    }

    /// Remove every entry whose key matches the predicate. Returns the
    /// number removed.
    pub async fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    /// Drop every expired entry now instead of waiting for lazy checks.
    pub async fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Remove everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        let size = self.entries.read().await.len();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size,
            capacity: self.capacity,
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    fn check_entry(
        &self,
        entry: Option<&CacheEntry>,
        key: &str,
    ) -> Result<(), MemoryError> {
        let Some(entry) = entry else {
            return Err(MemoryError::CacheCorruption(format!(
                "entry for '{key}' vanished while locked"
            )));
        };
        let current = self.seq.load(Ordering::SeqCst);
        if entry.last_access_seq > current || entry.inserted_seq > current {
            return Err(MemoryError::CacheCorruption(format!(
                "entry for '{key}' carries a sequence from the future"
            )));
        }
        Ok(())
    }
}
