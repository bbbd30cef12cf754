//! Memory subsystem.
//!
//! The retrieval mediator between the conversational loop and an external
//! vector store: fingerprint-keyed caching, threshold-filtered retrieval,
//! and the gateway that composes them.

pub mod cache;
pub mod gateway;
pub mod record;
pub mod remote;
pub mod retrieval;

pub use cache::{CacheStats, CacheStore};
pub use gateway::MemoryGateway;
pub use record::MemoryRecord;
pub use remote::RemoteVectorStore;
pub use retrieval::{RetrievalEngine, RetrievalOptions};

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// External vector-memory store. Persistence, indexing, and embedding all
/// live behind this boundary.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Similarity search scoped to one user. Results are expected ranked by
    /// descending relevance, at most `top_k` of them.
    async fn query(&self, user_id: &str, query: &str, top_k: usize) -> Result<Vec<MemoryRecord>>;

    /// Store a new memory for the user, returning its id.
    async fn add(
        &self,
        user_id: &str,
        content: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<String>;

    /// Remove every memory belonging to the user, returning how many were
    /// removed.
    async fn clear(&self, user_id: &str) -> Result<usize>;
}
