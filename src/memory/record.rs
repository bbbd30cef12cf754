//! Memory record types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single remembered fact as returned by the vector store.
///
/// Immutable once constructed; result lists own their records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Identifier assigned by the vector store.
    pub id: String,
    /// The remembered text.
    pub content: String,
    /// Similarity to the query that retrieved it (0.0 - 1.0).
    pub relevance_score: f32,
    /// Free-form metadata attached when the memory was stored.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl MemoryRecord {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        relevance_score: f32,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            relevance_score,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
