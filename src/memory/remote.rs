//! HTTP client for a remote vector-memory service.
//!
//! Speaks the JSON protocol of the standalone memory server: `/search`,
//! `/store`, and `/clear`. Every request carries a timeout so a wedged
//! backend surfaces as a retrieval error instead of a hang.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::memory::{MemoryRecord, VectorStore};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Vector store reached over HTTP.
pub struct RemoteVectorStore {
    client: Client,
    base_url: String,
}

impl RemoteVectorStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MemoryError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    user_id: &'a str,
    query: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<MemoryRecord>,
}

#[derive(Serialize)]
struct StoreRequest<'a> {
    user_id: &'a str,
    content: &'a str,
    metadata: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct StoreResponse {
    id: String,
}

#[derive(Serialize)]
struct ClearRequest<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ClearResponse {
    removed: usize,
}

#[async_trait]
impl VectorStore for RemoteVectorStore {
    async fn query(&self, user_id: &str, query: &str, top_k: usize) -> Result<Vec<MemoryRecord>> {
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                user_id,
                query,
                top_k,
            })
            .send()
            .await
            .map_err(MemoryError::retrieval)?
            .error_for_status()
            .map_err(MemoryError::retrieval)?;

        let body: SearchResponse = resp.json().await.map_err(MemoryError::retrieval)?;
        debug!(user_id, results = body.results.len(), "remote search complete");
        Ok(body.results)
    }

    async fn add(
        &self,
        user_id: &str,
        content: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/store", self.base_url))
            .json(&StoreRequest {
                user_id,
                content,
                metadata,
            })
            .send()
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?
            .error_for_status()
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        let body: StoreResponse = resp
            .json()
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(body.id)
    }

    async fn clear(&self, user_id: &str) -> Result<usize> {
        let resp = self
            .client
            .post(format!("{}/clear", self.base_url))
            .json(&ClearRequest { user_id })
            .send()
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?
            .error_for_status()
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        let body: ClearResponse = resp
            .json()
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(body.removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_request_serializes_the_wire_shape() {
        let req = SearchRequest {
            user_id: "u1",
            query: "favorite coffee",
            top_k: 5,
        };
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(
            encoded,
            json!({"user_id": "u1", "query": "favorite coffee", "top_k": 5})
        );
    }

    #[test]
    fn search_response_deserializes_records() {
        let body = json!({
            "results": [
                {"id": "m-1", "content": "likes espresso", "relevance_score": 0.91,
                 "metadata": {"app": "memgate"}},
                {"id": "m-2", "content": "lives in Lisbon", "relevance_score": 0.74}
            ]
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].id, "m-1");
        assert!(parsed.results[1].metadata.is_empty());
    }

    #[test]
    fn store_and_clear_responses_deserialize() {
        let stored: StoreResponse = serde_json::from_value(json!({"id": "m-9"})).unwrap();
        assert_eq!(stored.id, "m-9");
        let cleared: ClearResponse = serde_json::from_value(json!({"removed": 4})).unwrap();
        assert_eq!(cleared.removed, 4);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = RemoteVectorStore::new("http://localhost:3001/").unwrap();
        assert_eq!(store.base_url, "http://localhost:3001");
    }
}
