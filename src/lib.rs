//! memgate — memory retrieval mediator for conversational assistants.
//!
//! Sits between the conversational loop and an external vector store with:
//! - Fingerprint-keyed LRU + TTL caching of retrieval results
//! - Similarity-threshold filtering and top-k truncation
//! - Operation timing with slow-call warnings and aggregate statistics
//! - A per-user gateway for `retrieve`, `add`, and `clear`
//!
//! The UI, authentication, embedding computation, and the vector index
//! itself all live outside this crate; the store is reached through the
//! [`memory::VectorStore`] trait.

pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod perf;
pub mod telemetry;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MemoryConfig;
pub use error::{MemoryError, Result};
pub use memory::{
    CacheStats, CacheStore, MemoryGateway, MemoryRecord, RemoteVectorStore, RetrievalEngine,
    RetrievalOptions, VectorStore,
};
pub use perf::{OperationStats, PerformanceMonitor, PerformanceSample};
