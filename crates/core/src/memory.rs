//! Long-term memory traits: vector storage and embedding.
//!
//! Retrieval is group-scoped: every record carries a `group_id` in its
//! metadata and every query filters on it. Implementations live in
//! `banter-memory` (in-memory, Pinecone, no-op) and `banter-providers`
//! (remote embeddings).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// Flat metadata map attached to a stored vector.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A vector to be stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique ID for this memory
    pub id: String,

    /// The text the vector was computed from
    pub text: String,

    /// The embedding
    pub vector: Vec<f32>,

    /// Filterable metadata (group_id, character_id, mood, ...)
    #[serde(default)]
    pub metadata: Metadata,
}

/// A similarity query against the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorQuery {
    pub vector: Vec<f32>,

    /// Maximum number of results
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Exact-match metadata filter; every key must match.
    #[serde(default)]
    pub filter: Metadata,
}

fn default_top_k() -> usize {
    5
}

/// A retrieved piece of long-term memory with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFragment {
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,
}

/// A similarity-searchable vector store.
///
/// Implementations: in-memory (for testing) and Pinecone.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The backend name (e.g., "memory", "pinecone").
    fn name(&self) -> &str;

    /// Insert or replace a record by ID.
    async fn upsert(&self, record: MemoryRecord) -> std::result::Result<(), RetrievalError>;

    /// Return up to `top_k` matches in descending score order.
    async fn query(&self, query: VectorQuery) -> std::result::Result<Vec<MemoryFragment>, RetrievalError>;

    /// Cheap readiness check. Must not perform network calls.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError>;
}
