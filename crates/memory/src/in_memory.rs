//! In-memory vector index: useful for testing and single-process deployments.

use async_trait::async_trait;
use banter_core::error::RetrievalError;
use banter_core::memory::{MemoryFragment, MemoryRecord, VectorIndex, VectorQuery};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::vector::vector_search;

/// A vector index that keeps records in a Vec and scans on every query.
/// Contents are lost when the process exits.
#[derive(Clone)]
pub struct InMemoryVectorIndex {
    records: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, mut record: MemoryRecord) -> Result<(), RetrievalError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<MemoryFragment>, RetrievalError> {
        let records = self.records.read().await;
        Ok(vector_search(&records, &query.vector, query.top_k, &query.filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::memory::Metadata;
    use serde_json::json;

    fn record(id: &str, text: &str, vector: Vec<f32>, group: &str) -> MemoryRecord {
        let mut metadata = Metadata::new();
        metadata.insert("group_id".into(), json!(group));
        MemoryRecord {
            id: id.into(),
            text: text.into(),
            vector,
            metadata,
        }
    }

    fn query(vector: Vec<f32>, group: &str) -> VectorQuery {
        let mut filter = Metadata::new();
        filter.insert("group_id".into(), json!(group));
        VectorQuery {
            vector,
            top_k: 5,
            filter,
        }
    }

    #[tokio::test]
    async fn upsert_and_query() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(record("m1", "Ada loves chess", vec![1.0, 0.0], "g1"))
            .await
            .unwrap();
        index
            .upsert(record("m2", "Bob hates mornings", vec![0.0, 1.0], "g1"))
            .await
            .unwrap();

        let results = index.query(query(vec![1.0, 0.1], "g1")).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "Ada loves chess");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("m1", "old", vec![1.0], "g1")).await.unwrap();
        index.upsert(record("m1", "new", vec![1.0], "g1")).await.unwrap();

        assert_eq!(index.len().await, 1);
        let results = index.query(query(vec![1.0], "g1")).await.unwrap();
        assert_eq!(results[0].text, "new");
    }

    #[tokio::test]
    async fn empty_id_gets_generated() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("", "a", vec![1.0], "g1")).await.unwrap();
        index.upsert(record("", "b", vec![1.0], "g1")).await.unwrap();
        assert_eq!(index.len().await, 2);
    }

    #[tokio::test]
    async fn queries_are_group_scoped() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("m1", "secret", vec![1.0], "g1")).await.unwrap();

        let results = index.query(query(vec![1.0], "g2")).await.unwrap();
        assert!(results.is_empty());
    }
}
