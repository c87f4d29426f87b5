//! Pinecone vector index over the data-plane REST API.
//!
//! Record text is stored under the `text` metadata key so queries can
//! return it without a second lookup.

use std::time::Duration;

use async_trait::async_trait;
use banter_core::error::RetrievalError;
use banter_core::http::build_client;
use banter_core::memory::{MemoryFragment, MemoryRecord, Metadata, VectorIndex, VectorQuery};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const TEXT_KEY: &str = "text";

pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// `host` is the index's data-plane URL (with or without scheme).
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Self {
        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };

        let client = build_client(timeout);

        Self {
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace,
            timeout_ms: timeout.as_millis() as u64,
            client,
        }
    }

    /// Translate an equality filter into Pinecone's `$eq` form.
    fn to_filter(filter: &Metadata) -> serde_json::Value {
        let clauses: serde_json::Map<String, serde_json::Value> = filter
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "$eq": v })))
            .collect();
        serde_json::Value::Object(clauses)
    }

    /// Pinecone rejects null metadata values.
    fn to_metadata(record: &MemoryRecord) -> Metadata {
        let mut metadata: Metadata = record
            .metadata
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata.insert(TEXT_KEY.into(), json!(record.text));
        metadata
    }

    fn into_fragment(m: Match) -> MemoryFragment {
        let mut metadata = m.metadata.unwrap_or_default();
        let text = metadata
            .remove(TEXT_KEY)
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        MemoryFragment {
            id: m.id,
            text,
            score: m.score,
            metadata,
        }
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response, RetrievalError> {
        let url = format!("{}{path}", self.host);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout(self.timeout_ms)
                } else {
                    RetrievalError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Unavailable(format!(
                "pinecone {path} returned {status}: {error_body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    /// Ready when a key is present; no request is made.
    async fn health_check(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn upsert(&self, record: MemoryRecord) -> Result<(), RetrievalError> {
        let body = UpsertRequest {
            vectors: vec![Vector {
                id: record.id.clone(),
                values: record.vector.clone(),
                metadata: Self::to_metadata(&record),
            }],
            namespace: self.namespace.clone(),
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;

        debug!(id = %record.id, "Upserting vector to Pinecone");
        self.post("/vectors/upsert", &body).await?;
        Ok(())
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<MemoryFragment>, RetrievalError> {
        let mut body = json!({
            "vector": query.vector,
            "topK": query.top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if !query.filter.is_empty() {
            body["filter"] = Self::to_filter(&query.filter);
        }
        if let Some(ns) = &self.namespace {
            body["namespace"] = json!(ns);
        }

        debug!(top_k = query.top_k, "Querying Pinecone");
        let response = self.post("/query", &body).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("unparseable query response: {e}")))?;

        Ok(parsed.matches.into_iter().map(Self::into_fragment).collect())
    }
}

// --- Pinecone API types ---

#[derive(Debug, Serialize)]
struct UpsertRequest {
    vectors: Vec<Vector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
struct Vector {
    id: String,
    values: Vec<f32>,
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}
