//! Best-effort long-term memory retrieval for one generation request.
//!
//! Builds a query from the situation and the tail of the conversation,
//! searches the group's memories and returns the most relevant distinct
//! fragments. Every failure degrades to "no memories".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use banter_core::error::RetrievalError;
use banter_core::generation::GenerationRequest;
use banter_core::memory::{Embedder, MemoryFragment, MemoryRecord, Metadata, VectorIndex, VectorQuery};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables for [`MemoryRetriever`].
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub top_k: usize,
    pub min_similarity: f32,
    /// Trailing messages folded into the query text
    pub query_tail: usize,
    pub timeout: Duration,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.3,
            query_tail: 3,
            timeout: Duration::from_millis(2000),
        }
    }
}

pub struct MemoryRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    settings: RetrieverSettings,
}

impl MemoryRetriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            settings,
        }
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    pub async fn health_check(&self) -> bool {
        self.index.health_check().await
    }

    /// Fetch relevant memories. Never fails: errors, timeouts and
    /// cancellation all yield an empty list.
    pub async fn retrieve(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Vec<MemoryFragment> {
        if self.settings.top_k == 0 {
            return Vec::new();
        }

        let group_id = request.group.id;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%group_id, "Retrieval abandoned: request cancelled");
                return Vec::new();
            }
            result = tokio::time::timeout(self.settings.timeout, self.search(request)) => result,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout(self.settings.timeout.as_millis() as u64)),
        };

        match result {
            Ok(fragments) => {
                info!(%group_id, count = fragments.len(), "Retrieved memories");
                fragments
            }
            Err(e) => {
                warn!(%group_id, index = self.index.name(), error = %e, "Memory retrieval failed, continuing without memories");
                Vec::new()
            }
        }
    }

    async fn search(&self, request: &GenerationRequest) -> Result<Vec<MemoryFragment>, RetrievalError> {
        let query_text = build_query_text(request, self.settings.query_tail);
        let vector = self.embedder.embed(&query_text).await?;

        // Over-fetch so that dedupe and the threshold still leave top_k.
        let raw = self
            .index
            .query(VectorQuery {
                vector,
                top_k: self.settings.top_k * 2,
                filter: group_filter(&request.group.id.to_string()),
            })
            .await?;

        let recent: Vec<&str> = request.recent_messages.iter().map(|m| m.content.as_str()).collect();
        Ok(select_fragments(raw, &recent, self.settings.min_similarity, self.settings.top_k))
    }

    /// Embed and store one memory, bounded by the retrieval timeout.
    pub async fn remember(&self, id: String, text: String, metadata: Metadata) -> Result<(), RetrievalError> {
        let timeout = self.settings.timeout;
        let store = async {
            let vector = self.embedder.embed(&text).await?;
            self.index
                .upsert(MemoryRecord {
                    id,
                    text,
                    vector,
                    metadata,
                })
                .await
        };

        tokio::time::timeout(timeout, store)
            .await
            .map_err(|_| RetrievalError::Timeout(timeout.as_millis() as u64))?
    }
}

/// Topic, mood, then the last `tail` message contents, one per line.
pub fn build_query_text(request: &GenerationRequest, tail: usize) -> String {
    let mut parts = Vec::with_capacity(tail + 2);
    if let Some(topic) = request.current_topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        parts.push(topic.to_string());
    }
    parts.push(request.mood.to_string());

    let skip = request.recent_messages.len().saturating_sub(tail);
    parts.extend(
        request.recent_messages[skip..]
            .iter()
            .map(|m| m.content.trim().to_string())
            .filter(|c| !c.is_empty()),
    );

    parts.join("\n")
}

fn group_filter(group_id: &str) -> Metadata {
    let mut filter = Metadata::new();
    filter.insert("group_id".into(), json!(group_id));
    filter
}

/// Lowercased with runs of whitespace collapsed to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop fragments already present in `recent`, threshold, sort by
/// descending score, drop normalized duplicates, cap.
pub fn select_fragments(
    mut fragments: Vec<MemoryFragment>,
    recent: &[&str],
    min_similarity: f32,
    top_k: usize,
) -> Vec<MemoryFragment> {
    let recent: HashSet<String> = recent.iter().map(|t| normalize_text(t)).collect();
    fragments.retain(|f| !recent.contains(&normalize_text(&f.text)));
    fragments.retain(|f| f.score >= min_similarity && !f.text.trim().is_empty());
    fragments.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen = HashSet::new();
    fragments.retain(|f| seen.insert(normalize_text(&f.text)));
    fragments.truncate(top_k);
    fragments
}
