//! The response engine: one generation request through the whole pipeline.
//!
//! ```text
//! validate → persona → (retrieve ‖ window) → assemble → route + shape → write back
//! ```
//!
//! Validation and persona rendering run before any external call. Memory
//! retrieval and history windowing run concurrently. The routed call applies
//! the shaper to every attempt, so an empty generation moves on to the next
//! provider. The whole pipeline is bounded by the request timeout.
//!
//! Write-back stores the reply and a rolling group summary as memories.
//! It runs after the response is built and is abandoned on cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use banter_config::{
    AppConfig, EmbeddingBackend, GenerationConfig, IndexBackend, ResponseConfig,
};
use banter_core::{
    Embedder, Error, GenerationMetadata, GenerationRequest, GenerationResponse, MessageType,
    Metadata, RequestLimits, Result, VectorIndex,
};
use banter_memory::{HashingEmbedder, InMemoryVectorIndex, MemoryRetriever, PineconeIndex, RetrieverSettings};
use banter_providers::registry::default_base_url;
use banter_providers::{build_from_config, OpenAiEmbedder, ProviderHealth, ProviderRouter, Routed};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assembler::{AssembledContext, AssemblyInput, ContextAssembler, ContextBudget, HISTORY, MEMORY};
use crate::history::{self, WindowLimits};
use crate::persona::render_persona;
use crate::shaper::{ResponseShaper, Shaped};
use crate::token::estimate_tokens;

/// Engine-wide knobs, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub limits: RequestLimits,
    pub window: WindowLimits,
    pub budget: ContextBudget,
    pub generation: GenerationConfig,
    pub response: ResponseConfig,
    /// Ceiling for validation through shaping
    pub request_timeout: Duration,
    /// Upsert each generated message as a group memory
    pub store_responses: bool,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            limits: RequestLimits {
                max_messages: config.history.max_request_messages,
                require_history: config.history.require_history,
            },
            window: WindowLimits {
                max_messages: config.history.max_messages,
                budget: config.history.budget,
                unit: config.history.unit,
            },
            budget: ContextBudget {
                total: config.context.input_budget,
                unit: config.context.unit,
            },
            generation: config.generation.clone(),
            response: config.response.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms()),
            store_responses: config.retrieval.store_responses,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Result of a liveness check. Never touches the network.
#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub alive: bool,
    /// Provider chain in fallback order
    pub providers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedder: Option<String>,
}

/// Result of a readiness check. Asks each backend for its local state
/// without making requests.
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    /// At least one provider can take requests
    pub ready: bool,
    pub providers: Vec<ProviderHealth>,
    /// Worst case for walking the whole fallback chain
    pub chain_timeout_ms: u64,
    pub request_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryHealth {
    pub index: String,
    pub embedder: String,
    pub healthy: bool,
}

/// Everything a successful pipeline run produced.
struct Pipeline {
    context: AssembledContext,
    window_dropped: usize,
    routed: Routed<Shaped>,
}

pub struct ResponseEngine {
    router: ProviderRouter,
    retriever: Option<MemoryRetriever>,
    assembler: ContextAssembler,
    shaper: ResponseShaper,
    settings: EngineSettings,
}

impl ResponseEngine {
    /// Assemble an engine from parts. `retriever = None` disables memory.
    pub fn new(router: ProviderRouter, retriever: Option<MemoryRetriever>, settings: EngineSettings) -> Self {
        Self {
            assembler: ContextAssembler::new(settings.budget),
            shaper: ResponseShaper::new(&settings.response),
            router,
            retriever,
            settings,
        }
    }

    /// Build providers, embedder and vector index from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let router = build_from_config(config);
        if router.is_empty() {
            warn!("No providers available; every generation will fail until an API key is set");
        }
        let retriever = build_retriever(config)?;
        Ok(Self::new(router, retriever, EngineSettings::from_config(config)))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Cheap readiness report; performs no external calls.
    pub fn liveness(&self) -> Liveness {
        Liveness {
            alive: !self.router.is_empty(),
            providers: self.router.names().into_iter().map(String::from).collect(),
            memory_index: self.retriever.as_ref().map(|r| r.index_name().to_string()),
            embedder: self.retriever.as_ref().map(|r| r.embedder_name().to_string()),
        }
    }

    /// Per-backend readiness. Memory health does not affect `ready`
    /// since retrieval is best-effort.
    pub async fn readiness(&self) -> Readiness {
        let providers = self.router.health_report().await;
        let memory = match &self.retriever {
            Some(retriever) => Some(MemoryHealth {
                index: retriever.index_name().to_string(),
                embedder: retriever.embedder_name().to_string(),
                healthy: retriever.health_check().await,
            }),
            None => None,
        };

        Readiness {
            ready: providers.iter().any(|p| p.healthy),
            providers,
            chain_timeout_ms: self.router.total_timeout().as_millis() as u64,
            request_timeout_ms: self.settings.request_timeout.as_millis() as u64,
            memory,
        }
    }

    /// Generate the current character's next message.
    ///
    /// Fails with `InvalidRequest` before any external call, `Cancelled` when
    /// `cancel` fires, `Timeout` when the request ceiling elapses and
    /// `AllProvidersExhausted` when no provider yields usable text.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResponse> {
        let started = Instant::now();

        request.validate(&self.settings.limits)?;
        let persona = render_persona(&request.current_character)?;

        let group_id = request.group.id;
        info!(
            %group_id,
            character = %request.current_character.name,
            messages = request.recent_messages.len(),
            mood = %request.mood,
            "Generating response"
        );

        let timeout = self.settings.request_timeout;
        let pipeline = match tokio::time::timeout(timeout, self.run(&request, &persona, &cancel)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%group_id, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                return Err(Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        let Pipeline {
            context,
            window_dropped,
            routed,
        } = pipeline;

        let metadata = GenerationMetadata {
            provider_latency_ms: routed.latency.as_millis() as u64,
            failures: routed.failures,
            memories_used: context.memories_used(),
            memories_dropped: context.dropped(MEMORY),
            history_used: context.history_used(),
            history_dropped: window_dropped + context.dropped(HISTORY),
            over_budget: context.metadata.over_budget,
            prompt_tokens: estimate_tokens(&context.system) + estimate_tokens(&context.prompt()),
            usage: routed.usage,
        };

        let response = GenerationResponse {
            content: routed.output.content,
            message_type: MessageType::Text,
            is_ai_generated: true,
            response_time_ms: started.elapsed().as_millis() as u64,
            provider: routed.provider,
            model: routed.model,
            truncated: routed.output.truncated,
            metadata,
        };

        info!(
            %group_id,
            provider = %response.provider,
            model = %response.model,
            response_time_ms = response.response_time_ms,
            truncated = response.truncated,
            "Response generated"
        );

        if self.settings.store_responses {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%group_id, "Write-back abandoned: request cancelled");
                }
                _ = self.write_back(&request, &response.content) => {}
            }
        }

        Ok(response)
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        persona: &str,
        cancel: &CancellationToken,
    ) -> Result<Pipeline> {
        let retrieval = async {
            match &self.retriever {
                Some(retriever) => retriever.retrieve(request, cancel).await,
                None => Vec::new(),
            }
        };
        let windowing = async { history::window(request, &self.settings.window) };
        let (memories, window) = tokio::join!(retrieval, windowing);

        let context = self.assembler.assemble(&AssemblyInput {
            persona,
            memories: &memories,
            history: &window.entries,
            request,
        });
        debug!(
            total = context.metadata.total,
            budget = context.metadata.budget,
            sections = ?context.section_names(),
            "Context assembled"
        );

        let speaker = request.current_character.name.as_str();
        let routed = self
            .router
            .generate_with(
                context.to_provider_request(&self.settings.generation),
                cancel,
                |response| self.shaper.shape(&response.content, speaker),
            )
            .await?;

        Ok(Pipeline {
            context,
            window_dropped: window.dropped,
            routed,
        })
    }

    /// Best-effort write-back: the generated message, then the group summary.
    async fn write_back(&self, request: &GenerationRequest, content: &str) {
        let Some(retriever) = &self.retriever else {
            return;
        };
        let group_id = request.group.id;

        let id = Uuid::new_v4().to_string();
        match retriever
            .remember(id.clone(), content.to_string(), message_metadata(request))
            .await
        {
            Ok(()) => debug!(memory_id = %id, %group_id, "Stored response as memory"),
            Err(e) => warn!(%group_id, error = %e, "Failed to store response as memory"),
        }

        // One summary per group, replaced on every turn.
        let id = format!("summary-{group_id}");
        match retriever
            .remember(id.clone(), summarize(request), summary_metadata(request))
            .await
        {
            Ok(()) => debug!(memory_id = %id, %group_id, "Updated conversation summary"),
            Err(e) => warn!(%group_id, error = %e, "Failed to update conversation summary"),
        }
    }
}

fn message_metadata(request: &GenerationRequest) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("group_id".into(), json!(request.group.id.to_string()));
    metadata.insert("character_id".into(), json!(request.current_character.id.to_string()));
    metadata.insert("character_name".into(), json!(request.current_character.name));
    metadata.insert("mood".into(), json!(request.mood.as_str()));
    if let Some(topic) = topic(request) {
        metadata.insert("topic".into(), json!(topic));
    }
    metadata.insert("memory_type".into(), json!("conversation"));
    metadata
}

fn summary_metadata(request: &GenerationRequest) -> Metadata {
    let participants: Vec<String> = request.active_characters.iter().map(|c| c.id.to_string()).collect();
    let key_topics: Vec<&str> = topic(request).into_iter().collect();

    let mut metadata = Metadata::new();
    metadata.insert("group_id".into(), json!(request.group.id.to_string()));
    metadata.insert("participants".into(), json!(participants));
    metadata.insert("key_topics".into(), json!(key_topics));
    metadata.insert("mood".into(), json!(request.mood.as_str()));
    metadata.insert("updated_at".into(), json!(chrono::Utc::now().to_rfc3339()));
    metadata.insert("memory_type".into(), json!("summary"));
    metadata
}

/// Conversation state in one line. Never quotes a message.
fn summarize(request: &GenerationRequest) -> String {
    let names: Vec<&str> = request.active_characters.iter().map(|c| c.name.as_str()).collect();
    let mut summary = format!(
        "Conversation in {} with {} participants ({}). Current mood: {}.",
        request.group.name.trim(),
        names.len(),
        names.join(", "),
        request.mood,
    );
    if let Some(topic) = topic(request) {
        summary.push_str(&format!(" Topic: {topic}."));
    }
    summary.push_str(&format!(" Latest message from {}.", request.current_character.name.trim()));
    summary
}

fn topic(request: &GenerationRequest) -> Option<&str> {
    request.current_topic.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

/// Memory retriever for the configured index and embedder, if retrieval is on.
fn build_retriever(config: &AppConfig) -> Result<Option<MemoryRetriever>> {
    if !config.retrieval.enabled {
        return Ok(None);
    }

    let timeout = Duration::from_millis(config.retrieval.timeout_ms);

    let index: Arc<dyn VectorIndex> = match config.vector_index.backend {
        IndexBackend::None => return Ok(None),
        IndexBackend::Memory => Arc::new(InMemoryVectorIndex::new()),
        IndexBackend::Pinecone => {
            let host = config
                .vector_index
                .host
                .clone()
                .ok_or_else(|| Error::config("vector_index.host is required for the pinecone backend"))?;
            let api_key = config
                .vector_index
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| Error::config("PINECONE_API_KEY is not set"))?;
            Arc::new(PineconeIndex::new(
                host,
                api_key,
                config.vector_index.namespace.clone(),
                timeout,
            ))
        }
    };

    let embedder: Arc<dyn Embedder> = match config.embedding.backend {
        EmbeddingBackend::Hash => Arc::new(HashingEmbedder::new(config.embedding.dimension)),
        EmbeddingBackend::Openai => {
            let api_key = config
                .embedding
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| Error::config("OPENAI_API_KEY is not set for the openai embedder"))?;
            let base_url = config
                .embedding
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url("openai"));
            Arc::new(OpenAiEmbedder::new(
                base_url,
                api_key,
                &config.embedding.model,
                config.embedding.dimension,
                timeout,
            ))
        }
    };

    info!(index = index.name(), embedder = embedder.name(), "Memory retrieval enabled");

    Ok(Some(MemoryRetriever::new(
        index,
        embedder,
        RetrieverSettings {
            top_k: config.retrieval.top_k,
            min_similarity: config.retrieval.min_similarity,
            query_tail: config.retrieval.query_tail,
            timeout,
        },
    )))
}
