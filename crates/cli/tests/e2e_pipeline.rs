//! End-to-end tests for the Banter generation pipeline.
//!
//! These exercise the full path from a parsed request to the final message
//! payload: validation, persona, retrieval, windowing, assembly, provider
//! fallback and shaping. Providers and indexes are in-process mocks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use banter_config::{AppConfig, ResponseUnit};
use banter_core::error::RetrievalError;
use banter_core::{
    Character, GenerationRequest, Group, MemoryFragment, MemoryRecord, Message, Mood, Provider,
    ProviderError, ProviderRequest, ProviderResponse, VectorIndex, VectorQuery,
};
use banter_engine::{EngineSettings, ResponseEngine};
use banter_memory::{HashingEmbedder, InMemoryVectorIndex, MemoryRetriever, RetrieverSettings};
use banter_providers::ProviderRouter;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

// ── Mocks ────────────────────────────────────────────────────────────────

/// Replies with fixed text, or fails, and records every request it sees.
struct ScriptedProvider {
    name: String,
    reply: Result<String, ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn text(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            reply: Ok(reply.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(name: &str, error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "e2e-model"
    }

    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.reply.clone().map(|content| ProviderResponse {
            content,
            model: format!("{}-model", self.name),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }
}

/// An index whose every call fails.
struct BrokenIndex {
    queries: Mutex<usize>,
}

#[async_trait]
impl VectorIndex for BrokenIndex {
    fn name(&self) -> &str {
        "broken"
    }

    async fn upsert(&self, _record: MemoryRecord) -> Result<(), RetrievalError> {
        Err(RetrievalError::Unavailable("connection refused".into()))
    }

    async fn query(&self, _query: VectorQuery) -> Result<Vec<MemoryFragment>, RetrievalError> {
        *self.queries.lock().unwrap() += 1;
        Err(RetrievalError::Unavailable("connection refused".into()))
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

struct Cast {
    group: Group,
    ada: Character,
    bob: Character,
}

fn cast() -> Cast {
    let mut ada = Character::named("Ada");
    ada.personality_traits = Some("curious and precise".into());
    ada.speaking_style = Some("short, dry sentences".into());
    ada.background = Some("Retired mathematician who loves hiking".into());
    let mut bob = Character::named("Bob");
    bob.personality_traits = Some("cheerful".into());
    Cast {
        group: Group::named("Trail Crew"),
        ada,
        bob,
    }
}

fn request_with(cast: &Cast, lines: &[&str]) -> GenerationRequest {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let messages = lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let speaker = if i % 2 == 0 { cast.bob.id } else { cast.ada.id };
            Message::text(cast.group.id, Some(speaker), *text).at(t0 + ChronoDuration::minutes(i as i64))
        })
        .collect();
    GenerationRequest {
        group: cast.group.clone(),
        current_character: cast.ada.clone(),
        recent_messages: messages,
        active_characters: vec![cast.ada.clone(), cast.bob.clone()],
        additional_context: Default::default(),
        conversation_start_time: Some(t0),
        current_topic: Some("Saturday hike".into()),
        mood: Mood::Planning,
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        request_timeout: Duration::from_secs(5),
        ..EngineSettings::from_config(&AppConfig::default())
    }
}

fn chain(providers: &[Arc<ScriptedProvider>]) -> ProviderRouter {
    providers.iter().fold(ProviderRouter::new(), |router, p| {
        router.add(p.clone(), Duration::from_secs(5))
    })
}

fn retriever(index: Arc<dyn VectorIndex>) -> MemoryRetriever {
    MemoryRetriever::new(
        index,
        Arc::new(HashingEmbedder::new(768)),
        RetrieverSettings {
            min_similarity: 0.1,
            timeout: Duration::from_millis(500),
            ..RetrieverSettings::default()
        },
    )
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn prompt_sections_arrive_in_fixed_order() {
    let cast = cast();
    let index = InMemoryVectorIndex::new();
    let provider = ScriptedProvider::text("gemini", "Ridge trail, 7am. Bring water.");
    let engine = ResponseEngine::new(chain(&[provider.clone()]), Some(retriever(Arc::new(index))), settings());

    // First turn seeds a memory for the group
    let req = request_with(&cast, &["Where should we hike on Saturday?"]);
    engine.generate(req.clone(), CancellationToken::new()).await.unwrap();

    let mut next = request_with(&cast, &["Where should we hike on Saturday?", "Ridge trail, 7am.", "What should I bring?"]);
    next.additional_context.insert("forecast".into(), serde_json::json!("sunny"));
    let response = engine.generate(next, CancellationToken::new()).await.unwrap();
    assert!(response.metadata.memories_used >= 1);

    let seen = provider.last_request();
    let system = seen.system.unwrap();
    assert!(system.starts_with("You are Ada.\nPersonality: curious and precise\nSpeaking style:"));

    let prompt = seen.prompt;
    let order: Vec<usize> = [
        "[Relevant Memories]",
        "[Situation]",
        "[Recent Conversation]",
        "[Your Turn]",
    ]
    .iter()
    .map(|header| prompt.find(header).unwrap_or_else(|| panic!("missing {header}")))
    .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "sections out of order:\n{prompt}");

    assert!(prompt.contains("Participants: Ada, Bob"));
    assert!(prompt.contains("Mood: planning"));
    assert!(prompt.contains("Topic: Saturday hike"));
    assert!(prompt.contains("- Ridge trail, 7am. Bring water."));
    assert!(prompt.contains("- forecast: sunny"));
    assert!(prompt.contains("Bob: Where should we hike on Saturday?\nAda: Ridge trail, 7am.\nBob: What should I bring?"));
    assert!(prompt.contains("Respond now as Ada"));
}

#[tokio::test]
async fn previous_reply_in_history_is_not_repeated_from_memory() {
    let cast = cast();
    let reply = "The ridge trail closes at dusk on Saturday.";
    let index = Arc::new(InMemoryVectorIndex::new());
    let provider = ScriptedProvider::text("gemini", reply);
    let engine = ResponseEngine::new(chain(&[provider.clone()]), Some(retriever(index.clone())), settings());

    let ada_turn = request_with(&cast, &["When does the ridge trail close on Saturday?"]);
    engine.generate(ada_turn, CancellationToken::new()).await.unwrap();
    // The reply and the group summary
    assert_eq!(index.len().await, 2);

    // Bob answers next, with Ada's reply already in the transcript
    let mut bob_turn = request_with(&cast, &["When does the ridge trail close on Saturday?", reply]);
    bob_turn.current_character = cast.bob.clone();
    engine.generate(bob_turn, CancellationToken::new()).await.unwrap();

    let prompt = provider.last_request().prompt;
    assert_eq!(prompt.matches(reply).count(), 1, "reply repeated:\n{prompt}");
    assert!(prompt.contains(&format!("Ada: {reply}")));
}

#[tokio::test]
async fn retrieval_failure_degrades_to_no_memories() {
    let cast = cast();
    let index = Arc::new(BrokenIndex {
        queries: Mutex::new(0),
    });
    let provider = ScriptedProvider::text("gemini", "Sounds good.");
    let engine = ResponseEngine::new(chain(&[provider.clone()]), Some(retriever(index.clone())), settings());

    let response = engine
        .generate(request_with(&cast, &["Ready?"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.content, "Sounds good.");
    assert_eq!(response.metadata.memories_used, 0);
    assert_eq!(*index.queries.lock().unwrap(), 1);
    assert!(!provider.last_request().prompt.contains("[Relevant Memories]"));
}

#[tokio::test]
async fn invalid_requests_never_reach_a_provider() {
    let cast = cast();
    let provider = ScriptedProvider::text("gemini", "unused");
    let engine = ResponseEngine::new(chain(&[provider.clone()]), None, settings());

    let mut inactive_speaker = request_with(&cast, &["hi"]);
    inactive_speaker.active_characters.retain(|c| c.id != cast.ada.id);

    let mut out_of_order = request_with(&cast, &["first", "second"]);
    out_of_order.recent_messages.swap(0, 1);

    let mut foreign_group = request_with(&cast, &["hi"]);
    foreign_group.recent_messages[0].group_id = uuid::Uuid::new_v4();

    let too_many = request_with(&cast, &["spam"; 51]);

    let mut nameless = request_with(&cast, &["hi"]);
    nameless.current_character.name = "   ".into();
    nameless.active_characters[0].name = "   ".into();

    for request in [inactive_speaker, out_of_order, foreign_group, too_many, nameless] {
        let err = engine.generate(request, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST", "{err}");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn long_generation_truncated_to_fifty_words() {
    let cast = cast();
    let long = (1..=80).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
    let provider = ScriptedProvider::text("gemini", &format!("Ada: {long}"));

    let mut settings = settings();
    settings.response.max_length = 50;
    settings.response.unit = ResponseUnit::Words;
    let engine = ResponseEngine::new(chain(&[provider]), None, settings);

    let response = engine
        .generate(request_with(&cast, &["Tell me everything"]), CancellationToken::new())
        .await
        .unwrap();

    assert!(response.truncated);
    assert_eq!(response.content.split_whitespace().count(), 50);
    assert!(response.content.starts_with("word1 "));
    assert!(response.content.ends_with("word50"));
}

#[tokio::test]
async fn second_provider_answers_when_first_fails() {
    let cast = cast();
    let gemini = ScriptedProvider::failing("gemini", ProviderError::Timeout("no response within 30000ms".into()));
    let openai = ScriptedProvider::text("openai", "I'll bring the map.");
    let engine = ResponseEngine::new(chain(&[gemini.clone(), openai.clone()]), None, settings());

    let response = engine
        .generate(request_with(&cast, &["Who brings the map?"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.content, "I'll bring the map.");
    assert_eq!(response.provider, "openai");
    assert_eq!(response.model, "openai-model");
    assert_eq!(response.metadata.failures.len(), 1);
    assert_eq!(response.metadata.failures[0].provider, "gemini");
    assert_eq!(gemini.calls(), 1);
    assert_eq!(openai.calls(), 1);
}

#[tokio::test]
async fn all_providers_exhausted_in_configured_order() {
    let cast = cast();
    let providers = [
        ScriptedProvider::failing("gemini", ProviderError::AuthenticationFailed("invalid key".into())),
        ScriptedProvider::failing("openai", ProviderError::RateLimited { retry_after_secs: 20 }),
        ScriptedProvider::text("anthropic", "   "),
    ];
    let engine = ResponseEngine::new(chain(&providers), None, settings());

    let err = engine
        .generate(request_with(&cast, &["Anyone?"]), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ALL_PROVIDERS_EXHAUSTED");
    let failures: Vec<(&str, &str)> = err
        .failures()
        .iter()
        .map(|f| (f.provider.as_str(), f.error.kind()))
        .collect();
    assert_eq!(
        failures,
        [
            ("gemini", "auth"),
            ("openai", "rate_limited"),
            ("anthropic", "malformed_response"),
        ]
    );
    assert!(providers.iter().all(|p| p.calls() == 1));
}

#[tokio::test]
async fn long_history_is_windowed_to_newest_messages() {
    let cast = cast();
    let lines: Vec<String> = (1..=15).map(|i| format!("message {i}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let provider = ScriptedProvider::text("gemini", "Noted.");
    let engine = ResponseEngine::new(chain(&[provider.clone()]), None, settings());

    let response = engine
        .generate(request_with(&cast, &refs), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.metadata.history_used, 10);
    assert_eq!(response.metadata.history_dropped, 5);
    let prompt = provider.last_request().prompt;
    assert!(prompt.contains("message 6\n"));
    assert!(!prompt.contains("message 5\n"));
    assert!(prompt.contains("message 15"));
}

#[tokio::test]
async fn request_json_runs_through_the_pipeline() {
    let cast = cast();
    let request = request_with(&cast, &["Is the trail muddy?"]);
    let raw = serde_json::to_string(&request).unwrap();

    let parsed = GenerationRequest::from_json(&raw).unwrap();
    let provider = ScriptedProvider::text("gemini", "Only near the creek.");
    let engine = ResponseEngine::new(chain(&[provider]), None, settings());
    let response = engine.generate(parsed, CancellationToken::new()).await.unwrap();

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["content"], "Only near the creek.");
    assert_eq!(body["message_type"], "TEXT");
    assert_eq!(body["is_ai_generated"], true);
    assert_eq!(body["provider"], "gemini");
}

#[tokio::test]
async fn malformed_request_json_is_invalid() {
    let err = GenerationRequest::from_json(r#"{"group": 42}"#).unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}
