//! Configuration loading, validation, and management for Banter.
//!
//! Loads configuration from `~/.banter/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.banter/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Overall request ceiling. When unset, the sum of the retrieval
    /// timeout and every provider timeout is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Sampling parameters sent with every generation
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Dialogue history windowing
    #[serde(default)]
    pub history: HistoryConfig,

    /// Prompt assembly budget
    #[serde(default)]
    pub context: ContextConfig,

    /// Long-term memory retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// Output shaping
    #[serde(default)]
    pub response: ResponseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider fallback chain, tried in order
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("generation", &self.generation)
            .field("history", &self.history)
            .field("context", &self.context)
            .field("retrieval", &self.retrieval)
            .field("embedding", &self.embedding)
            .field("vector_index", &self.vector_index)
            .field("response", &self.response)
            .field("logging", &self.logging)
            .field("providers", &self.providers)
            .finish()
    }
}

// --- Length units ---

/// Unit used to measure history and prompt budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Chars,
    /// Estimated tokens (~4 characters per token)
    #[default]
    Tokens,
}

/// Unit used to cap the generated message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseUnit {
    #[default]
    Chars,
    Words,
}

// --- Sections ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default)]
    pub stop: Vec<String>,
}

fn default_max_tokens() -> u32 {
    500
}
fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            stop: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Messages kept in the dialogue window
    #[serde(default = "default_history_messages")]
    pub max_messages: usize,

    /// Messages a request may carry before it is rejected
    #[serde(default = "default_request_messages")]
    pub max_request_messages: usize,

    /// Optional length budget for the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<usize>,

    #[serde(default)]
    pub unit: LengthUnit,

    /// Reject requests with no recent messages
    #[serde(default)]
    pub require_history: bool,
}

fn default_history_messages() -> usize {
    10
}
fn default_request_messages() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_history_messages(),
            max_request_messages: default_request_messages(),
            budget: None,
            unit: LengthUnit::default(),
            require_history: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total budget for the assembled prompt
    #[serde(default = "default_input_budget")]
    pub input_budget: usize,

    #[serde(default)]
    pub unit: LengthUnit,
}

fn default_input_budget() -> usize {
    4096
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            input_budget: default_input_budget(),
            unit: LengthUnit::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Fragments scoring below this are discarded
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Number of trailing messages folded into the query text
    #[serde(default = "default_query_tail")]
    pub query_tail: usize,

    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,

    /// Store generated messages back into the index
    #[serde(default = "default_true")]
    pub store_responses: bool,
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}
fn default_min_similarity() -> f32 {
    0.3
}
fn default_query_tail() -> usize {
    3
}
fn default_retrieval_timeout_ms() -> u64 {
    2000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            query_tail: default_query_tail(),
            timeout_ms: default_retrieval_timeout_ms(),
            store_responses: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature hashing; no network
    #[default]
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn default_dimension() -> usize {
    768
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            dimension: default_dimension(),
            model: default_embedding_model(),
            api_key: None,
            api_url: None,
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("backend", &self.backend)
            .field("dimension", &self.dimension)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Process-local index, lost on exit
    #[default]
    Memory,
    Pinecone,
    /// Retrieval disabled
    None,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// Index host, e.g. `https://chat-memories-abc123.svc.us-east1-gcp.pinecone.io`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl std::fmt::Debug for VectorIndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndexConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("api_key", &redact(&self.api_key))
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default)]
    pub unit: ResponseUnit,

    /// Remove a leading "Name:" echo of the speaker
    #[serde(default = "default_true")]
    pub strip_speaker_prefix: bool,

    /// Literal phrases removed from generated text
    #[serde(default = "default_disallowed_phrases")]
    pub disallowed_phrases: Vec<String>,
}

fn default_max_length() -> usize {
    500
}
fn default_disallowed_phrases() -> Vec<String> {
    [
        "<|endoftext|>",
        "<|im_start|>",
        "<|im_end|>",
        "<|eot_id|>",
        "</s>",
        "<s>",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            unit: ResponseUnit::default(),
            strip_speaker_prefix: true,
            disallowed_phrases: default_disallowed_phrases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "json".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// --- Providers ---

/// Wire protocol spoken by a provider entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any `/chat/completions` endpoint (OpenAI, OpenRouter, Ollama, ...)
    OpenaiCompat,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    /// Environment variable holding this kind's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenaiCompat => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in logs and failure reports
    pub name: String,

    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    pub model: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    30
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    let entry = |name: &str, kind, model: &str| ProviderConfig {
        name: name.into(),
        kind,
        api_key: None,
        api_url: None,
        model: model.into(),
        timeout_secs: default_provider_timeout(),
    };
    vec![
        entry("gemini", ProviderKind::Gemini, "gemini-pro"),
        entry("openai", ProviderKind::OpenaiCompat, "gpt-4"),
        entry("anthropic", ProviderKind::Anthropic, "claude-3-sonnet-20240229"),
    ]
}

impl AppConfig {
    /// Load configuration from the default path (~/.banter/config.toml).
    ///
    /// Environment variables fill in missing secrets:
    /// - `GEMINI_API_KEY`, `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` per provider kind
    /// - `PINECONE_API_KEY` for the vector index
    ///
    /// and override logging with `BANTER_LOG_LEVEL` / `BANTER_LOG_FORMAT`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`. Config file values for
    /// secrets win; logging variables always win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for provider in &mut self.providers {
            if provider.api_key.is_none() {
                provider.api_key = lookup(provider.kind.api_key_env());
            }
        }

        if self.embedding.backend == EmbeddingBackend::Openai && self.embedding.api_key.is_none() {
            self.embedding.api_key = lookup("OPENAI_API_KEY");
        }

        if self.vector_index.api_key.is_none() {
            self.vector_index.api_key = lookup("PINECONE_API_KEY");
        }

        if let Some(level) = lookup("BANTER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BANTER_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".banter")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.generation.top_p) || self.generation.top_p == 0.0 {
            return Err(ConfigError::ValidationError(
                "generation.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.history.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_messages must be > 0".into(),
            ));
        }

        if self.context.input_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context.input_budget must be > 0".into(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(ConfigError::ValidationError(
                "retrieval.min_similarity must be between -1.0 and 1.0".into(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be > 0".into(),
            ));
        }

        if self.vector_index.backend == IndexBackend::Pinecone && self.vector_index.host.is_none() {
            return Err(ConfigError::ValidationError(
                "vector_index.host is required for the pinecone backend".into(),
            ));
        }

        if self.response.max_length == 0 {
            return Err(ConfigError::ValidationError(
                "response.max_length must be > 0".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }

        for (i, provider) in self.providers.iter().enumerate() {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "providers[{i}].name must not be empty"
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "providers[{i}] ({}) has no model",
                    provider.name
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "providers[{i}] ({}) timeout_secs must be > 0",
                    provider.name
                )));
            }
            if self.providers[..i].iter().any(|p| p.name == provider.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
        }

        Ok(())
    }

    /// Overall request ceiling in milliseconds.
    pub fn request_timeout_ms(&self) -> u64 {
        match self.request_timeout_secs {
            Some(secs) => secs * 1000,
            None => {
                let providers: u64 = self.providers.iter().map(|p| p.timeout_secs * 1000).sum();
                self.retrieval.timeout_ms + providers
            }
        }
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            generation: GenerationConfig::default(),
            history: HistoryConfig::default(),
            context: ContextConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_index: VectorIndexConfig::default(),
            response: ResponseConfig::default(),
            logging: LoggingConfig::default(),
            providers: default_providers(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for banter_core::Error {
    fn from(e: ConfigError) -> Self {
        banter_core::Error::config(e.to_string())
    }
}
