//! Error types for the Banter domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; only [`Error`] ever reaches
//! the caller of the response engine.

use serde::Serialize;
use thiserror::Error;

/// The terminal error type for a generation request.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request input, rejected before any external call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Every configured provider failed. One entry per provider, in order.
    #[error("All providers exhausted: {}", summarize(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    /// The originating request was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// The overall request ceiling elapsed.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable, machine-readable error code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::AllProvidersExhausted { .. } => "ALL_PROVIDERS_EXHAUSTED",
            Self::Cancelled => "REQUEST_CANCELLED",
            Self::Timeout { .. } => "REQUEST_TIMEOUT",
            Self::Config { .. } => "CONFIGURATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Per-provider failures, if this error carries any.
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersExhausted { failures } => failures,
            _ => &[],
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers attempted".into();
    }
    failures
        .iter()
        .map(|f| format!("{} ({})", f.provider, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A single provider attempt failure. Every variant triggers fallback.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Unparseable body, missing text, or empty output after shaping.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Short stable label for logs and error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Network(_) => "network",
            Self::Api { .. } => "api_error",
            Self::NotConfigured(_) => "not_configured",
        }
    }

    /// The empty-generation case is folded into malformed responses.
    pub fn empty_generation() -> Self {
        Self::MalformedResponse("empty generation".into())
    }
}

/// A recorded failure of one provider in the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl Serialize for ProviderFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ProviderFailure", 3)?;
        s.serialize_field("provider", &self.provider)?;
        s.serialize_field("kind", self.error.kind())?;
        s.serialize_field("reason", &self.error.to_string())?;
        s.end()
    }
}

/// Failures of the long-term memory path. Absorbed by the retriever.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval timed out after {0}ms")]
    Timeout(u64),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),
}
