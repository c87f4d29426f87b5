//! The generation contract: one request in, one message payload out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::character::{Character, Group};
use crate::error::{Error, ProviderFailure, Result};
use crate::message::{Message, MessageType};
use crate::provider::Usage;

/// Conversational register requested for the next message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    #[default]
    Casual,
    Formal,
    Humorous,
    Serious,
    Excited,
    Calm,
    Debate,
    Gossip,
    Planning,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Formal => "formal",
            Self::Humorous => "humorous",
            Self::Serious => "serious",
            Self::Excited => "excited",
            Self::Calm => "calm",
            Self::Debate => "debate",
            Self::Gossip => "gossip",
            Self::Planning => "planning",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to generate the current character's next message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub group: Group,

    /// The character who speaks next
    pub current_character: Character,

    /// Recent messages, oldest first
    #[serde(default)]
    pub recent_messages: Vec<Message>,

    /// Characters participating in the group, used for speaker names
    pub active_characters: Vec<Character>,

    /// Caller-supplied situational facts, rendered in key order
    #[serde(default)]
    pub additional_context: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_topic: Option<String>,

    #[serde(default)]
    pub mood: Mood,
}

/// Request limits that come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_messages: usize,
    pub require_history: bool,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_messages: 50,
            require_history: false,
        }
    }
}

impl GenerationRequest {
    /// Parse a request, mapping shape errors to `InvalidRequest`.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::invalid(format!("malformed request: {e}")))
    }

    /// Check structural invariants. Runs before any external call.
    pub fn validate(&self, limits: &RequestLimits) -> Result<()> {
        if !self
            .active_characters
            .iter()
            .any(|c| c.id == self.current_character.id)
        {
            return Err(Error::invalid(format!(
                "current character {} is not among the active characters",
                self.current_character.id
            )));
        }

        if self.recent_messages.len() > limits.max_messages {
            return Err(Error::invalid(format!(
                "{} recent messages exceeds the limit of {}",
                self.recent_messages.len(),
                limits.max_messages
            )));
        }

        if limits.require_history && self.recent_messages.is_empty() {
            return Err(Error::invalid("recent messages must not be empty"));
        }

        if let Some(stray) = self
            .recent_messages
            .iter()
            .find(|m| m.group_id != self.group.id)
        {
            return Err(Error::invalid(format!(
                "message {} belongs to group {}, not {}",
                stray.id, stray.group_id, self.group.id
            )));
        }

        if let Some(pair) = self
            .recent_messages
            .windows(2)
            .find(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(Error::invalid(format!(
                "recent messages are out of order at message {}",
                pair[1].id
            )));
        }

        Ok(())
    }

    /// Name of the character with this id, if it is active in the request.
    pub fn speaker_name(&self, id: Option<Uuid>) -> Option<&str> {
        let id = id?;
        self.active_characters
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }
}

/// The message payload handed back to the caller for persistence.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub content: String,
    pub message_type: MessageType,
    pub is_ai_generated: bool,
    pub response_time_ms: u64,
    /// Name of the provider that produced the content
    pub provider: String,
    pub model: String,
    /// Set when the shaper cut the content at the length limit
    pub truncated: bool,
    pub metadata: GenerationMetadata,
}

/// Diagnostics describing how a response was produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationMetadata {
    pub provider_latency_ms: u64,
    /// Providers that failed before the successful one, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
    pub memories_used: usize,
    pub memories_dropped: usize,
    pub history_used: usize,
    pub history_dropped: usize,
    /// Persona, situation and instruction alone exceeded the input budget
    pub over_budget: bool,
    /// Estimated size of the prompt sent to the provider
    pub prompt_tokens: usize,
    /// Token counts reported by the provider, when it reports them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
