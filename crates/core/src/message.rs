//! Chat message domain types.
//!
//! Messages are append-only and ordered by timestamp. The engine reads them
//! as history and produces exactly one new message per request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of content a message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Document,
    Emoji,
    System,
}

/// A single message in a group conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: Uuid,

    /// The group this message belongs to
    pub group_id: Uuid,

    /// Who sent it. `None` for system or unattributed messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<Uuid>,

    /// The text content
    pub content: String,

    #[serde(default)]
    pub message_type: MessageType,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub is_ai_generated: bool,

    /// Generation latency, set only on AI-generated messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl Message {
    /// Create a new text message from a character.
    pub fn text(group_id: Uuid, character_id: Option<Uuid>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            character_id,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            is_ai_generated: false,
            response_time_ms: None,
        }
    }

    /// Builder: set the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
