//! History windowing: the newest contiguous run of messages that fits.

use banter_config::LengthUnit;
use banter_core::GenerationRequest;
use chrono::{DateTime, Utc};

use crate::token;

/// Label for messages whose author is not an active character.
pub const UNKNOWN_SPEAKER: &str = "unknown speaker";

/// One rendered line of dialogue.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub speaker: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn render(&self) -> String {
        format!("{}: {}", self.speaker, self.content)
    }
}

/// Count and length caps for the window.
#[derive(Debug, Clone, Copy)]
pub struct WindowLimits {
    pub max_messages: usize,
    /// Total rendered size allowed, in `unit`; `None` means count-only
    pub budget: Option<usize>,
    pub unit: LengthUnit,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            max_messages: 10,
            budget: None,
            unit: LengthUnit::Tokens,
        }
    }
}

/// The selected suffix, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    pub entries: Vec<HistoryEntry>,
    /// Messages left out of the window
    pub dropped: usize,
}

/// Select the longest suffix of the request's messages within `limits`.
///
/// Walks newest to oldest and stops at the first message that would break
/// either limit, so the result is always contiguous.
pub fn window(request: &GenerationRequest, limits: &WindowLimits) -> HistoryWindow {
    let total = request.recent_messages.len();
    let mut entries = Vec::with_capacity(total.min(limits.max_messages));
    let mut used = 0usize;

    for message in request.recent_messages.iter().rev() {
        if entries.len() >= limits.max_messages {
            break;
        }

        let entry = HistoryEntry {
            speaker: request
                .speaker_name(message.character_id)
                .unwrap_or(UNKNOWN_SPEAKER)
                .to_string(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        };

        if let Some(budget) = limits.budget {
            let size = token::measure(&entry.render(), limits.unit);
            if used + size > budget {
                break;
            }
            used += size;
        }

        entries.push(entry);
    }

    entries.reverse();
    HistoryWindow {
        dropped: total - entries.len(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::{Character, Group, Message, Mood};
    use chrono::Duration;

    fn request(contents: &[&str]) -> GenerationRequest {
        let ada = Character::named("Ada");
        let bob = Character::named("Bob");
        let group = Group::named("Chess Club");
        let t0 = Utc::now();
        let messages = contents
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let speaker = if i % 2 == 0 { ada.id } else { bob.id };
                Message::text(group.id, Some(speaker), *text).at(t0 + Duration::seconds(i as i64))
            })
            .collect();
        GenerationRequest {
            group,
            current_character: ada.clone(),
            recent_messages: messages,
            active_characters: vec![ada, bob],
            additional_context: Default::default(),
            conversation_start_time: None,
            current_topic: None,
            mood: Mood::Casual,
        }
    }

    fn contents(w: &HistoryWindow) -> Vec<&str> {
        w.entries.iter().map(|e| e.content.as_str()).collect()
    }

    #[test]
    fn count_limit_keeps_newest_suffix() {
        let req = request(&["m1", "m2", "m3", "m4", "m5"]);
        let w = window(
            &req,
            &WindowLimits {
                max_messages: 3,
                ..WindowLimits::default()
            },
        );
        assert_eq!(contents(&w), ["m3", "m4", "m5"]);
        assert_eq!(w.dropped, 2);
    }

    #[test]
    fn entries_are_labelled_with_speaker() {
        let req = request(&["hello", "hi"]);
        let w = window(&req, &WindowLimits::default());
        assert_eq!(w.entries[0].render(), "Ada: hello");
        assert_eq!(w.entries[1].render(), "Bob: hi");
    }

    #[test]
    fn unknown_author_is_labelled() {
        let mut req = request(&["hello"]);
        req.recent_messages[0].character_id = None;
        let w = window(&req, &WindowLimits::default());
        assert_eq!(w.entries[0].speaker, UNKNOWN_SPEAKER);
    }

    #[test]
    fn budget_stops_at_first_oversized_message() {
        // "Ada: aaaa" = 9 chars, "Bob: <30 chars>" = 35 chars, "Ada: cc" = 7 chars
        let long = "b".repeat(30);
        let req = request(&["aaaa", &long, "cc"]);
        let w = window(
            &req,
            &WindowLimits {
                max_messages: 10,
                budget: Some(20),
                unit: LengthUnit::Chars,
            },
        );
        // The short first message would fit, but the window must stay contiguous.
        assert_eq!(contents(&w), ["cc"]);
        assert_eq!(w.dropped, 2);
    }

    #[test]
    fn empty_history_is_empty_window() {
        let req = request(&[]);
        let w = window(&req, &WindowLimits::default());
        assert!(w.entries.is_empty());
        assert_eq!(w.dropped, 0);
    }

    #[test]
    fn zero_budget_drops_everything() {
        let req = request(&["a", "b"]);
        let w = window(
            &req,
            &WindowLimits {
                max_messages: 10,
                budget: Some(0),
                unit: LengthUnit::Tokens,
            },
        );
        assert!(w.entries.is_empty());
        assert_eq!(w.dropped, 2);
    }

    #[test]
    fn windowing_is_deterministic() {
        let req = request(&["x", "y", "z"]);
        let limits = WindowLimits {
            max_messages: 2,
            budget: Some(100),
            unit: LengthUnit::Chars,
        };
        assert_eq!(window(&req, &limits).entries, window(&req, &limits).entries);
    }
}
