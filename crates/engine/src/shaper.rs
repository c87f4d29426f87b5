//! Response shaping: turns raw provider text into a message body.
//!
//! Runs on every provider attempt. An empty result is rejected as a
//! malformed response so the router moves on to the next provider.

use banter_config::{ResponseConfig, ResponseUnit};
use banter_core::ProviderError;

/// Shaped message text.
#[derive(Debug, Clone, PartialEq)]
pub struct Shaped {
    pub content: String,
    /// Cut at the length limit
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ResponseShaper {
    max_length: usize,
    unit: ResponseUnit,
    strip_speaker_prefix: bool,
    disallowed_phrases: Vec<String>,
}

impl ResponseShaper {
    pub fn new(config: &ResponseConfig) -> Self {
        Self {
            max_length: config.max_length.max(1),
            unit: config.unit,
            strip_speaker_prefix: config.strip_speaker_prefix,
            disallowed_phrases: config
                .disallowed_phrases
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Trim, strip a `speaker:` echo and disallowed phrases, then cap the length.
    pub fn shape(&self, raw: &str, speaker: &str) -> Result<Shaped, ProviderError> {
        let mut content = raw.trim();
        if self.strip_speaker_prefix {
            content = strip_prefix(content, speaker);
        }

        let mut content = content.to_string();
        for phrase in &self.disallowed_phrases {
            if content.contains(phrase.as_str()) {
                content = content.replace(phrase.as_str(), "");
            }
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(ProviderError::empty_generation());
        }

        Ok(match truncation_point(content, self.max_length, self.unit) {
            Some(end) => Shaped {
                content: content[..end].trim_end().to_string(),
                truncated: true,
            },
            None => Shaped {
                content: content.to_string(),
                truncated: false,
            },
        })
    }
}

/// Remove a leading `speaker:` (ASCII case-insensitive) and following spaces.
fn strip_prefix<'a>(content: &'a str, speaker: &str) -> &'a str {
    let speaker = speaker.trim();
    if speaker.is_empty() {
        return content;
    }
    match content.get(..speaker.len()) {
        Some(head) if head.eq_ignore_ascii_case(speaker) => {
            match content[speaker.len()..].strip_prefix(':') {
                Some(rest) => rest.trim_start(),
                None => content,
            }
        }
        _ => content,
    }
}

/// Byte ranges of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Byte offset to cut at, or `None` when `text` is within the limit.
///
/// Cuts at a word boundary. A first word longer than the character limit
/// is cut at the limit itself.
fn truncation_point(text: &str, max: usize, unit: ResponseUnit) -> Option<usize> {
    let spans = word_spans(text);
    match unit {
        ResponseUnit::Words => (spans.len() > max).then(|| spans[max - 1].1),
        ResponseUnit::Chars => {
            let limit = text.char_indices().nth(max).map(|(i, _)| i)?;
            let end = spans
                .iter()
                .take_while(|(_, end)| *end <= limit)
                .last()
                .map_or(limit, |(_, end)| *end);
            Some(end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaper(max_length: usize, unit: ResponseUnit) -> ResponseShaper {
        ResponseShaper::new(&ResponseConfig {
            max_length,
            unit,
            ..ResponseConfig::default()
        })
    }

    #[test]
    fn trims_and_passes_short_text() {
        let shaped = shaper(500, ResponseUnit::Chars).shape("  Sounds good!  \n", "Ada").unwrap();
        assert_eq!(shaped.content, "Sounds good!");
        assert!(!shaped.truncated);
    }

    #[test]
    fn strips_speaker_echo() {
        let s = shaper(500, ResponseUnit::Chars);
        assert_eq!(s.shape("Ada: I'll bring snacks.", "Ada").unwrap().content, "I'll bring snacks.");
        assert_eq!(s.shape("ada:I'll bring snacks.", "Ada").unwrap().content, "I'll bring snacks.");
        // Only a leading echo of the speaker counts
        assert_eq!(s.shape("Bob: hi", "Ada").unwrap().content, "Bob: hi");
        assert_eq!(s.shape("Adam is late", "Ada").unwrap().content, "Adam is late");
    }

    #[test]
    fn removes_control_tokens() {
        let shaped = shaper(500, ResponseUnit::Chars)
            .shape("<s>See you there.</s><|endoftext|>", "Ada")
            .unwrap();
        assert_eq!(shaped.content, "See you there.");
    }

    #[test]
    fn empty_after_shaping_is_rejected() {
        let s = shaper(500, ResponseUnit::Chars);
        assert_eq!(s.shape("   ", "Ada").unwrap_err(), ProviderError::empty_generation());
        assert_eq!(s.shape("Ada:  <|im_end|>", "Ada").unwrap_err(), ProviderError::empty_generation());
    }

    #[test]
    fn char_limit_cuts_at_word_boundary() {
        let shaped = shaper(12, ResponseUnit::Chars).shape("the quick brown fox", "Ada").unwrap();
        assert_eq!(shaped.content, "the quick");
        assert!(shaped.truncated);
    }

    #[test]
    fn char_limit_on_exact_boundary_keeps_word() {
        let shaped = shaper(9, ResponseUnit::Chars).shape("the quick brown", "Ada").unwrap();
        assert_eq!(shaped.content, "the quick");
    }

    #[test]
    fn long_first_word_is_cut_at_limit() {
        let shaped = shaper(5, ResponseUnit::Chars)
            .shape("Supercalifragilistic indeed", "Ada")
            .unwrap();
        assert_eq!(shaped.content, "Super");
        assert!(shaped.truncated);
    }

    #[test]
    fn sole_long_word_is_cut_and_flagged() {
        let shaped = shaper(5, ResponseUnit::Chars).shape("Supercalifragilistic", "Ada").unwrap();
        assert_eq!(shaped.content, "Super");
        assert!(shaped.truncated);
    }

    #[test]
    fn long_multibyte_word_is_cut_on_char_boundary() {
        let shaped = shaper(3, ResponseUnit::Chars).shape("ééééé", "Ada").unwrap();
        assert_eq!(shaped.content, "ééé");
        assert!(shaped.truncated);
    }

    #[test]
    fn word_limit() {
        let text = (1..=60).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let shaped = shaper(50, ResponseUnit::Words).shape(&text, "Ada").unwrap();
        assert_eq!(shaped.content.split_whitespace().count(), 50);
        assert!(shaped.content.ends_with("w50"));
        assert!(shaped.truncated);
    }

    #[test]
    fn word_limit_exact_is_untouched() {
        let shaped = shaper(3, ResponseUnit::Words).shape("one two\nthree", "Ada").unwrap();
        assert_eq!(shaped.content, "one two\nthree");
        assert!(!shaped.truncated);
    }

    #[test]
    fn multibyte_text_is_cut_safely() {
        let shaped = shaper(6, ResponseUnit::Chars).shape("héllo wörld", "Ada").unwrap();
        assert_eq!(shaped.content, "héllo");
        assert!(shaped.truncated);
    }
}
