//! Length measurement for budgets.
//!
//! Uses a conservative heuristic of ~4 characters per token, which works
//! well for English text across GPT, Claude and Gemini tokenizers. Budgets
//! can also be expressed in plain characters.

use banter_config::LengthUnit;

/// Estimate the token count for a text string.
///
/// Uses the heuristic: `(len + 3) / 4` (ceiling division by 4).
/// Returns 0 for empty strings.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Size of `text` in the given unit.
pub fn measure(text: &str, unit: LengthUnit) -> usize {
    match unit {
        LengthUnit::Chars => text.chars().count(),
        LengthUnit::Tokens => estimate_tokens(text),
    }
}
