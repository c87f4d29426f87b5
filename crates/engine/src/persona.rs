//! Persona rendering: a character's traits as a stable self-description.

use banter_core::{Character, Error, Result};

/// Render the persona block for `character`.
///
/// Fixed order: name, personality, speaking style, background, then the
/// character's own system prompt. Blank optional fields are omitted.
pub fn render_persona(character: &Character) -> Result<String> {
    let name = character.name.trim();
    if name.is_empty() {
        return Err(Error::invalid(format!(
            "character {} has no name",
            character.id
        )));
    }

    let mut lines = vec![format!("You are {name}.")];

    if let Some(traits) = non_blank(&character.personality_traits) {
        lines.push(format!("Personality: {traits}"));
    }
    if let Some(style) = non_blank(&character.speaking_style) {
        lines.push(format!("Speaking style: {style}"));
    }
    if let Some(background) = non_blank(&character.background) {
        lines.push(format!("Background: {background}"));
    }
    if let Some(prompt) = non_blank(&character.system_prompt) {
        lines.push(prompt.to_string());
    }

    Ok(lines.join("\n"))
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
