//! Context assembly: one structured prompt from every input layer.
//!
//! Sections, in fixed order:
//!
//! 1. **Persona** (who the character is), never trimmed
//! 2. **Memories** (retrieved fragments), lowest-similarity dropped
//! 3. **Situation** (group, participants, mood, topic, extra context), never trimmed
//! 4. **History** (recent dialogue), oldest entries dropped first
//! 5. **Instruction** (whose turn it is), never trimmed
//!
//! Empty memory and history sections are omitted entirely. When the
//! untrimmable sections alone exceed the budget, every optional item is
//! dropped and the result is flagged `over_budget` instead of failing.
//!
//! Assembly is deterministic: identical inputs give identical output.

use banter_config::{GenerationConfig, LengthUnit};
use banter_core::{GenerationRequest, MemoryFragment, ProviderRequest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::history::HistoryEntry;
use crate::token;

pub const PERSONA: &str = "persona";
pub const MEMORY: &str = "memory";
pub const SITUATION: &str = "situation";
pub const HISTORY: &str = "history";
pub const INSTRUCTION: &str = "instruction";

const MEMORY_HEADER: &str = "[Relevant Memories]";
const SITUATION_HEADER: &str = "[Situation]";
const HISTORY_HEADER: &str = "[Recent Conversation]";
const INSTRUCTION_HEADER: &str = "[Your Turn]";

/// Input budget for the whole assembled prompt.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub total: usize,
    pub unit: LengthUnit,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            total: 4096,
            unit: LengthUnit::Tokens,
        }
    }
}

/// Everything the assembler needs for one generation.
pub struct AssemblyInput<'a> {
    /// Rendered persona block
    pub persona: &'a str,
    /// Retrieved memories, any order
    pub memories: &'a [MemoryFragment],
    /// Windowed history, oldest first
    pub history: &'a [HistoryEntry],
    pub request: &'a GenerationRequest,
}

/// A rendered, non-persona section.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: &'static str,
    pub text: String,
}

/// The assembled prompt, ready to become a provider request.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Persona block, sent as the system instruction
    pub system: String,
    /// Remaining sections in order
    pub sections: Vec<Section>,
    pub metadata: AssemblyMetadata,
}

/// Sizes and drops recorded during assembly.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyMetadata {
    /// Size of the joined payload in `unit`, separators included
    pub total: usize,
    pub budget: usize,
    pub unit: LengthUnit,
    pub per_section: Vec<SectionStats>,
    pub drops: Vec<DropInfo>,
    /// Persona, situation and instruction alone exceed the budget
    pub over_budget: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionStats {
    pub name: String,
    pub size: usize,
    pub items_included: usize,
    pub items_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropInfo {
    pub section: String,
    pub items_dropped: usize,
    pub size_dropped: usize,
    pub reason: String,
}

impl AssembledContext {
    /// Non-persona sections joined by blank lines.
    pub fn prompt(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Persona followed by every other section.
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}", self.system, self.prompt())
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.text.as_str())
    }

    /// Section names in output order, persona included.
    pub fn section_names(&self) -> Vec<&'static str> {
        std::iter::once(PERSONA)
            .chain(self.sections.iter().map(|s| s.name))
            .collect()
    }

    fn stats(&self, name: &str) -> Option<&SectionStats> {
        self.metadata.per_section.iter().find(|s| s.name == name)
    }

    pub fn memories_used(&self) -> usize {
        self.stats(MEMORY).map_or(0, |s| s.items_included)
    }

    pub fn history_used(&self) -> usize {
        self.stats(HISTORY).map_or(0, |s| s.items_included)
    }

    pub fn dropped(&self, section: &str) -> usize {
        self.metadata
            .drops
            .iter()
            .filter(|d| d.section == section)
            .map(|d| d.items_dropped)
            .sum()
    }

    pub fn to_provider_request(&self, generation: &GenerationConfig) -> ProviderRequest {
        ProviderRequest {
            system: Some(self.system.clone()),
            prompt: self.prompt(),
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
            stop: generation.stop.clone(),
        }
    }
}

/// The context assembler. Stateless; create one and reuse it.
pub struct ContextAssembler {
    budget: ContextBudget,
}

impl ContextAssembler {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// Assemble the prompt, trimming optional items until it fits.
    ///
    /// # Algorithm
    ///
    /// 1. Render persona, situation and instruction (always included)
    /// 2. Drop history entries oldest first while over budget
    /// 3. Then drop memories lowest similarity first while over budget
    /// 4. Record per-section sizes and drops
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let unit = self.budget.unit;
        let persona = input.persona.to_string();
        let situation = render_situation(input.request);
        let instruction = render_instruction(&input.request.current_character.name);

        // Sizes are taken on the joined payload so separators count too.
        let joined_size = |memory: &str, history: &str| {
            let parts = [persona.as_str(), memory, situation.as_str(), history, instruction.as_str()];
            token::measure(&join_sections(&parts), unit)
        };
        let fixed = joined_size("", "");
        let over_budget = fixed > self.budget.total;
        if over_budget {
            warn!(
                fixed,
                budget = self.budget.total,
                ?unit,
                "Persona, situation and instruction exceed the input budget"
            );
        }

        let mut memories: Vec<&MemoryFragment> = input.memories.iter().collect();
        memories.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let history_lines: Vec<String> = input.history.iter().map(HistoryEntry::render).collect();
        let memory_lines: Vec<String> = memories.iter().map(|m| format!("- {}", m.text.trim())).collect();

        // Oldest history goes first, then the weakest memories.
        let mut history_start = 0;
        let mut memory_kept = memory_lines.len();
        let size_of = |history_start: usize, memory_kept: usize| {
            joined_size(
                &render_list(MEMORY_HEADER, &memory_lines[..memory_kept]),
                &render_list(HISTORY_HEADER, &history_lines[history_start..]),
            )
        };
        while history_start < history_lines.len() && size_of(history_start, memory_kept) > self.budget.total {
            history_start += 1;
        }
        while memory_kept > 0 && size_of(history_start, memory_kept) > self.budget.total {
            memory_kept -= 1;
        }

        let memory_section = render_list(MEMORY_HEADER, &memory_lines[..memory_kept]);
        let history_section = render_list(HISTORY_HEADER, &history_lines[history_start..]);

        let mut drops = Vec::new();
        if memory_kept < memory_lines.len() {
            drops.push(DropInfo {
                section: MEMORY.into(),
                items_dropped: memory_lines.len() - memory_kept,
                size_dropped: lines_size(&memory_lines[memory_kept..], unit),
                reason: "Lowest-similarity memories dropped".into(),
            });
        }
        if history_start > 0 {
            drops.push(DropInfo {
                section: HISTORY.into(),
                items_dropped: history_start,
                size_dropped: lines_size(&history_lines[..history_start], unit),
                reason: "Oldest messages dropped".into(),
            });
        }
        for drop in &drops {
            debug!(section = %drop.section, items = drop.items_dropped, size = drop.size_dropped, "Trimmed context section");
        }

        let per_section = vec![
            stats(PERSONA, &persona, unit, 1, 1),
            stats(MEMORY, &memory_section, unit, memory_kept, memory_lines.len()),
            stats(SITUATION, &situation, unit, 1, 1),
            stats(HISTORY, &history_section, unit, history_lines.len() - history_start, history_lines.len()),
            stats(INSTRUCTION, &instruction, unit, 1, 1),
        ];
        let total = joined_size(&memory_section, &history_section);

        let mut sections = Vec::with_capacity(4);
        if !memory_section.is_empty() {
            sections.push(Section {
                name: MEMORY,
                text: memory_section,
            });
        }
        sections.push(Section {
            name: SITUATION,
            text: situation,
        });
        if !history_section.is_empty() {
            sections.push(Section {
                name: HISTORY,
                text: history_section,
            });
        }
        sections.push(Section {
            name: INSTRUCTION,
            text: instruction,
        });

        AssembledContext {
            system: persona,
            sections,
            metadata: AssemblyMetadata {
                total,
                budget: self.budget.total,
                unit,
                per_section,
                drops,
                over_budget,
            },
        }
    }
}

/// Non-empty parts joined by blank lines, as `full_text` lays them out.
fn join_sections(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Header plus one line per item; empty when there are no items.
fn render_list(header: &str, lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    format!("{header}\n{}", lines.join("\n"))
}

fn lines_size(lines: &[String], unit: LengthUnit) -> usize {
    lines.iter().map(|l| token::measure(l, unit)).sum()
}

fn stats(name: &str, text: &str, unit: LengthUnit, included: usize, total: usize) -> SectionStats {
    SectionStats {
        name: name.into(),
        size: token::measure(text, unit),
        items_included: included,
        items_total: total,
    }
}

fn render_situation(request: &GenerationRequest) -> String {
    let mut lines = vec![
        SITUATION_HEADER.to_string(),
        format!("Group: {}", request.group.name.trim()),
    ];

    if let Some(description) = request
        .group
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        lines.push(format!("About the group: {description}"));
    }

    let participants: Vec<&str> = request.active_characters.iter().map(|c| c.name.as_str()).collect();
    lines.push(format!("Participants: {}", participants.join(", ")));
    lines.push(format!("Mood: {}", request.mood));

    let topic = request
        .current_topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("general conversation");
    lines.push(format!("Topic: {topic}"));

    if let Some(start) = request.conversation_start_time {
        lines.push(format!("Conversation started: {}", start.format("%Y-%m-%d %H:%M UTC")));
    }

    if !request.additional_context.is_empty() {
        lines.push("Additional context:".into());
        let mut keys: Vec<&String> = request.additional_context.keys().collect();
        keys.sort();
        for key in keys {
            let value = match &request.additional_context[key] {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("- {key}: {value}"));
        }
    }

    lines.join("\n")
}

fn render_instruction(speaker: &str) -> String {
    let speaker = speaker.trim();
    format!(
        "{INSTRUCTION_HEADER}\nRespond now as {speaker} with your next message in the group chat. \
         Stay in character and reply with the message text only, without a \"{speaker}:\" prefix."
    )
}
