//! # Banter Engine
//!
//! Turns a [`GenerationRequest`](banter_core::GenerationRequest) into the
//! next chat message of an AI character.
//!
//! The building blocks are pure and usable on their own:
//!
//! - [`persona`] renders a character's self-description
//! - [`history`] windows recent dialogue under count and length limits
//! - [`assembler`] merges everything into one budgeted prompt
//! - [`shaper`] cleans and caps provider output
//!
//! [`ResponseEngine`] wires them to the provider router and memory retriever.

pub mod assembler;
pub mod engine;
pub mod history;
pub mod persona;
pub mod shaper;
pub mod token;

pub use assembler::{AssembledContext, AssemblyInput, ContextAssembler, ContextBudget};
pub use engine::{EngineSettings, Liveness, MemoryHealth, Readiness, ResponseEngine};
pub use history::{HistoryEntry, HistoryWindow, WindowLimits};
pub use persona::render_persona;
pub use shaper::{ResponseShaper, Shaped};
