//! LLM Provider implementations for Banter.
//!
//! All providers implement the `banter_core::Provider` trait.
//! The router tries them in configured order until one succeeds.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod openai_compat;
pub mod registry;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::{OpenAiCompatProvider, OpenAiEmbedder};
pub use registry::build_from_config;
pub use router::{ProviderHealth, ProviderRouter, Routed};
