//! # Banter Core
//!
//! Domain types, traits, and error definitions for the Banter group-chat
//! response engine. It defines the domain model that all other crates
//! implement against, plus the HTTP client builder every remote backend
//! shares.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (language-model provider, vector index,
//! embedder) is a trait here. Implementations live in their respective
//! crates, so tests can swap in mocks and all crates depend inward on core.

pub mod error;
pub mod message;
pub mod character;
pub mod generation;
pub mod provider;
pub mod memory;
pub mod http;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, ProviderFailure, Result, RetrievalError};
pub use message::{Message, MessageType};
pub use character::{Character, Group};
pub use generation::{GenerationMetadata, GenerationRequest, GenerationResponse, Mood, RequestLimits};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use memory::{Embedder, MemoryFragment, MemoryRecord, Metadata, VectorIndex, VectorQuery};
