//! Long-term memory for Banter: vector indexes, embedding and retrieval.

pub mod embedding;
pub mod in_memory;
pub mod pinecone;
pub mod retriever;
pub mod vector;

pub use embedding::HashingEmbedder;
pub use in_memory::InMemoryVectorIndex;
pub use pinecone::PineconeIndex;
pub use retriever::{MemoryRetriever, RetrieverSettings};
pub use vector::cosine_similarity;
