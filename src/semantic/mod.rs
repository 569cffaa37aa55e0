//! Semantic retrieval over member and build-update embeddings.
//!
//! - `embeddings`: HTTP client for the language-model embedding endpoint
//! - `index`: in-memory vector index with cosine similarity search
//! - `text_repr`: deterministic text summaries used as embedding input
//! - `service`: ties the pieces together for query-time search

pub mod embeddings;
mod index;
mod service;
pub mod text_repr;

pub use embeddings::{Embedder, EmbeddingClient, EmbeddingError};
pub use service::{ScoredMember, ScoredUpdate, SemanticSearchError, SemanticSearchService};

/// Default number of results when the caller does not slice further
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
