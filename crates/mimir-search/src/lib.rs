//! Mimir Search - hybrid lexical + semantic retrieval over knowledge artifacts
//!
//! This crate embeds artifact text through pluggable providers, stores the
//! vectors through a storage collaborator, and answers lexical, semantic and
//! Reciprocal Rank Fusion hybrid queries.
//!
//! # Features
//!
//! - **Multi-tenant**: every store call is scoped by `tenant_id`
//! - **Pluggable providers**: Voyage, OpenAI and Ollama behind one trait
//! - **One storage width**: vectors of any model share a single padded index
//! - **Partial-failure batches**: large imports make maximum forward progress
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mimir_config::MimirConfig;
//! use mimir_search::{
//!     EmbeddingService, MemoryStore, ProviderRegistry, SearchRequest, SearchService, SearchType,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MimirConfig::default();
//!     let store = Arc::new(MemoryStore::new());
//!     let registry = Arc::new(ProviderRegistry::from_settings(&config.embedding)?);
//!     let embeddings = Arc::new(EmbeddingService::new(
//!         store.clone(),
//!         registry,
//!         config.embedding.clone(),
//!     ));
//!     let search = SearchService::new(embeddings, store, config.search.clone());
//!
//!     let request = SearchRequest::new("quick brown fox", SearchType::Hybrid);
//!     let response = search.search(1, &request).await?;
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod error;
pub mod fusion;
pub mod hybrid;
pub mod memory;
pub mod schema;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use embeddings::{EmbeddingProvider, ProviderRegistry, ProviderStatus};
pub use error::{Result, SearchError};
pub use fusion::{fuse_rankings, reciprocal_rank_fusion, FusionConfig};
pub use hybrid::{SearchService, SemanticQuery};
pub use memory::MemoryStore;
pub use schema::{
    BatchOutcome, EmbeddingModelInfo, EmbeddingResult, MatchSource, SearchFilters, SearchRequest,
    SearchResponse, SearchResultItem, SearchType, StoredEmbedding, MAX_EMBEDDING_DIMENSIONS,
};
pub use service::EmbeddingService;
pub use store::{ArtifactContent, ArtifactStore};
