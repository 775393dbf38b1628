//! Embedding generation with pluggable provider backends
//!
//! - **Voyage** - Voyage AI cloud API (preferred default)
//! - **OpenAI** - OpenAI cloud API
//! - **Ollama** - local Ollama server
//!
//! # Architecture
//!
//! ```text
//! ProviderRegistry
//!     └── EmbeddingProvider (trait)
//!             ├── VoyageProvider   - RemoteEmbeddingClient, native batch
//!             ├── OpenAIProvider   - RemoteEmbeddingClient, native batch
//!             └── OllamaProvider   - /api/embeddings, sequential batch
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mimir_config::EmbeddingSettings;
//! use mimir_search::embeddings::ProviderRegistry;
//!
//! let registry = ProviderRegistry::from_settings(&EmbeddingSettings::default())?;
//! if let Some(model) = registry.default_model().await {
//!     let provider = registry.provider_for_model(&model.model_id).unwrap();
//!     let result = provider.generate_embedding("hello", &model.model_id).await?;
//! }
//! ```

pub mod models;
pub mod ollama;
pub mod openai;
mod provider;
mod registry;
pub mod remote;
pub mod voyage;

pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::OpenAIProvider;
pub use provider::{EmbeddingProvider, ProviderStatus};
pub use registry::ProviderRegistry;
pub use remote::{RemoteConfig, RemoteEmbeddingClient};
pub use voyage::VoyageProvider;
