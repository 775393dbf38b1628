//! Embedding provider trait and types
//!
//! Defines the core abstraction for embedding generation with multiple provider implementations:
//! - `VoyageProvider` - Voyage AI cloud API
//! - `OpenAIProvider` - OpenAI cloud API
//! - `OllamaProvider` - local Ollama server

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::schema::{EmbeddingModelInfo, EmbeddingResult};

/// Status of an embedding provider
///
/// Contains configuration and reachability information for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub provider: String,
    /// Whether the provider has what it needs to run
    pub configured: bool,
    /// Duration of the configuration check in milliseconds
    pub latency_ms: Option<u64>,
    /// Number of catalog models
    pub model_count: usize,
    /// Reason the provider is not usable
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Create a status for a usable provider
    pub fn healthy(provider: impl Into<String>, model_count: usize) -> Self {
        Self {
            provider: provider.into(),
            configured: true,
            latency_ms: None,
            model_count,
            error: None,
        }
    }

    /// Create a status for an unusable provider
    pub fn unavailable(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            configured: false,
            latency_ms: None,
            model_count: 0,
            error: Some(error.into()),
        }
    }

    /// Set latency from a check
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Embedding provider trait
///
/// Core abstraction for generating embeddings from text. Each backend serves a
/// fixed catalog of models and reports whether it can run right now.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by every
/// concurrent request through the registry.
///
/// # Example
///
/// ```ignore
/// use mimir_search::embeddings::EmbeddingProvider;
///
/// async fn example(provider: &dyn EmbeddingProvider) -> mimir_search::Result<()> {
///     if !provider.is_configured().await {
///         return Ok(());
///     }
///     let model = &provider.list_models()[0];
///     let result = provider.generate_embedding("hello world", &model.model_id).await?;
///     assert_eq!(result.dimensions, model.dimensions);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable provider identifier, also the registry key
    fn provider_name(&self) -> &str;

    /// Static catalog served by this provider
    fn list_models(&self) -> &[EmbeddingModelInfo];

    /// Describe a model if this provider serves it
    fn model_info(&self, model_id: &str) -> Option<EmbeddingModelInfo> {
        self.list_models()
            .iter()
            .find(|m| m.model_id == model_id)
            .cloned()
    }

    /// Credential present (cloud) or server reachable (local)
    async fn is_configured(&self) -> bool;

    /// Embed one text with `model_id`
    async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<EmbeddingResult>;

    /// Embed several texts, results in input order
    ///
    /// The default calls [`EmbeddingProvider::generate_embedding`] once per
    /// text, sequentially. Providers with a native batch API override this and
    /// [`EmbeddingProvider::supports_batch`].
    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
        model_id: &str,
    ) -> Result<Vec<EmbeddingResult>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.generate_embedding(text, model_id).await?);
        }
        Ok(results)
    }

    /// Whether `generate_embeddings_batch` issues one upstream call
    fn supports_batch(&self) -> bool {
        false
    }

    /// Check provider configuration and measure how long the check took
    async fn check_status(&self) -> ProviderStatus {
        let start = Instant::now();
        let configured = self.is_configured().await;
        let latency = start.elapsed().as_millis() as u64;

        if configured {
            ProviderStatus::healthy(self.provider_name(), self.list_models().len())
                .with_latency(latency)
        } else {
            ProviderStatus::unavailable(self.provider_name(), "not configured")
                .with_latency(latency)
        }
    }
}
