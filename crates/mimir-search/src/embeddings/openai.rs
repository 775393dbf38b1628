//! OpenAI embedding provider
//!
//! Cloud provider using `POST {base_url}/embeddings`. The API accepts a list of
//! inputs, so batch generation is one request per chunk.

use async_trait::async_trait;
use mimir_config::{EmbeddingProviderType, OpenAISettings};
use tracing::info;

use super::models;
use super::provider::EmbeddingProvider;
use super::remote::{RemoteConfig, RemoteEmbeddingClient};
use crate::error::{Result, SearchError};
use crate::schema::{EmbeddingModelInfo, EmbeddingResult};

const PROVIDER: EmbeddingProviderType = EmbeddingProviderType::Openai;

/// OpenAI embedding provider
#[derive(Debug)]
pub struct OpenAIProvider {
    remote: RemoteEmbeddingClient,
}

impl OpenAIProvider {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        Ok(Self {
            remote: RemoteEmbeddingClient::new(PROVIDER.as_str(), config)?,
        })
    }

    /// Build from settings, resolving the API key from the environment
    pub fn from_settings(settings: &OpenAISettings) -> Result<Self> {
        let config = RemoteConfig::new(
            settings.url.clone(),
            settings.api_key(),
            settings.api_key_env.clone().unwrap_or_default(),
        )
        .with_timeouts(settings.timeout_secs, settings.batch_timeout_secs);
        Self::new(config)
    }

    fn check_model(&self, model_id: &str) -> Result<()> {
        self.remote.ensure_configured()?;
        if models::find(PROVIDER, model_id).is_none() {
            return Err(SearchError::UnknownModel(format!(
                "{} is not an OpenAI embedding model",
                model_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn provider_name(&self) -> &str {
        PROVIDER.as_str()
    }

    fn list_models(&self) -> &[EmbeddingModelInfo] {
        models::catalog(PROVIDER)
    }

    async fn is_configured(&self) -> bool {
        self.remote.is_configured()
    }

    async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<EmbeddingResult> {
        self.check_model(model_id)?;
        let result = self.remote.embed_one(text, model_id).await?;

        info!(
            model = model_id,
            dimensions = result.dimensions,
            "Generated OpenAI embedding"
        );
        Ok(result)
    }

    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
        model_id: &str,
    ) -> Result<Vec<EmbeddingResult>> {
        self.check_model(model_id)?;
        let results = self.remote.embed_many(texts, model_id).await?;

        info!(
            model = model_id,
            count = results.len(),
            "Generated OpenAI batch embeddings"
        );
        Ok(results)
    }

    fn supports_batch(&self) -> bool {
        true
    }
}
