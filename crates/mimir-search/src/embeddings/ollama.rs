//! Local Ollama embedding provider
//!
//! # Endpoint Format
//!
//! - POST `{base_url}/api/embeddings`
//! - Request: `{"model": "...", "prompt": "..."}`
//! - Response: `{"embedding": [...]}`
//!
//! Ollama has no batch endpoint, so batch generation falls back to the
//! sequential trait default. Availability is a plain TCP connect probe with a
//! short timeout, not a full request.

use std::time::Duration;

use async_trait::async_trait;
use mimir_config::{EmbeddingProviderType, OllamaSettings};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::models;
use super::provider::EmbeddingProvider;
use crate::error::{Result, SearchError};
use crate::schema::{EmbeddingModelInfo, EmbeddingResult};

const PROVIDER: EmbeddingProviderType = EmbeddingProviderType::Ollama;

/// Default Ollama port when the URL names none
const DEFAULT_PORT: u16 = 11434;

/// Substrings that mark an installed Ollama model as an embedding model
const EMBEDDING_KEYWORDS: &[&str] = &["embed", "minilm", "bge", "e5", "arctic"];

/// Configuration for the Ollama provider
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Server URL, e.g. `http://localhost:11434`
    pub base_url: String,
    /// Embedding request timeout
    pub timeout: Duration,
    /// Reachability probe timeout
    pub probe_timeout: Duration,
    /// `/api/tags` discovery timeout
    pub discovery_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::from(&OllamaSettings::default())
    }
}

impl From<&OllamaSettings> for OllamaConfig {
    fn from(settings: &OllamaSettings) -> Self {
        Self {
            base_url: settings.url.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            probe_timeout: Duration::from_millis(settings.probe_timeout_ms),
            discovery_timeout: Duration::from_secs(settings.discovery_timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: String,
}

/// Local Ollama embedding provider
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
    /// Installed embedding models; set by the first successful discovery
    discovered: OnceCell<Vec<String>>,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            config,
            discovered: OnceCell::new(),
        })
    }

    pub fn from_settings(settings: &OllamaSettings) -> Result<Self> {
        Self::new(OllamaConfig::from(settings))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Host and port the probe connects to
    fn probe_address(&self) -> Option<(String, u16)> {
        let url = Url::parse(&self.config.base_url).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);
        Some((host, port))
    }

    /// Embedding models installed on the server.
    ///
    /// The first successful answer is cached for the lifetime of the provider;
    /// failures are not cached, so a later call probes again.
    pub async fn discover_models(&self) -> Result<&[String]> {
        let models = self
            .discovered
            .get_or_try_init(|| async {
                let models = self.fetch_installed_models().await;
                if let Err(ref e) = models {
                    warn!(base_url = self.base_url(), error = %e, "Failed to fetch Ollama models");
                }
                models
            })
            .await?;
        Ok(models.as_slice())
    }

    async fn fetch_installed_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url());
        let response = self
            .client
            .get(&url)
            .timeout(self.config.discovery_timeout)
            .send()
            .await
            .map_err(|e| {
                SearchError::ProviderUnavailable(format!("Ollama discovery failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::upstream(PROVIDER.as_str(), status.as_u16(), &body));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("Ollama tags: {}", e)))?;

        let models: Vec<String> = tags
            .models
            .into_iter()
            .map(|m| m.name)
            .filter(|name| {
                let lower = name.to_lowercase();
                EMBEDDING_KEYWORDS.iter().any(|kw| lower.contains(kw))
            })
            .collect();

        debug!(count = models.len(), "Discovered Ollama embedding models");
        Ok(models)
    }

    fn is_discovered(&self, model_id: &str) -> bool {
        self.discovered
            .get()
            .is_some_and(|models| models.iter().any(|m| m == model_id))
    }

    /// Resolve a model, running discovery when the catalog does not know it
    async fn resolve_model(&self, model_id: &str) -> Result<()> {
        if self.model_info(model_id).is_some() {
            return Ok(());
        }
        let installed = self.discover_models().await?;
        if installed.iter().any(|m| m == model_id) {
            Ok(())
        } else {
            Err(SearchError::UnknownModel(format!(
                "{} is not a known or installed Ollama embedding model",
                model_id
            )))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        PROVIDER.as_str()
    }

    fn list_models(&self) -> &[EmbeddingModelInfo] {
        models::catalog(PROVIDER)
    }

    /// Catalog models (with or without a `:tag`) plus discovered ones
    fn model_info(&self, model_id: &str) -> Option<EmbeddingModelInfo> {
        let known = models::find(PROVIDER, models::base_model_name(model_id)).is_some();
        if known || self.is_discovered(model_id) {
            Some(models::local_model_info(model_id))
        } else {
            None
        }
    }

    async fn is_configured(&self) -> bool {
        let Some((host, port)) = self.probe_address() else {
            return false;
        };

        let connect = TcpStream::connect((host.as_str(), port));
        match tokio::time::timeout(self.config.probe_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %host, port, error = %e, "Ollama probe failed");
                false
            }
            Err(_) => {
                debug!(host = %host, port, "Ollama probe timed out");
                false
            }
        }
    }

    async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<EmbeddingResult> {
        self.resolve_model(model_id).await?;

        let url = format!("{}/api/embeddings", self.base_url());
        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout)
            .json(&EmbeddingRequest {
                model: model_id,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SearchError::not_configured(
                        PROVIDER.as_str(),
                        format!(
                            "cannot connect to Ollama at {}. Is Ollama running? Start with: ollama serve",
                            self.base_url()
                        ),
                    )
                } else if e.is_timeout() {
                    SearchError::ProviderUnavailable(format!(
                        "Ollama request timed out after {:?}",
                        self.config.timeout
                    ))
                } else {
                    SearchError::ProviderUnavailable(format!("Ollama request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::upstream(PROVIDER.as_str(), status.as_u16(), &body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("Ollama response: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(SearchError::InvalidResponse(format!(
                "Ollama returned an empty embedding for {}",
                model_id
            )));
        }

        debug!(
            model = model_id,
            dimensions = parsed.embedding.len(),
            "Generated Ollama embedding"
        );

        // Ollama does not report token usage
        Ok(EmbeddingResult::new(parsed.embedding, model_id, None))
    }

    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
        model_id: &str,
    ) -> Result<Vec<EmbeddingResult>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.generate_embedding(text, model_id).await?);
        }

        info!(
            model = model_id,
            count = results.len(),
            "Generated Ollama embeddings batch"
        );
        Ok(results)
    }
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("probe_timeout", &self.config.probe_timeout)
            .field("discovered", &self.discovered.get())
            .finish()
    }
}
