//! Provider registry
//!
//! Runtime table of embedding providers, built once at startup and shared by
//! reference with the embedding and search services. Registration order is
//! kept: it breaks ties when picking a default model.

use std::sync::Arc;

use mimir_config::EmbeddingSettings;
use tracing::{debug, info};

use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::provider::{EmbeddingProvider, ProviderStatus};
use super::voyage::VoyageProvider;
use crate::error::{Result, SearchError};
use crate::schema::EmbeddingModelInfo;

/// Collection of registered embedding providers
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    /// Provider whose first model wins default selection when configured
    preferred: Option<String>,
}

impl ProviderRegistry {
    /// Create an empty registry with no preferred provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard registry: voyage, openai, ollama, in that order
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let mut registry = Self::new().with_preferred(settings.preferred_provider.as_str());
        registry.register(Arc::new(VoyageProvider::from_settings(&settings.voyage)?))?;
        registry.register(Arc::new(OpenAIProvider::from_settings(&settings.openai)?))?;
        registry.register(Arc::new(OllamaProvider::from_settings(&settings.ollama)?))?;

        info!(
            providers = registry.providers.len(),
            preferred = %settings.preferred_provider,
            "Initialized embedding providers"
        );
        Ok(registry)
    }

    /// Mark a provider as preferred for default-model selection
    pub fn with_preferred(mut self, provider_name: impl Into<String>) -> Self {
        self.preferred = Some(provider_name.into());
        self
    }

    /// Register a provider, replacing any provider with the same name.
    ///
    /// Fails with [`SearchError::DuplicateModel`] when another provider
    /// already serves one of the incoming provider's models.
    pub fn register(&mut self, provider: Arc<dyn EmbeddingProvider>) -> Result<()> {
        let name = provider.provider_name().to_string();

        for existing in self.providers.iter().filter(|p| p.provider_name() != name) {
            let clash = provider
                .list_models()
                .iter()
                .find(|m| existing.model_info(&m.model_id).is_some())
                .or_else(|| {
                    existing
                        .list_models()
                        .iter()
                        .find(|m| provider.model_info(&m.model_id).is_some())
                });

            if let Some(model) = clash {
                return Err(SearchError::DuplicateModel {
                    model_id: model.model_id.clone(),
                    existing: existing.provider_name().to_string(),
                    incoming: name.clone(),
                });
            }
        }

        match self.providers.iter().position(|p| p.provider_name() == name) {
            Some(index) => {
                debug!(provider = %name, "Replacing embedding provider");
                self.providers[index] = provider;
            }
            None => {
                debug!(provider = %name, "Registered embedding provider");
                self.providers.push(provider);
            }
        }
        Ok(())
    }

    /// Look up a provider by name
    pub fn provider(&self, name: &str) -> Option<Arc<dyn EmbeddingProvider>> {
        self.providers
            .iter()
            .find(|p| p.provider_name() == name)
            .cloned()
    }

    /// All providers, in registration order
    pub fn providers(&self) -> &[Arc<dyn EmbeddingProvider>] {
        &self.providers
    }

    /// Provider that serves `model_id`
    pub fn provider_for_model(&self, model_id: &str) -> Option<Arc<dyn EmbeddingProvider>> {
        self.providers
            .iter()
            .find(|p| p.model_info(model_id).is_some())
            .cloned()
    }

    /// Providers whose configuration check passes, in registration order
    pub async fn configured_providers(&self) -> Vec<Arc<dyn EmbeddingProvider>> {
        let mut configured = Vec::new();
        for provider in &self.providers {
            if provider.is_configured().await {
                configured.push(Arc::clone(provider));
            }
        }
        configured
    }

    /// Default model.
    ///
    /// The preferred provider's first model if that provider is configured,
    /// otherwise the first model of the first configured provider.
    pub async fn default_model(&self) -> Option<EmbeddingModelInfo> {
        if let Some(preferred) = self.preferred.as_deref().and_then(|n| self.provider(n)) {
            if preferred.is_configured().await {
                if let Some(model) = preferred.list_models().first() {
                    return Some(model.clone());
                }
            }
        }

        for provider in &self.providers {
            if !provider.is_configured().await {
                continue;
            }
            if let Some(model) = provider.list_models().first() {
                return Some(model.clone());
            }
        }
        None
    }

    /// Models of configured providers
    pub async fn list_models(&self) -> Vec<EmbeddingModelInfo> {
        self.configured_providers()
            .await
            .iter()
            .flat_map(|p| p.list_models().iter().cloned())
            .collect()
    }

    /// Status of every registered provider
    pub async fn statuses(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            statuses.push(provider.check_status().await);
        }
        statuses
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.provider_name()).collect();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .field("preferred", &self.preferred)
            .finish()
    }
}
