//! Embedding service
//!
//! Resolves models and providers, pulls artifact text from the store, calls
//! the provider and persists normalized vectors. Owns the storage-width
//! policy: native vectors are truncated to `storage_dimensions` and
//! zero-padded up to it, with the true width recorded on the row.

use std::sync::Arc;

use mimir_config::EmbeddingSettings;
use tracing::{debug, info, warn};

use crate::embeddings::{EmbeddingProvider, ProviderRegistry};
use crate::error::{Result, SearchError};
use crate::schema::{
    fit_to_storage, snippet, ArtifactId, BatchOutcome, EmbeddingModelInfo, NewEmbedding,
    StoredEmbedding, TenantId, SNIPPET_CHARS,
};
use crate::store::ArtifactStore;

/// Text waiting to be embedded as part of a batch.
struct PendingArtifact {
    artifact_id: ArtifactId,
    version_id: Option<i64>,
    text: String,
}

/// Embedding lifecycle over a store and a provider registry
pub struct EmbeddingService {
    store: Arc<dyn ArtifactStore>,
    registry: Arc<ProviderRegistry>,
    settings: EmbeddingSettings,
}

impl EmbeddingService {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        registry: Arc<ProviderRegistry>,
        settings: EmbeddingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    /// Pick the model for a call.
    ///
    /// An explicit id is used verbatim, then the configured default, then
    /// the registry's default.
    pub async fn resolve_model_id(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(model) = explicit {
            return Ok(model.to_string());
        }
        if let Some(model) = &self.settings.default_model {
            return Ok(model.clone());
        }
        self.registry
            .default_model()
            .await
            .map(|m| m.model_id)
            .ok_or(SearchError::NoProviderConfigured)
    }

    /// Provider serving `model_id`, which must be configured.
    pub async fn provider_for_model(&self, model_id: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider = self
            .registry
            .provider_for_model(model_id)
            .ok_or_else(|| SearchError::UnknownModel(model_id.to_string()))?;

        if !provider.is_configured().await {
            return Err(SearchError::not_configured(
                provider.provider_name(),
                format!("cannot serve model '{model_id}'"),
            ));
        }
        Ok(provider)
    }

    async fn resolve(
        &self,
        explicit: Option<&str>,
    ) -> Result<(String, Arc<dyn EmbeddingProvider>)> {
        let model_id = self.resolve_model_id(explicit).await?;
        let provider = self.provider_for_model(&model_id).await?;
        Ok((model_id, provider))
    }

    #[allow(clippy::too_many_arguments)]
    fn to_row(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        version_id: Option<i64>,
        model_id: &str,
        chunk_index: u32,
        native: Vec<f32>,
        text: &str,
    ) -> NewEmbedding {
        let native_width = native.len();
        let (vector, dimensions) = fit_to_storage(native, self.settings.storage_dimensions);
        if native_width > dimensions {
            debug!(
                model = model_id,
                native_width, dimensions, "Truncated embedding to storage width"
            );
        }

        NewEmbedding {
            tenant_id,
            artifact_id,
            artifact_version_id: version_id,
            model_id: model_id.to_string(),
            chunk_index,
            vector,
            dimensions,
            chunk_text: Some(snippet(text, SNIPPET_CHARS)),
        }
    }

    /// Embed one artifact chunk and upsert it.
    ///
    /// Without `text_override` the artifact's latest content is embedded and
    /// its version recorded. An override is embedded as given, with no
    /// version.
    pub async fn embed_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        model: Option<&str>,
        text_override: Option<&str>,
        chunk_index: u32,
    ) -> Result<StoredEmbedding> {
        let (model_id, provider) = self.resolve(model).await?;

        let (text, version_id) = match text_override {
            Some(text) => (text.to_string(), None),
            // The store connection is released before the provider call
            None => match self.store.latest_content(tenant_id, artifact_id).await? {
                Some(content) => (content.text, content.version_id),
                None => return Err(SearchError::NoContent { artifact_id }),
            },
        };
        if text.trim().is_empty() {
            return Err(SearchError::NoContent { artifact_id });
        }

        let result = provider.generate_embedding(&text, &model_id).await?;
        let row = self.to_row(
            tenant_id,
            artifact_id,
            version_id,
            &model_id,
            chunk_index,
            result.vector,
            &text,
        );
        let stored = self.store.upsert_embedding(row).await?;

        info!(
            tenant_id,
            artifact_id,
            model = %model_id,
            dimensions = stored.dimensions,
            "Embedded artifact"
        );
        Ok(stored)
    }

    /// Embed many artifacts, chunk 0 each.
    ///
    /// Model and provider resolution failures fail the call. Everything after
    /// that is aggregated into the outcome: an artifact without content, a
    /// failed provider call or a failed write never stops the remaining work.
    pub async fn embed_batch(
        &self,
        tenant_id: TenantId,
        artifact_ids: &[ArtifactId],
        model: Option<&str>,
    ) -> Result<BatchOutcome> {
        let (model_id, provider) = self.resolve(model).await?;
        let mut outcome = BatchOutcome::default();

        let mut pending = Vec::with_capacity(artifact_ids.len());
        for &artifact_id in artifact_ids {
            match self.store.latest_content(tenant_id, artifact_id).await {
                Ok(Some(content)) if !content.text.trim().is_empty() => {
                    pending.push(PendingArtifact {
                        artifact_id,
                        version_id: content.version_id,
                        text: content.text,
                    });
                }
                Ok(_) => {
                    outcome.record_failure(format!("Artifact {artifact_id}: no content to embed"))
                }
                Err(e) => outcome.record_failure(format!("Artifact {artifact_id}: {e}")),
            }
        }

        let batch_size = self.settings.batch_size.max(1);
        for (chunk_number, chunk) in pending.chunks(batch_size).enumerate() {
            if provider.supports_batch() {
                self.embed_chunk_batched(
                    tenant_id,
                    &model_id,
                    &provider,
                    chunk_number,
                    chunk,
                    &mut outcome,
                )
                .await;
            } else {
                self.embed_chunk_sequential(tenant_id, &model_id, &provider, chunk, &mut outcome)
                    .await;
            }
        }

        info!(
            tenant_id,
            model = %model_id,
            requested = artifact_ids.len(),
            created = outcome.created,
            failed = outcome.failed,
            "Batch embedding finished"
        );
        Ok(outcome)
    }

    async fn embed_chunk_batched(
        &self,
        tenant_id: TenantId,
        model_id: &str,
        provider: &Arc<dyn EmbeddingProvider>,
        chunk_number: usize,
        chunk: &[PendingArtifact],
        outcome: &mut BatchOutcome,
    ) {
        let texts: Vec<String> = chunk.iter().map(|p| p.text.clone()).collect();
        let results = match provider.generate_embeddings_batch(&texts, model_id).await {
            Ok(results) if results.len() == chunk.len() => results,
            Ok(results) => {
                let message = format!(
                    "Batch {chunk_number} failed: expected {} embeddings, got {}",
                    chunk.len(),
                    results.len()
                );
                warn!("{}", message);
                outcome.failed += chunk.len();
                outcome.errors.push(message);
                return;
            }
            Err(e) => {
                warn!(chunk = chunk_number, error = %e, "Embedding batch failed");
                outcome.failed += chunk.len();
                outcome.errors.push(format!("Batch {chunk_number} failed: {e}"));
                return;
            }
        };

        for (pending, result) in chunk.iter().zip(results) {
            self.persist(tenant_id, model_id, pending, result.vector, outcome)
                .await;
        }
    }

    async fn embed_chunk_sequential(
        &self,
        tenant_id: TenantId,
        model_id: &str,
        provider: &Arc<dyn EmbeddingProvider>,
        chunk: &[PendingArtifact],
        outcome: &mut BatchOutcome,
    ) {
        for pending in chunk {
            match provider.generate_embedding(&pending.text, model_id).await {
                Ok(result) => {
                    self.persist(tenant_id, model_id, pending, result.vector, outcome)
                        .await
                }
                Err(e) => {
                    warn!(artifact_id = pending.artifact_id, error = %e, "Embedding failed");
                    outcome.record_failure(format!("Artifact {}: {e}", pending.artifact_id));
                }
            }
        }
    }

    async fn persist(
        &self,
        tenant_id: TenantId,
        model_id: &str,
        pending: &PendingArtifact,
        native: Vec<f32>,
        outcome: &mut BatchOutcome,
    ) {
        let row = self.to_row(
            tenant_id,
            pending.artifact_id,
            pending.version_id,
            model_id,
            0,
            native,
            &pending.text,
        );
        match self.store.upsert_embedding(row).await {
            Ok(_) => outcome.created += 1,
            Err(e) => outcome.record_failure(format!("Artifact {}: {e}", pending.artifact_id)),
        }
    }

    /// Stored chunk-0 row of an artifact. `None` model means the latest write.
    ///
    /// Chunk 0 holds the embedding of the artifact's whole latest content, so
    /// it is the row used as a query seed; later chunks are never consulted.
    pub async fn stored_embedding(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        model: Option<&str>,
    ) -> Result<Option<StoredEmbedding>> {
        self.store
            .stored_embedding(tenant_id, artifact_id, model, 0)
            .await
    }

    /// Previously stored vector at its true width, for use as a query seed.
    pub async fn vector_for_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        model: Option<&str>,
    ) -> Result<Option<Vec<f32>>> {
        Ok(self
            .stored_embedding(tenant_id, artifact_id, model)
            .await?
            .map(|row| row.true_vector().to_vec()))
    }

    /// Embed a query text. The vector is never stored.
    ///
    /// Returned at native width capped to the storage width, without padding,
    /// together with the model used.
    pub async fn embed_query_text(
        &self,
        text: &str,
        model: Option<&str>,
    ) -> Result<(String, Vec<f32>)> {
        let (model_id, provider) = self.resolve(model).await?;
        let mut vector = provider.generate_embedding(text, &model_id).await?.vector;
        vector.truncate(self.settings.storage_dimensions);
        debug!(model = %model_id, dimensions = vector.len(), "Embedded query text");
        Ok((model_id, vector))
    }

    pub async fn delete_embedding(&self, tenant_id: TenantId, embedding_id: i64) -> Result<bool> {
        self.store.delete_embedding(tenant_id, embedding_id).await
    }

    pub async fn delete_embeddings_for_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
    ) -> Result<usize> {
        let removed = self
            .store
            .delete_embeddings_for_artifact(tenant_id, artifact_id)
            .await?;
        debug!(tenant_id, artifact_id, removed, "Deleted artifact embeddings");
        Ok(removed)
    }

    /// Models of configured providers
    pub async fn list_models(&self) -> Vec<EmbeddingModelInfo> {
        self.registry.list_models().await
    }

    /// Model used when a call names none, if any.
    pub async fn default_model(&self) -> Option<EmbeddingModelInfo> {
        match &self.settings.default_model {
            Some(model_id) => self
                .registry
                .provider_for_model(model_id)
                .and_then(|p| p.model_info(model_id)),
            None => self.registry.default_model().await,
        }
    }
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}
