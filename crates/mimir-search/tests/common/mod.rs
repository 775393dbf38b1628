//! Common test utilities for mimir-search integration tests.
//!
//! Everything runs in-process: a deterministic fake provider over the
//! in-memory store, no network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use mimir_config::{EmbeddingSettings, SearchSettings};
use mimir_search::{
    EmbeddingModelInfo, EmbeddingProvider, EmbeddingResult, EmbeddingService, MemoryStore,
    ProviderRegistry, Result, SearchError, SearchService,
};

pub const TENANT: i64 = 1;

/// Fake provider giving each distinct token its own vector component.
///
/// A text's vector counts its tokens, so texts sharing words have a positive
/// cosine similarity and texts sharing none are orthogonal.
pub struct VocabularyProvider {
    name: &'static str,
    models: Vec<EmbeddingModelInfo>,
    configured: bool,
    batch: bool,
    /// Texts containing any of these fail to embed
    poison: Vec<String>,
    vocabulary: Mutex<HashMap<String, usize>>,
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl VocabularyProvider {
    pub fn new(name: &'static str, model_id: &str, dimensions: usize) -> Self {
        Self {
            name,
            models: vec![EmbeddingModelInfo::new(
                model_id,
                name,
                model_id,
                dimensions,
                8192,
                "vocabulary-indexed test model",
            )],
            configured: true,
            batch: false,
            poison: Vec::new(),
            vocabulary: Mutex::new(HashMap::new()),
            single_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn with_batch(mut self) -> Self {
        self.batch = true;
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.poison.push(marker.to_string());
        self
    }

    pub fn dimensions(&self) -> usize {
        self.models[0].dimensions
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let dimensions = self.dimensions();
        let mut vector = vec![0.0; dimensions];
        let mut vocabulary = self.vocabulary.lock();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let next = vocabulary.len();
            let index = *vocabulary.entry(token).or_insert(next);
            vector[index % dimensions] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn list_models(&self) -> &[EmbeddingModelInfo] {
        &self.models
    }

    async fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<EmbeddingResult> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if self.model_info(model_id).is_none() {
            return Err(SearchError::UnknownModel(model_id.to_string()));
        }
        if self.poison.iter().any(|p| text.contains(p.as_str())) {
            return Err(SearchError::upstream(self.name, 500, "scripted failure"));
        }
        Ok(EmbeddingResult::new(self.vector(text), model_id, Some(1)))
    }

    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
        model_id: &str,
    ) -> Result<Vec<EmbeddingResult>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.poison.iter().any(|p| texts.iter().any(|t| t.contains(p.as_str()))) {
            return Err(SearchError::upstream(self.name, 503, "scripted batch failure"));
        }
        Ok(texts
            .iter()
            .map(|t| EmbeddingResult::new(self.vector(t), model_id, Some(1)))
            .collect())
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }
}

/// Store, embedding service and search service wired together.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub embeddings: Arc<EmbeddingService>,
    pub search: SearchService,
}

impl Harness {
    /// One provider, default settings.
    pub fn single(provider: Arc<VocabularyProvider>) -> Self {
        Self::build(
            vec![provider as Arc<dyn EmbeddingProvider>],
            None,
            EmbeddingSettings::default(),
        )
    }

    pub fn build(
        providers: Vec<Arc<dyn EmbeddingProvider>>,
        preferred: Option<&str>,
        settings: EmbeddingSettings,
    ) -> Self {
        let mut registry = ProviderRegistry::new();
        if let Some(preferred) = preferred {
            registry = registry.with_preferred(preferred);
        }
        for provider in providers {
            registry.register(provider).expect("register provider");
        }

        let store = Arc::new(MemoryStore::new());
        let embeddings = Arc::new(EmbeddingService::new(
            store.clone(),
            Arc::new(registry),
            settings,
        ));
        let search = SearchService::new(
            embeddings.clone(),
            store.clone(),
            SearchSettings::default(),
        );
        Self {
            store,
            embeddings,
            search,
        }
    }

    /// Add an artifact of type "document" with one content version.
    pub fn add(&self, artifact_id: i64, content: &str) {
        self.store.insert_artifact(
            TENANT,
            artifact_id,
            "document",
            format!("doc-{artifact_id}"),
            content,
        );
    }

    /// Embed every listed artifact, failing the test on any error.
    pub async fn embed_all(&self, artifact_ids: &[i64]) {
        for id in artifact_ids {
            self.embeddings
                .embed_artifact(TENANT, *id, None, None, 0)
                .await
                .expect("embed artifact");
        }
    }
}

/// Single vocabulary provider serving `model_id` at `dimensions`.
pub fn vocabulary(model_id: &str, dimensions: usize) -> Arc<VocabularyProvider> {
    Arc::new(VocabularyProvider::new("vocab", model_id, dimensions))
}
