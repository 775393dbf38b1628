//! Hybrid search combining full-text rank and vector similarity
//!
//! Strategies:
//! - **Lexical**: the store's full-text ranking, densely re-ranked 1..N
//! - **Semantic**: nearest neighbours of a query vector (or of an embedded
//!   query text), collapsed to one hit per artifact
//! - **Hybrid**: both of the above over-fetched, then merged with
//!   reciprocal rank fusion ([`crate::fusion`])
//!
//! Searches are stateless; identical inputs over an unchanged corpus give
//! identical results.

use std::sync::Arc;

use mimir_config::SearchSettings;
use tracing::{debug, info};

use crate::error::{Result, SearchError};
use crate::fusion::{fuse_rankings, FusionConfig};
use crate::schema::{
    ArtifactId, MatchSource, SearchFilters, SearchRequest, SearchResponse, SearchResultItem,
    SearchType, TenantId,
};
use crate::service::EmbeddingService;
use crate::store::ArtifactStore;

/// Longest accepted query text, in characters.
pub const MAX_QUERY_CHARS: usize = 10_000;

/// Highest accepted RRF damping constant.
pub const MAX_RRF_K: u32 = 1000;

/// Similarity threshold used when a request gives none.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.0;

/// Input of a semantic search.
#[derive(Debug, Clone, Copy)]
pub enum SemanticQuery<'a> {
    /// Embedded with the resolved model first
    Text(&'a str),
    /// Used as is
    Vector(&'a [f32]),
}

/// Search over an artifact store and its embeddings
pub struct SearchService {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn ArtifactStore>,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn ArtifactStore>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            embeddings,
            store,
            settings,
        }
    }

    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Full-text search, ranked by the store.
    pub async fn lexical_search(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResultItem>> {
        let hits = self
            .store
            .fulltext_rank(tenant_id, query, filters, limit, offset)
            .await?;

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SearchResultItem {
                artifact_id: hit.artifact_id,
                score: hit.rank_score,
                similarity: None,
                rank: i + 1,
                snippet: hit.snippet,
                found_via: vec![MatchSource::Lexical],
            })
            .collect())
    }

    /// Vector similarity search.
    ///
    /// A text query is embedded and the search is restricted to its model.
    /// A vector query searches `model` if given, otherwise every model whose
    /// stored width matches the vector.
    pub async fn semantic_search(
        &self,
        tenant_id: TenantId,
        query: SemanticQuery<'_>,
        filters: &SearchFilters,
        limit: usize,
        model: Option<&str>,
        min_similarity: f64,
    ) -> Result<Vec<SearchResultItem>> {
        match query {
            SemanticQuery::Text(text) => {
                let (model_id, vector) = self.embeddings.embed_query_text(text, model).await?;
                self.rank_neighbors(
                    tenant_id,
                    Some(&model_id),
                    &vector,
                    filters,
                    limit,
                    min_similarity,
                    None,
                )
                .await
            }
            SemanticQuery::Vector(vector) => {
                self.rank_neighbors(
                    tenant_id,
                    model,
                    vector,
                    filters,
                    limit,
                    min_similarity,
                    None,
                )
                .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn rank_neighbors(
        &self,
        tenant_id: TenantId,
        model: Option<&str>,
        vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
        min_similarity: f64,
        exclude: Option<ArtifactId>,
    ) -> Result<Vec<SearchResultItem>> {
        // One hit per artifact, best first, so the threshold only trims the tail
        let mut hits = self
            .store
            .nearest_neighbors(tenant_id, model, vector, limit, filters, exclude)
            .await?;
        hits.retain(|hit| hit.similarity >= min_similarity);

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SearchResultItem {
                artifact_id: hit.artifact_id,
                score: hit.similarity,
                similarity: Some(hit.similarity),
                rank: i + 1,
                snippet: hit.snippet,
                found_via: vec![MatchSource::Semantic],
            })
            .collect())
    }

    /// Lexical and semantic search fused with RRF.
    ///
    /// Each side is over-fetched by the configured factor. A query embedding
    /// failure is returned as an error; a model without stored vectors just
    /// leaves the semantic side empty.
    pub async fn hybrid_search(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        model: Option<&str>,
        fusion: &FusionConfig,
    ) -> Result<Vec<SearchResultItem>> {
        let mut fused = self
            .fused_candidates(tenant_id, query, filters, limit, model, fusion)
            .await?;
        fused.truncate(limit);
        Ok(fused)
    }

    /// Every fused candidate of a hybrid search, ranked but not truncated.
    async fn fused_candidates(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        model: Option<&str>,
        fusion: &FusionConfig,
    ) -> Result<Vec<SearchResultItem>> {
        let candidates = limit.saturating_mul(self.settings.overfetch_factor.max(2));

        let lexical = self
            .lexical_search(tenant_id, query, filters, candidates, 0)
            .await?;
        let semantic = self
            .semantic_search(
                tenant_id,
                SemanticQuery::Text(query),
                filters,
                candidates,
                model,
                DEFAULT_MIN_SIMILARITY,
            )
            .await?;

        debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            k = fusion.k,
            semantic_weight = fusion.semantic_weight,
            "Fusing result lists"
        );

        let fused = fuse_rankings(&semantic, &lexical, fusion);
        for item in fused.iter().take(5) {
            debug!(
                "  {} score={:.5} via {:?}",
                item.artifact_id, item.score, item.found_via
            );
        }
        Ok(fused)
    }

    /// Artifacts closest to a stored artifact's own embedding.
    ///
    /// The query vector is the source's chunk-0 row, the embedding of its
    /// whole content. The source artifact never appears in the results. An
    /// artifact without an embedding yields no results.
    pub async fn find_similar(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        limit: usize,
        min_similarity: f64,
        filters: &SearchFilters,
        model: Option<&str>,
    ) -> Result<Vec<SearchResultItem>> {
        let Some(source) = self
            .embeddings
            .stored_embedding(tenant_id, artifact_id, model)
            .await?
        else {
            debug!(tenant_id, artifact_id, "No embedding to search from");
            return Ok(Vec::new());
        };

        self.rank_neighbors(
            tenant_id,
            Some(&source.model_id),
            source.true_vector(),
            filters,
            limit,
            min_similarity,
            Some(artifact_id),
        )
        .await
    }

    /// Validate a request and run the strategy it names.
    pub async fn search(
        &self,
        tenant_id: TenantId,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let limit = self.validate(request)?;
        let model = request.model.as_deref();
        let query = request.query.trim();

        info!("{} search for: '{}'", request.search_type, query);

        let (items, total) = match request.search_type {
            SearchType::Lexical => {
                let items = self
                    .lexical_search(tenant_id, query, &request.filters, limit, request.offset)
                    .await?;
                let total = self
                    .store
                    .fulltext_count(tenant_id, query, &request.filters)
                    .await?;
                (items, total)
            }
            SearchType::Semantic => {
                let items = self
                    .semantic_search(
                        tenant_id,
                        SemanticQuery::Text(query),
                        &request.filters,
                        limit,
                        model,
                        request.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY),
                    )
                    .await?;
                let total = items.len();
                (items, total)
            }
            SearchType::Hybrid => {
                let fusion = FusionConfig {
                    k: request.rrf_k.unwrap_or(self.settings.rrf_k),
                    semantic_weight: request
                        .semantic_weight
                        .unwrap_or(self.settings.semantic_weight),
                };
                // Total counts the whole fused union, not just this page
                let mut items = self
                    .fused_candidates(tenant_id, query, &request.filters, limit, model, &fusion)
                    .await?;
                let total = items.len();
                items.truncate(limit);
                (items, total)
            }
        };

        debug!("Returning {} of {} results", items.len(), total);
        Ok(SearchResponse {
            items,
            total,
            query: request.query.clone(),
            search_type: request.search_type,
            limit,
            offset: request.offset,
        })
    }

    /// Check request bounds. Returns the effective limit.
    fn validate(&self, request: &SearchRequest) -> Result<usize> {
        if request.query.trim().is_empty() {
            return Err(SearchError::InvalidRequest("query must not be empty".into()));
        }
        if request.query.chars().count() > MAX_QUERY_CHARS {
            return Err(SearchError::InvalidRequest(format!(
                "query exceeds {MAX_QUERY_CHARS} characters"
            )));
        }

        let limit = request.limit.unwrap_or(self.settings.default_limit);
        if limit == 0 || limit > self.settings.max_limit {
            return Err(SearchError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {limit}",
                self.settings.max_limit
            )));
        }

        if let Some(weight) = request.semantic_weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(SearchError::InvalidRequest(format!(
                    "semantic_weight must be between 0 and 1, got {weight}"
                )));
            }
        }
        if let Some(k) = request.rrf_k {
            if !(1..=MAX_RRF_K).contains(&k) {
                return Err(SearchError::InvalidRequest(format!(
                    "rrf_k must be between 1 and {MAX_RRF_K}, got {k}"
                )));
            }
        }
        if let Some(threshold) = request.min_similarity {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(SearchError::InvalidRequest(format!(
                    "min_similarity must be between 0 and 1, got {threshold}"
                )));
            }
        }
        Ok(limit)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("embeddings", &self.embeddings)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingProvider, ProviderRegistry};
    use crate::memory::MemoryStore;
    use crate::schema::{fit_to_storage, EmbeddingModelInfo, EmbeddingResult, NewEmbedding};
    use async_trait::async_trait;
    use mimir_config::EmbeddingSettings;

    /// Maps texts onto three axes by keyword.
    struct AxisProvider {
        models: Vec<EmbeddingModelInfo>,
    }

    impl AxisProvider {
        fn new() -> Self {
            Self {
                models: vec![EmbeddingModelInfo::new("axis", "axis", "Axis", 3, 64, "")],
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn provider_name(&self) -> &str {
            "axis"
        }

        fn list_models(&self) -> &[EmbeddingModelInfo] {
            &self.models
        }

        async fn is_configured(&self) -> bool {
            true
        }

        async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<EmbeddingResult> {
            let vector = vec![
                if text.contains("fox") { 1.0 } else { 0.0 },
                if text.contains("dog") { 1.0 } else { 0.0 },
                0.1,
            ];
            Ok(EmbeddingResult::new(vector, model_id, None))
        }
    }

    fn setup() -> (Arc<MemoryStore>, SearchService) {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(AxisProvider::new())).unwrap();
        let store = Arc::new(MemoryStore::new());
        let settings = EmbeddingSettings {
            storage_dimensions: 8,
            ..EmbeddingSettings::default()
        };
        let embeddings = Arc::new(EmbeddingService::new(
            store.clone(),
            Arc::new(registry),
            settings,
        ));
        let search = SearchService::new(embeddings, store.clone(), SearchSettings::default());
        (store, search)
    }

    fn chunk(artifact_id: ArtifactId, chunk_index: u32, native: Vec<f32>) -> NewEmbedding {
        let (vector, dimensions) = fit_to_storage(native, 8);
        NewEmbedding {
            tenant_id: 1,
            artifact_id,
            artifact_version_id: None,
            model_id: "axis".into(),
            chunk_index,
            vector,
            dimensions,
            chunk_text: None,
        }
    }

    #[tokio::test]
    async fn test_semantic_search_one_row_per_artifact() {
        let (store, search) = setup();
        store.upsert_embedding(chunk(1, 0, vec![1.0, 0.0, 0.0])).await.unwrap();
        store.upsert_embedding(chunk(1, 1, vec![0.9, 0.1, 0.0])).await.unwrap();
        store.upsert_embedding(chunk(2, 0, vec![0.0, 1.0, 0.0])).await.unwrap();

        let items = search
            .semantic_search(
                1,
                SemanticQuery::Vector(&[1.0, 0.0, 0.0]),
                &SearchFilters::default(),
                10,
                Some("axis"),
                0.5,
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].artifact_id, 1);
        assert_eq!(items[0].rank, 1);
        assert!((items[0].similarity.unwrap() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_multi_chunk_artifact_does_not_starve_limit() {
        let (store, search) = setup();
        for (index, tilt) in [0.0, 0.05, 0.1, 0.15].into_iter().enumerate() {
            store
                .upsert_embedding(chunk(1, index as u32, vec![1.0, tilt, 0.0]))
                .await
                .unwrap();
        }
        store.upsert_embedding(chunk(2, 0, vec![0.5, 0.5, 0.0])).await.unwrap();

        let items = search
            .semantic_search(
                1,
                SemanticQuery::Vector(&[1.0, 0.0, 0.0]),
                &SearchFilters::default(),
                2,
                Some("axis"),
                0.0,
            )
            .await
            .unwrap();
        let ids: Vec<ArtifactId> = items.iter().map(|i| i.artifact_id).collect();
        assert_eq!(ids, vec![1, 2]);

        let similar = search
            .find_similar(1, 1, 1, 0.0, &SearchFilters::default(), None)
            .await
            .unwrap();
        let ids: Vec<ArtifactId> = similar.iter().map(|i| i.artifact_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_hybrid_total_counts_fused_union() {
        let (store, search) = setup();
        for id in 1..=6 {
            store.insert_artifact(1, id, "note", "t", format!("fox number {id}"));
        }

        let request = SearchRequest::new("fox", SearchType::Hybrid).with_limit(2);
        let response = search.search(1, &request).await.unwrap();
        assert_eq!(response.items.len(), 2);
        // limit 2 over-fetched by 2 on the lexical side, no stored vectors
        assert_eq!(response.total, 4);
    }

    #[tokio::test]
    async fn test_lexical_ranks_are_dense() {
        let (store, search) = setup();
        store.insert_artifact(1, 1, "note", "a", "fox fox fox");
        store.insert_artifact(1, 2, "note", "b", "a fox");
        store.insert_artifact(1, 3, "note", "c", "no match");

        let items = search
            .lexical_search(1, "fox", &SearchFilters::default(), 10, 0)
            .await
            .unwrap();
        let ranks: Vec<usize> = items.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(items[0].found_via, vec![MatchSource::Lexical]);
    }

    #[tokio::test]
    async fn test_find_similar_excludes_source() {
        let (store, search) = setup();
        store.upsert_embedding(chunk(1, 0, vec![1.0, 0.0, 0.1])).await.unwrap();
        store.upsert_embedding(chunk(2, 0, vec![0.9, 0.1, 0.1])).await.unwrap();
        store.upsert_embedding(chunk(3, 0, vec![0.0, 1.0, 0.1])).await.unwrap();

        let items = search
            .find_similar(1, 1, 5, 0.0, &SearchFilters::default(), None)
            .await
            .unwrap();
        let ids: Vec<ArtifactId> = items.iter().map(|i| i.artifact_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(items[0].rank, 1);

        let none = search
            .find_similar(1, 99, 5, 0.0, &SearchFilters::default(), None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_rejects_bad_requests() {
        let (_, search) = setup();

        let cases = vec![
            SearchRequest::new("   ", SearchType::Hybrid),
            SearchRequest::new("fox", SearchType::Hybrid).with_limit(0),
            SearchRequest::new("fox", SearchType::Hybrid).with_limit(101),
            SearchRequest {
                semantic_weight: Some(1.5),
                ..SearchRequest::new("fox", SearchType::Hybrid)
            },
            SearchRequest {
                rrf_k: Some(0),
                ..SearchRequest::new("fox", SearchType::Hybrid)
            },
            SearchRequest {
                min_similarity: Some(-0.1),
                ..SearchRequest::new("fox", SearchType::Semantic)
            },
            SearchRequest::new("x".repeat(MAX_QUERY_CHARS + 1), SearchType::Lexical),
        ];

        for request in cases {
            let err = search.search(1, &request).await.unwrap_err();
            assert!(matches!(err, SearchError::InvalidRequest(_)), "{request:?}");
        }
    }

    #[tokio::test]
    async fn test_search_dispatch_echoes_request() {
        let (store, search) = setup();
        store.insert_artifact(1, 1, "note", "a", "the quick brown fox");
        search
            .embeddings()
            .embed_artifact(1, 1, None, None, 0)
            .await
            .unwrap();

        let request = SearchRequest::new("fox", SearchType::Semantic).with_limit(5);
        let response = search.search(1, &request).await.unwrap();
        assert_eq!(response.search_type, SearchType::Semantic);
        assert_eq!(response.limit, 5);
        assert_eq!(response.total, 1);
        assert_eq!(response.items[0].artifact_id, 1);
    }
}
