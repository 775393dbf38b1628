//! Storage collaborator trait.
//!
//! The retrieval core never talks to a database directly. Everything it needs
//! from persistent storage goes through [`ArtifactStore`]; SQL-backed and
//! in-memory implementations plug in behind it.

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{
    ArtifactId, LexicalHit, NeighborHit, NewEmbedding, SearchFilters, StoredEmbedding, TenantId,
};

/// Latest text of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactContent {
    pub text: String,
    pub version_id: Option<i64>,
}

/// Storage operations used by the embedding and search services.
///
/// Every call is a potential suspension point. Implementations must not hold
/// a connection between calls: the services call providers in between.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Latest version content of an artifact, if it has any.
    async fn latest_content(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
    ) -> Result<Option<ArtifactContent>>;

    /// Insert or replace the row keyed by `(tenant, artifact, model, chunk)`.
    async fn upsert_embedding(&self, embedding: NewEmbedding) -> Result<StoredEmbedding>;

    /// Stored row for an artifact chunk.
    ///
    /// With `model_id = None` the most recently written row for the chunk is
    /// returned, whatever its model.
    async fn stored_embedding(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        model_id: Option<&str>,
        chunk_index: u32,
    ) -> Result<Option<StoredEmbedding>>;

    /// Delete one embedding row. Returns whether a row existed.
    async fn delete_embedding(&self, tenant_id: TenantId, embedding_id: i64) -> Result<bool>;

    /// Delete every embedding row of an artifact. Returns the number removed.
    async fn delete_embeddings_for_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
    ) -> Result<usize>;

    /// Artifacts most similar to `query`, by descending cosine similarity.
    ///
    /// Similarity is computed over each row's true width. Rows of other
    /// widths are skipped. `model_id = None` searches every model.
    /// Each artifact appears at most once, scored by its best row, and
    /// `limit` counts artifacts. `exclude` is left out before the limit
    /// applies.
    async fn nearest_neighbors(
        &self,
        tenant_id: TenantId,
        model_id: Option<&str>,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
        exclude: Option<ArtifactId>,
    ) -> Result<Vec<NeighborHit>>;

    /// Full-text matches by descending rank, ties in a deterministic order.
    async fn fulltext_rank(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LexicalHit>>;

    /// Number of full-text matches, ignoring paging.
    async fn fulltext_count(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<usize>;
}
