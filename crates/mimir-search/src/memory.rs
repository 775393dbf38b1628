//! In-memory artifact store.
//!
//! A complete [`ArtifactStore`] kept behind a single `RwLock`. It backs the
//! CLI and the test suites; a SQL store implements the same trait for
//! production.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{Result, SearchError};
use crate::schema::{
    cosine_similarity, snippet, ArtifactId, LexicalHit, NeighborHit, NewEmbedding, SearchFilters,
    StoredEmbedding, TenantId, SNIPPET_CHARS,
};
use crate::store::{ArtifactContent, ArtifactStore};

type EmbeddingKey = (TenantId, ArtifactId, String, u32);

#[derive(Debug, Clone)]
struct ArtifactRecord {
    artifact_type: String,
    title: String,
    /// (version id, content), oldest first
    versions: Vec<(i64, String)>,
}

impl ArtifactRecord {
    fn latest(&self) -> Option<&(i64, String)> {
        self.versions.last()
    }
}

#[derive(Debug)]
struct StoredRow {
    row: StoredEmbedding,
    /// Write order, newest highest
    written: u64,
}

#[derive(Debug, Default)]
struct Inner {
    artifacts: BTreeMap<(TenantId, ArtifactId), ArtifactRecord>,
    embeddings: BTreeMap<EmbeddingKey, StoredRow>,
    next_embedding_id: i64,
    next_version_id: i64,
    writes: u64,
}

/// In-memory implementation of [`ArtifactStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

/// Lowercase alphanumeric terms of a text.
fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact with one content version. Returns the version id.
    ///
    /// Inserting an existing artifact appends a new version instead.
    pub fn insert_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        artifact_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> i64 {
        let mut inner = self.inner.write();
        inner.next_version_id += 1;
        let version_id = inner.next_version_id;

        let record = inner
            .artifacts
            .entry((tenant_id, artifact_id))
            .or_insert_with(|| ArtifactRecord {
                artifact_type: artifact_type.into(),
                title: title.into(),
                versions: Vec::new(),
            });
        record.versions.push((version_id, content.into()));
        version_id
    }

    /// Add an artifact that has no content versions.
    pub fn insert_empty_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        artifact_type: impl Into<String>,
        title: impl Into<String>,
    ) {
        self.inner.write().artifacts.insert(
            (tenant_id, artifact_id),
            ArtifactRecord {
                artifact_type: artifact_type.into(),
                title: title.into(),
                versions: Vec::new(),
            },
        );
    }

    /// Every embedding row of a tenant, ordered by key.
    pub fn embedding_rows(&self, tenant_id: TenantId) -> Vec<StoredEmbedding> {
        self.inner
            .read()
            .embeddings
            .iter()
            .filter(|(key, _)| key.0 == tenant_id)
            .map(|(_, stored)| stored.row.clone())
            .collect()
    }

    /// Number of artifacts of a tenant.
    pub fn artifact_count(&self, tenant_id: TenantId) -> usize {
        self.inner
            .read()
            .artifacts
            .keys()
            .filter(|(tenant, _)| *tenant == tenant_id)
            .count()
    }

    fn passes(
        inner: &Inner,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        filters: &SearchFilters,
    ) -> bool {
        if filters.artifact_types.is_empty() {
            return true;
        }
        inner
            .artifacts
            .get(&(tenant_id, artifact_id))
            .is_some_and(|a| filters.accepts(&a.artifact_type))
    }

    /// Score every artifact matching all query terms, best first.
    fn lexical_matches(
        inner: &Inner,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
    ) -> Vec<LexicalHit> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<LexicalHit> = inner
            .artifacts
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .filter(|(_, record)| filters.accepts(&record.artifact_type))
            .filter_map(|((_, id), record)| {
                let (_, content) = record.latest()?;
                let doc_terms = terms(&format!("{} {}", record.title, content));
                if doc_terms.is_empty() {
                    return None;
                }

                let mut frequency = 0usize;
                for term in &query_terms {
                    let count = doc_terms.iter().filter(|t| *t == term).count();
                    if count == 0 {
                        return None;
                    }
                    frequency += count;
                }

                Some(LexicalHit {
                    artifact_id: *id,
                    rank_score: frequency as f64 / (1.0 + (doc_terms.len() as f64).ln()),
                    snippet: Some(snippet(content, SNIPPET_CHARS)),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.rank_score
                .total_cmp(&a.rank_score)
                .then(a.artifact_id.cmp(&b.artifact_id))
        });
        hits
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn latest_content(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
    ) -> Result<Option<ArtifactContent>> {
        let inner = self.inner.read();
        Ok(inner
            .artifacts
            .get(&(tenant_id, artifact_id))
            .and_then(ArtifactRecord::latest)
            .map(|(version_id, text)| ArtifactContent {
                text: text.clone(),
                version_id: Some(*version_id),
            }))
    }

    async fn upsert_embedding(&self, embedding: NewEmbedding) -> Result<StoredEmbedding> {
        if embedding.dimensions > embedding.vector.len() {
            return Err(SearchError::Storage(format!(
                "recorded width {} exceeds vector length {}",
                embedding.dimensions,
                embedding.vector.len()
            )));
        }

        let mut inner = self.inner.write();
        let key = (
            embedding.tenant_id,
            embedding.artifact_id,
            embedding.model_id.clone(),
            embedding.chunk_index,
        );

        let existing_id = inner.embeddings.get(&key).map(|stored| stored.row.id);
        let id = match existing_id {
            Some(id) => id,
            None => {
                inner.next_embedding_id += 1;
                inner.next_embedding_id
            }
        };
        inner.writes += 1;
        let written = inner.writes;

        let row = StoredEmbedding {
            id,
            tenant_id: embedding.tenant_id,
            artifact_id: embedding.artifact_id,
            artifact_version_id: embedding.artifact_version_id,
            model_id: embedding.model_id,
            chunk_index: embedding.chunk_index,
            vector: embedding.vector,
            dimensions: embedding.dimensions,
            chunk_text: embedding.chunk_text,
            created_at: Utc::now(),
        };
        inner.embeddings.insert(
            key,
            StoredRow {
                row: row.clone(),
                written,
            },
        );
        Ok(row)
    }

    async fn stored_embedding(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
        model_id: Option<&str>,
        chunk_index: u32,
    ) -> Result<Option<StoredEmbedding>> {
        let inner = self.inner.read();
        Ok(inner
            .embeddings
            .iter()
            .filter(|((tenant, artifact, model, chunk), _)| {
                *tenant == tenant_id
                    && *artifact == artifact_id
                    && *chunk == chunk_index
                    && model_id.is_none_or(|m| m == model.as_str())
            })
            .max_by_key(|(_, stored)| stored.written)
            .map(|(_, stored)| stored.row.clone()))
    }

    async fn delete_embedding(&self, tenant_id: TenantId, embedding_id: i64) -> Result<bool> {
        let mut inner = self.inner.write();
        let before = inner.embeddings.len();
        inner.embeddings.retain(|(tenant, ..), stored| {
            !(*tenant == tenant_id && stored.row.id == embedding_id)
        });
        Ok(inner.embeddings.len() < before)
    }

    async fn delete_embeddings_for_artifact(
        &self,
        tenant_id: TenantId,
        artifact_id: ArtifactId,
    ) -> Result<usize> {
        let mut inner = self.inner.write();
        let before = inner.embeddings.len();
        inner.embeddings.retain(|(tenant, artifact, ..), _| {
            !(*tenant == tenant_id && *artifact == artifact_id)
        });
        Ok(before - inner.embeddings.len())
    }

    async fn nearest_neighbors(
        &self,
        tenant_id: TenantId,
        model_id: Option<&str>,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
        exclude: Option<ArtifactId>,
    ) -> Result<Vec<NeighborHit>> {
        let inner = self.inner.read();

        // Best row per artifact; equal similarities keep the lowest chunk
        let mut best: HashMap<ArtifactId, (NeighborHit, u32)> = HashMap::new();
        for ((tenant, artifact, model, chunk), stored) in &inner.embeddings {
            if *tenant != tenant_id
                || Some(*artifact) == exclude
                || !model_id.is_none_or(|m| m == model.as_str())
                || stored.row.true_vector().len() != query.len()
                || !Self::passes(&inner, tenant_id, *artifact, filters)
            {
                continue;
            }

            let similarity = cosine_similarity(stored.row.true_vector(), query);
            let better = match best.get(artifact) {
                Some((current, current_chunk)) => {
                    similarity > current.similarity
                        || (similarity == current.similarity && *chunk < *current_chunk)
                }
                None => true,
            };
            if better {
                let hit = NeighborHit {
                    artifact_id: *artifact,
                    similarity,
                    snippet: stored.row.chunk_text.clone(),
                };
                best.insert(*artifact, (hit, *chunk));
            }
        }

        let mut hits: Vec<NeighborHit> = best.into_values().map(|(hit, _)| hit).collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.artifact_id.cmp(&b.artifact_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fulltext_rank(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LexicalHit>> {
        let inner = self.inner.read();
        Ok(Self::lexical_matches(&inner, tenant_id, query, filters)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn fulltext_count(
        &self,
        tenant_id: TenantId,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<usize> {
        let inner = self.inner.read();
        Ok(Self::lexical_matches(&inner, tenant_id, query, filters).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fit_to_storage;

    fn new_embedding(artifact_id: ArtifactId, model: &str, native: Vec<f32>) -> NewEmbedding {
        let (vector, dimensions) = fit_to_storage(native, 8);
        NewEmbedding {
            tenant_id: 1,
            artifact_id,
            artifact_version_id: None,
            model_id: model.to_string(),
            chunk_index: 0,
            vector,
            dimensions,
            chunk_text: Some(format!("artifact {artifact_id}")),
        }
    }

    #[tokio::test]
    async fn test_latest_content_uses_newest_version() {
        let store = MemoryStore::new();
        store.insert_artifact(1, 10, "note", "Fox", "first draft");
        let v2 = store.insert_artifact(1, 10, "note", "Fox", "second draft");

        let content = store.latest_content(1, 10).await.unwrap().unwrap();
        assert_eq!(content.text, "second draft");
        assert_eq!(content.version_id, Some(v2));

        store.insert_empty_artifact(1, 11, "note", "Empty");
        assert!(store.latest_content(1, 11).await.unwrap().is_none());
        assert!(store.latest_content(2, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() {
        let store = MemoryStore::new();
        let first = store
            .upsert_embedding(new_embedding(1, "m", vec![1.0, 0.0]))
            .await
            .unwrap();
        let second = store
            .upsert_embedding(new_embedding(1, "m", vec![0.0, 1.0]))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let rows = store.embedding_rows(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].true_vector(), &[0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_stored_embedding_any_model_returns_latest_write() {
        let store = MemoryStore::new();
        store
            .upsert_embedding(new_embedding(1, "a", vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(1, "b", vec![1.0, 1.0]))
            .await
            .unwrap();

        let any = store.stored_embedding(1, 1, None, 0).await.unwrap().unwrap();
        assert_eq!(any.model_id, "b");
        let a = store
            .stored_embedding(1, 1, Some("a"), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.dimensions, 1);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_uses_true_width() {
        let store = MemoryStore::new();
        store
            .upsert_embedding(new_embedding(1, "m", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(2, "m", vec![0.6, 0.8, 0.0]))
            .await
            .unwrap();
        // Different width, never comparable with a 3-wide query
        store
            .upsert_embedding(new_embedding(3, "m", vec![1.0, 0.0]))
            .await
            .unwrap();

        let hits = store
            .nearest_neighbors(
                1,
                Some("m"),
                &[1.0, 0.0, 0.0],
                10,
                &SearchFilters::default(),
                None,
            )
            .await
            .unwrap();

        let ids: Vec<ArtifactId> = hits.iter().map(|h| h.artifact_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
        assert!((hits[1].similarity - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_respects_model_and_filters() {
        let store = MemoryStore::new();
        store.insert_artifact(1, 1, "note", "a", "a");
        store.insert_artifact(1, 2, "document", "b", "b");
        store
            .upsert_embedding(new_embedding(1, "m", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(2, "m", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(2, "other", vec![1.0, 0.0]))
            .await
            .unwrap();

        let notes = SearchFilters::with_types(["note"]);
        let hits = store
            .nearest_neighbors(1, Some("m"), &[1.0, 0.0], 10, &notes, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artifact_id, 1);

        let all_models = store
            .nearest_neighbors(1, None, &[1.0, 0.0], 10, &SearchFilters::default(), None)
            .await
            .unwrap();
        // Two models of artifact 2, one hit
        let ids: Vec<ArtifactId> = all_models.iter().map(|h| h.artifact_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_limit_counts_artifacts() {
        let store = MemoryStore::new();
        for chunk in 0..4 {
            let mut embedding = new_embedding(1, "m", vec![1.0, 0.01 * chunk as f32, 0.0]);
            embedding.chunk_index = chunk;
            embedding.chunk_text = Some(format!("chunk {chunk}"));
            store.upsert_embedding(embedding).await.unwrap();
        }
        store
            .upsert_embedding(new_embedding(2, "m", vec![0.5, 0.5, 0.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(3, "m", vec![0.0, 0.0, 1.0]))
            .await
            .unwrap();

        let filters = SearchFilters::default();
        let hits = store
            .nearest_neighbors(1, Some("m"), &[1.0, 0.0, 0.0], 2, &filters, None)
            .await
            .unwrap();
        let ids: Vec<ArtifactId> = hits.iter().map(|h| h.artifact_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hits[0].snippet.as_deref(), Some("chunk 0"));

        let hits = store
            .nearest_neighbors(1, Some("m"), &[1.0, 0.0, 0.0], 1, &filters, Some(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artifact_id, 2);
    }

    #[tokio::test]
    async fn test_fulltext_requires_all_terms_and_pages() {
        let store = MemoryStore::new();
        store.insert_artifact(1, 1, "note", "Foxes", "the quick brown fox");
        store.insert_artifact(1, 2, "note", "Dogs", "the lazy dog");
        store.insert_artifact(1, 3, "note", "More foxes", "fox fox fox quick");
        store.insert_artifact(2, 4, "note", "Other tenant", "quick fox");

        let filters = SearchFilters::default();
        let hits = store.fulltext_rank(1, "quick fox", &filters, 10, 0).await.unwrap();
        let ids: Vec<ArtifactId> = hits.iter().map(|h| h.artifact_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(store.fulltext_count(1, "quick fox", &filters).await.unwrap(), 2);

        let page = store.fulltext_rank(1, "quick fox", &filters, 10, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].artifact_id, 1);

        assert!(store.fulltext_rank(1, "   ", &filters, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_embeddings() {
        let store = MemoryStore::new();
        let row = store
            .upsert_embedding(new_embedding(1, "a", vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(1, "b", vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(new_embedding(2, "a", vec![1.0]))
            .await
            .unwrap();

        assert!(!store.delete_embedding(2, row.id).await.unwrap());
        assert!(store.delete_embedding(1, row.id).await.unwrap());
        assert_eq!(store.delete_embeddings_for_artifact(1, 1).await.unwrap(), 1);
        assert_eq!(store.embedding_rows(1).len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_inconsistent_width() {
        let store = MemoryStore::new();
        let mut embedding = new_embedding(1, "m", vec![1.0]);
        embedding.dimensions = 99;
        assert!(store.upsert_embedding(embedding).await.is_err());
    }
}
