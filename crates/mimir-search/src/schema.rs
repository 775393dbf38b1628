//! Embedding and search data types
//!
//! Defines the values that flow between providers, the embedding service,
//! the storage collaborator and search callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use mimir_config::MAX_EMBEDDING_DIMENSIONS;

/// Tenant identifier.
pub type TenantId = i64;

/// Artifact identifier.
pub type ArtifactId = i64;

/// Characters of source text kept alongside a stored embedding.
pub const SNIPPET_CHARS: usize = 200;

/// Immutable descriptor of an embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    /// Globally unique model identifier
    pub model_id: String,
    /// Name of the provider serving this model
    pub provider: String,
    /// Human-readable name
    pub display_name: String,
    /// Native output width
    pub dimensions: usize,
    /// Input truncation bound in tokens
    pub max_tokens: usize,
    pub description: String,
}

impl EmbeddingModelInfo {
    pub fn new(
        model_id: impl Into<String>,
        provider: impl Into<String>,
        display_name: impl Into<String>,
        dimensions: usize,
        max_tokens: usize,
        description: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            provider: provider.into(),
            display_name: display_name.into(),
            dimensions,
            max_tokens,
            description: description.into(),
        }
    }
}

/// Output of a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// Native-width vector
    pub vector: Vec<f32>,
    pub model_id: String,
    pub dimensions: usize,
    /// Provider-reported token usage
    pub tokens_used: Option<u32>,
}

impl EmbeddingResult {
    pub fn new(vector: Vec<f32>, model_id: impl Into<String>, tokens_used: Option<u32>) -> Self {
        let dimensions = vector.len();
        Self {
            vector,
            model_id: model_id.into(),
            dimensions,
            tokens_used,
        }
    }
}

/// Embedding row handed to the store for upsert.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub tenant_id: TenantId,
    pub artifact_id: ArtifactId,
    pub artifact_version_id: Option<i64>,
    pub model_id: String,
    pub chunk_index: u32,
    /// Storage-width vector (padded or truncated)
    pub vector: Vec<f32>,
    /// Meaningful prefix length of `vector`
    pub dimensions: usize,
    pub chunk_text: Option<String>,
}

/// Persisted embedding row.
///
/// `vector` always has the storage width; only the first `dimensions`
/// components carry signal. Read it through [`StoredEmbedding::true_vector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub id: i64,
    pub tenant_id: TenantId,
    pub artifact_id: ArtifactId,
    pub artifact_version_id: Option<i64>,
    pub model_id: String,
    pub chunk_index: u32,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub chunk_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredEmbedding {
    /// The stored vector without its storage padding.
    pub fn true_vector(&self) -> &[f32] {
        let width = self.dimensions.min(self.vector.len());
        &self.vector[..width]
    }
}

/// Truncate `vector` to `width` if longer, then zero-pad to `width`.
///
/// Returns the padded vector and the true (post-truncation) width.
pub fn fit_to_storage(mut vector: Vec<f32>, width: usize) -> (Vec<f32>, usize) {
    if vector.len() > width {
        vector.truncate(width);
    }
    let true_width = vector.len();
    vector.resize(width, 0.0);
    (vector, true_width)
}

/// Cut a text to at most `max_chars` characters.
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Cosine similarity of two equal-width vectors (0.0 for zero vectors).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Filters shared by every search strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Restrict to these artifact types (empty = all)
    pub artifact_types: Vec<String>,
}

impl SearchFilters {
    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            artifact_types: types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, artifact_type: &str) -> bool {
        self.artifact_types.is_empty() || self.artifact_types.iter().any(|t| t == artifact_type)
    }
}

/// Nearest-neighbour row returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborHit {
    pub artifact_id: ArtifactId,
    pub similarity: f64,
    pub snippet: Option<String>,
}

/// Full-text row returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub artifact_id: ArtifactId,
    pub rank_score: f64,
    pub snippet: Option<String>,
}

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[serde(alias = "fulltext")]
    Lexical,
    Semantic,
    #[default]
    Hybrid,
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchType::Lexical => write!(f, "lexical"),
            SearchType::Semantic => write!(f, "semantic"),
            SearchType::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Which strategy surfaced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Lexical,
    Semantic,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub artifact_id: ArtifactId,
    /// Cosine similarity, text rank or RRF score depending on the strategy
    pub score: f64,
    pub similarity: Option<f64>,
    /// 1-indexed position in this result list
    pub rank: usize,
    pub snippet: Option<String>,
    pub found_via: Vec<MatchSource>,
}

/// Search request as accepted from callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "type", default)]
    pub search_type: SearchType,
    #[serde(default)]
    pub filters: SearchFilters,
    /// None = configured default
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub min_similarity: Option<f64>,
    #[serde(default)]
    pub rrf_k: Option<u32>,
    #[serde(default)]
    pub semantic_weight: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            query: query.into(),
            search_type,
            filters: SearchFilters::default(),
            limit: None,
            offset: 0,
            model: None,
            min_similarity: None,
            rrf_k: None,
            semantic_weight: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub items: Vec<SearchResultItem>,
    /// Total matches for lexical search, returned item count otherwise
    pub total: usize,
    pub query: String,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub limit: usize,
    pub offset: usize,
}

/// Aggregate outcome of a batch embedding call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub(crate) fn record_failure(&mut self, message: String) {
        self.failed += 1;
        self.errors.push(message);
    }
}
