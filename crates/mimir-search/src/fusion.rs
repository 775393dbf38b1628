//! Reciprocal Rank Fusion.
//!
//! Merges a semantic and a lexical ranking by rank position, never by raw
//! score, so cosine similarity and text rank never have to share a scale:
//!
//! ```text
//! score(a) = w / (k + rank_sem(a)) + (1 - w) / (k + rank_lex(a))
//! ```
//!
//! An artifact missing from one list simply gets no term from it.

use std::collections::HashMap;

use mimir_config::SearchSettings;

use crate::schema::{ArtifactId, MatchSource, SearchResultItem};

/// Fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// Damping constant; larger values flatten the head of each list
    pub k: u32,
    /// Weight of the semantic term, lexical gets `1 - semantic_weight`
    pub semantic_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: 60,
            semantic_weight: 0.5,
        }
    }
}

impl From<&SearchSettings> for FusionConfig {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            k: settings.rrf_k,
            semantic_weight: settings.semantic_weight,
        }
    }
}

impl FusionConfig {
    /// Contribution of one list for an item at 1-indexed `rank`.
    pub fn term(weight: f64, k: u32, rank: usize) -> f64 {
        weight / (f64::from(k) + rank as f64)
    }

    pub fn semantic_term(&self, rank: usize) -> f64 {
        Self::term(f64::from(self.semantic_weight), self.k, rank)
    }

    pub fn lexical_term(&self, rank: usize) -> f64 {
        Self::term(1.0 - f64::from(self.semantic_weight), self.k, rank)
    }
}

/// Fuse two ranked lists into one, truncated to `limit` and re-ranked 1..N.
///
/// See [`fuse_rankings`] for the ordering rules.
pub fn reciprocal_rank_fusion(
    semantic: &[SearchResultItem],
    lexical: &[SearchResultItem],
    config: &FusionConfig,
    limit: usize,
) -> Vec<SearchResultItem> {
    let mut results = fuse_rankings(semantic, lexical, config);
    results.truncate(limit);
    results
}

/// Fuse two ranked lists into their whole union, ranked 1..N.
///
/// Each input item's `rank` is its 1-indexed position in its own list. Ties
/// on the fused score are broken by ascending artifact id. The fused item
/// keeps the semantic similarity and prefers the lexical snippet.
pub fn fuse_rankings(
    semantic: &[SearchResultItem],
    lexical: &[SearchResultItem],
    config: &FusionConfig,
) -> Vec<SearchResultItem> {
    let mut fused: HashMap<ArtifactId, SearchResultItem> = HashMap::new();

    for item in semantic {
        let entry = fused
            .entry(item.artifact_id)
            .or_insert_with(|| SearchResultItem {
                artifact_id: item.artifact_id,
                score: 0.0,
                similarity: None,
                rank: 0,
                snippet: None,
                found_via: Vec::new(),
            });
        entry.score += config.semantic_term(item.rank);
        entry.similarity = item.similarity.or(Some(item.score));
        entry.snippet = entry.snippet.take().or_else(|| item.snippet.clone());
        entry.found_via.push(MatchSource::Semantic);
    }

    for item in lexical {
        let entry = fused
            .entry(item.artifact_id)
            .or_insert_with(|| SearchResultItem {
                artifact_id: item.artifact_id,
                score: 0.0,
                similarity: None,
                rank: 0,
                snippet: None,
                found_via: Vec::new(),
            });
        entry.score += config.lexical_term(item.rank);
        if item.snippet.is_some() {
            entry.snippet = item.snippet.clone();
        }
        entry.found_via.push(MatchSource::Lexical);
    }

    let mut results: Vec<SearchResultItem> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.artifact_id.cmp(&b.artifact_id))
    });
    for (index, item) in results.iter_mut().enumerate() {
        item.rank = index + 1;
    }
    results
}
