//! Search service integration tests.
//!
//! Lexical, semantic and RRF hybrid search over the in-memory store with a
//! vocabulary-indexed fake provider, so similarity follows shared words.

mod common;

use std::sync::Arc;

use common::{vocabulary, Harness, VocabularyProvider, TENANT};
use mimir_search::{
    FusionConfig, MatchSource, SearchError, SearchFilters, SearchRequest, SearchType,
    SemanticQuery,
};
use pretty_assertions::assert_eq;

fn fox_corpus() -> Harness {
    let harness = Harness::single(vocabulary("vocab-1024", 1024));
    harness.add(1, "the quick brown fox");
    harness.add(2, "lazy dogs sleep all day");
    harness.add(3, "a brown bear in the woods");
    harness
}

#[tokio::test]
async fn test_fox_scenario() {
    let harness = fox_corpus();
    harness.embed_all(&[1, 2, 3]).await;
    let filters = SearchFilters::default();

    let lexical = harness
        .search
        .lexical_search(TENANT, "fox", &filters, 10, 0)
        .await
        .unwrap();
    assert_eq!(lexical[0].artifact_id, 1);
    assert_eq!(lexical[0].rank, 1);

    let semantic = harness
        .search
        .semantic_search(
            TENANT,
            SemanticQuery::Text("quick brown fox"),
            &filters,
            10,
            None,
            0.0,
        )
        .await
        .unwrap();
    assert_eq!(semantic[0].artifact_id, 1);
    assert_eq!(semantic[0].rank, 1);

    let hybrid = harness
        .search
        .hybrid_search(
            TENANT,
            "fox",
            &filters,
            10,
            None,
            &FusionConfig {
                k: 60,
                semantic_weight: 0.5,
            },
        )
        .await
        .unwrap();

    let top = &hybrid[0];
    assert_eq!(top.artifact_id, 1);
    assert!((top.score - 1.0 / 61.0).abs() < 1e-9);
    assert!(hybrid.iter().skip(1).all(|item| item.score < top.score));
    assert_eq!(
        top.found_via,
        vec![MatchSource::Semantic, MatchSource::Lexical]
    );
}

#[tokio::test]
async fn test_find_similar_never_returns_source() {
    let harness = fox_corpus();
    harness.add(4, "the quick brown fox");
    harness.embed_all(&[1, 2, 3, 4]).await;

    let items = harness
        .search
        .find_similar(TENANT, 1, 10, 0.0, &SearchFilters::default(), None)
        .await
        .unwrap();

    assert!(items.iter().all(|item| item.artifact_id != 1));
    assert_eq!(items[0].artifact_id, 4);
    assert!((items[0].similarity.unwrap() - 1.0).abs() < 1e-6);
    let ranks: Vec<usize> = items.iter().map(|i| i.rank).collect();
    assert_eq!(ranks, (1..=items.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_find_similar_without_embedding_is_empty() {
    let harness = fox_corpus();
    let items = harness
        .search
        .find_similar(TENANT, 1, 10, 0.0, &SearchFilters::default(), None)
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_hybrid_degrades_to_lexical_without_embeddings() {
    let harness = fox_corpus();
    harness.add(4, "fox fox fox");

    let lexical = harness
        .search
        .lexical_search(TENANT, "fox", &SearchFilters::default(), 10, 0)
        .await
        .unwrap();

    let request = SearchRequest::new("fox", SearchType::Hybrid);
    let response = harness.search.search(TENANT, &request).await.unwrap();

    let lexical_ids: Vec<i64> = lexical.iter().map(|i| i.artifact_id).collect();
    let hybrid_ids: Vec<i64> = response.items.iter().map(|i| i.artifact_id).collect();
    assert_eq!(hybrid_ids, lexical_ids);
    assert!(response
        .items
        .iter()
        .all(|i| i.found_via == vec![MatchSource::Lexical]));
    assert!((response.items[0].score - 0.5 / 61.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_semantic_weight_one_follows_semantic_order() {
    let harness = fox_corpus();
    harness.embed_all(&[1, 2, 3]).await;

    let mut request = SearchRequest::new("brown bear", SearchType::Hybrid);
    request.semantic_weight = Some(1.0);
    let response = harness.search.search(TENANT, &request).await.unwrap();

    assert_eq!(response.items[0].artifact_id, 3);
    assert!(response
        .items
        .iter()
        .all(|i| i.found_via.contains(&MatchSource::Semantic)));
}

#[tokio::test]
async fn test_lexical_paging_and_total() {
    let harness = Harness::single(vocabulary("vocab", 64));
    harness.add(1, "fox");
    harness.add(2, "fox fox den");
    harness.add(3, "a fox in the den");
    harness.add(4, "no match here");

    let full = SearchRequest::new("fox", SearchType::Lexical);
    let full = harness.search.search(TENANT, &full).await.unwrap();
    assert_eq!(full.total, 3);

    let mut paged = SearchRequest::new("fox", SearchType::Lexical).with_limit(1);
    paged.offset = 1;
    let paged = harness.search.search(TENANT, &paged).await.unwrap();

    assert_eq!(paged.total, 3);
    assert_eq!(paged.offset, 1);
    assert_eq!(paged.items.len(), 1);
    assert_eq!(paged.items[0].artifact_id, full.items[1].artifact_id);
}

#[tokio::test]
async fn test_filters_restrict_every_strategy() {
    let harness = fox_corpus();
    harness
        .store
        .insert_artifact(TENANT, 9, "note", "n", "the quick brown fox");
    harness.embed_all(&[1, 2, 3, 9]).await;

    let mut request = SearchRequest::new("fox", SearchType::Hybrid);
    request.filters = SearchFilters::with_types(["note"]);
    let response = harness.search.search(TENANT, &request).await.unwrap();

    let ids: Vec<i64> = response.items.iter().map(|i| i.artifact_id).collect();
    assert_eq!(ids, vec![9]);
}

#[tokio::test]
async fn test_invalid_requests() {
    let harness = fox_corpus();

    let mut request = SearchRequest::new("", SearchType::Lexical);
    let err = harness.search.search(TENANT, &request).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));

    request = SearchRequest::new("fox", SearchType::Hybrid).with_limit(1000);
    let err = harness.search.search(TENANT, &request).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));

    request = SearchRequest::new("fox", SearchType::Hybrid);
    request.semantic_weight = Some(-0.5);
    let err = harness.search.search(TENANT, &request).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_unknown_model_fails_semantic_search() {
    let harness = fox_corpus();
    let request = SearchRequest::new("fox", SearchType::Semantic).with_model("nope");
    let err = harness.search.search(TENANT, &request).await.unwrap_err();
    assert!(matches!(err, SearchError::UnknownModel(_)));
}

#[tokio::test]
async fn test_hybrid_without_provider_is_an_error() {
    let provider = Arc::new(VocabularyProvider::new("vocab", "vocab", 64).unconfigured());
    let harness = Harness::single(provider);
    harness.add(1, "fox");

    let request = SearchRequest::new("fox", SearchType::Hybrid);
    let err = harness.search.search(TENANT, &request).await.unwrap_err();
    assert!(matches!(err, SearchError::NoProviderConfigured));

    // Lexical search needs no provider
    let request = SearchRequest::new("fox", SearchType::Lexical);
    let response = harness.search.search(TENANT, &request).await.unwrap();
    assert_eq!(response.total, 1);
}

/// Store extra chunks of an artifact from the given texts, chunk 1 onwards.
async fn add_chunks(harness: &Harness, artifact_id: i64, texts: &[&str]) {
    for (index, text) in texts.iter().enumerate() {
        harness
            .embeddings
            .embed_artifact(TENANT, artifact_id, None, Some(text), index as u32 + 1)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_chunked_artifacts_fill_semantic_limit() {
    let harness = Harness::single(vocabulary("vocab", 64));
    harness.add(1, "fox one");
    harness.add(2, "fox den");
    harness.add(3, "fox hole");
    harness.embed_all(&[1, 2, 3]).await;
    add_chunks(&harness, 1, &["fox two", "fox three", "fox four"]).await;

    let items = harness
        .search
        .semantic_search(
            TENANT,
            SemanticQuery::Text("fox"),
            &SearchFilters::default(),
            2,
            None,
            0.0,
        )
        .await
        .unwrap();

    let ids: Vec<i64> = items.iter().map(|i| i.artifact_id).collect();
    assert_eq!(ids, vec![1, 2]);

    let request = SearchRequest::new("fox", SearchType::Hybrid).with_limit(3);
    let response = harness.search.search(TENANT, &request).await.unwrap();
    let mut ids: Vec<i64> = response.items.iter().map(|i| i.artifact_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_find_similar_skips_every_source_chunk() {
    let harness = Harness::single(vocabulary("vocab", 64));
    harness.add(1, "alpha beta");
    harness.add(2, "alpha delta");
    harness.embed_all(&[1, 2]).await;
    add_chunks(&harness, 1, &["alpha beta", "alpha beta", "alpha beta"]).await;

    let items = harness
        .search
        .find_similar(TENANT, 1, 1, 0.0, &SearchFilters::default(), None)
        .await
        .unwrap();

    let ids: Vec<i64> = items.iter().map(|i| i.artifact_id).collect();
    assert_eq!(ids, vec![2]);
}

#[tokio::test]
async fn test_find_similar_seeds_from_first_chunk() {
    let harness = Harness::single(vocabulary("vocab", 64));
    harness.add(1, "red apple");
    harness.add(2, "red apple");
    harness.add(3, "blue ocean");
    harness.embed_all(&[1, 2, 3]).await;
    add_chunks(&harness, 1, &["blue ocean"]).await;

    let items = harness
        .search
        .find_similar(TENANT, 1, 10, 0.0, &SearchFilters::default(), None)
        .await
        .unwrap();

    assert_eq!(items[0].artifact_id, 2);
    assert!((items[0].similarity.unwrap() - 1.0).abs() < 1e-6);
    let ocean = items.iter().find(|i| i.artifact_id == 3).unwrap();
    assert!(ocean.similarity.unwrap().abs() < 1e-6);
}
