//! Static embedding model catalogs
//!
//! One catalog per provider, built on first use. The first entry of each
//! catalog is that provider's default model.

use mimir_config::EmbeddingProviderType;
use once_cell::sync::Lazy;

use crate::schema::EmbeddingModelInfo;

/// Width assumed for local models missing from the catalog.
pub const UNKNOWN_LOCAL_DIMENSIONS: usize = 768;

/// Token bound assumed for local models missing from the catalog.
pub const UNKNOWN_LOCAL_MAX_TOKENS: usize = 2048;

static VOYAGE_MODELS: Lazy<Vec<EmbeddingModelInfo>> = Lazy::new(|| {
    let voyage = |id: &str, name: &str, dims: usize, desc: &str| {
        EmbeddingModelInfo::new(id, "voyage", name, dims, 32_000, desc)
    };
    vec![
        voyage(
            "voyage-3",
            "Voyage 3",
            1024,
            "Optimized for latency and quality. Great general-purpose model.",
        ),
        voyage(
            "voyage-3-large",
            "Voyage 3 Large",
            1024,
            "Most powerful generalist embedding model. Best for RAG and search.",
        ),
        voyage(
            "voyage-3-lite",
            "Voyage 3 Lite",
            512,
            "Optimized for latency. Cost-effective option.",
        ),
        voyage(
            "voyage-code-3",
            "Voyage Code 3",
            1024,
            "Optimized for code retrieval.",
        ),
        voyage(
            "voyage-finance-2",
            "Voyage Finance 2",
            1024,
            "Optimized for financial documents and queries.",
        ),
        voyage(
            "voyage-law-2",
            "Voyage Law 2",
            1024,
            "Optimized for legal documents and queries.",
        ),
        voyage(
            "voyage-multilingual-2",
            "Voyage Multilingual 2",
            1024,
            "Optimized for multilingual content.",
        ),
    ]
});

static OPENAI_MODELS: Lazy<Vec<EmbeddingModelInfo>> = Lazy::new(|| {
    vec![
        EmbeddingModelInfo::new(
            "text-embedding-3-small",
            "openai",
            "OpenAI Text Embedding 3 Small",
            1536,
            8191,
            "Small third-generation embedding model.",
        ),
        EmbeddingModelInfo::new(
            "text-embedding-3-large",
            "openai",
            "OpenAI Text Embedding 3 Large",
            3072,
            8191,
            "Large third-generation embedding model. Truncated to the storage width.",
        ),
        EmbeddingModelInfo::new(
            "text-embedding-ada-002",
            "openai",
            "OpenAI Ada 002",
            1536,
            8191,
            "Second-generation embedding model.",
        ),
    ]
});

static OLLAMA_MODELS: Lazy<Vec<EmbeddingModelInfo>> = Lazy::new(|| {
    let local = |id: &str, dims: usize, max_tokens: usize, desc: &str| {
        EmbeddingModelInfo::new(id, "ollama", id, dims, max_tokens, desc)
    };
    vec![
        local(
            "nomic-embed-text",
            768,
            8192,
            "Nomic's text embedding model, good balance of quality and speed",
        ),
        local(
            "mxbai-embed-large",
            1024,
            512,
            "High quality embeddings, larger model",
        ),
        local(
            "snowflake-arctic-embed",
            1024,
            8192,
            "Snowflake's Arctic embedding model",
        ),
        local("all-minilm", 384, 256, "Fast, lightweight embedding model"),
        local("bge-large", 1024, 512, "BAAI General Embedding, large variant"),
        local("bge-base", 768, 512, "BAAI General Embedding, base variant"),
    ]
});

/// Static catalog for a provider.
pub fn catalog(provider: EmbeddingProviderType) -> &'static [EmbeddingModelInfo] {
    match provider {
        EmbeddingProviderType::Voyage => VOYAGE_MODELS.as_slice(),
        EmbeddingProviderType::Openai => OPENAI_MODELS.as_slice(),
        EmbeddingProviderType::Ollama => OLLAMA_MODELS.as_slice(),
    }
}

/// Look up a model id in a provider's catalog.
pub fn find(
    provider: EmbeddingProviderType,
    model_id: &str,
) -> Option<&'static EmbeddingModelInfo> {
    catalog(provider).iter().find(|m| m.model_id == model_id)
}

/// Strip an Ollama `:tag` suffix (`nomic-embed-text:latest` → `nomic-embed-text`).
pub fn base_model_name(model_id: &str) -> &str {
    model_id.split(':').next().unwrap_or(model_id)
}

/// Describe a local model, falling back to generic limits for unknown ones.
pub fn local_model_info(model_id: &str) -> EmbeddingModelInfo {
    match find(EmbeddingProviderType::Ollama, base_model_name(model_id)) {
        Some(known) => EmbeddingModelInfo {
            model_id: model_id.to_string(),
            ..known.clone()
        },
        None => EmbeddingModelInfo::new(
            model_id,
            "ollama",
            model_id,
            UNKNOWN_LOCAL_DIMENSIONS,
            UNKNOWN_LOCAL_MAX_TOKENS,
            format!("Ollama model: {}", model_id),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_model_ids_unique_across_catalogs() {
        let mut seen = HashSet::new();
        for provider in [
            EmbeddingProviderType::Voyage,
            EmbeddingProviderType::Openai,
            EmbeddingProviderType::Ollama,
        ] {
            for model in catalog(provider) {
                assert!(seen.insert(model.model_id.clone()), "{}", model.model_id);
                assert_eq!(model.provider, provider.as_str());
                assert!(model.dimensions > 0);
                assert!(model.max_tokens > 0);
            }
        }
    }

    #[test]
    fn test_default_models_first() {
        assert_eq!(catalog(EmbeddingProviderType::Voyage)[0].model_id, "voyage-3");
        assert_eq!(
            catalog(EmbeddingProviderType::Openai)[0].model_id,
            "text-embedding-3-small"
        );
        assert_eq!(
            catalog(EmbeddingProviderType::Ollama)[0].model_id,
            "nomic-embed-text"
        );
    }

    #[test]
    fn test_find() {
        let large = find(EmbeddingProviderType::Openai, "text-embedding-3-large").unwrap();
        assert_eq!(large.dimensions, 3072);
        assert!(find(EmbeddingProviderType::Openai, "voyage-3").is_none());
    }

    #[test]
    fn test_local_model_info_strips_tag() {
        let info = local_model_info("mxbai-embed-large:latest");
        assert_eq!(info.model_id, "mxbai-embed-large:latest");
        assert_eq!(info.dimensions, 1024);
        assert_eq!(info.max_tokens, 512);
    }

    #[test]
    fn test_local_model_info_unknown() {
        let info = local_model_info("e5-custom");
        assert_eq!(info.dimensions, UNKNOWN_LOCAL_DIMENSIONS);
        assert_eq!(info.max_tokens, UNKNOWN_LOCAL_MAX_TOKENS);
        assert_eq!(info.provider, "ollama");
    }
}
