//! Error types for mimir-search

use mimir_config::ConfigError;
use thiserror::Error;

/// Upstream response bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors that can occur in mimir-search operations
#[derive(Error, Debug)]
pub enum SearchError {
    // =========================================================================
    // Provider errors
    // =========================================================================
    /// Provider lacks credentials or is unreachable
    #[error("Embedding provider '{provider}' is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    /// Model id not served by any registered provider
    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),

    /// Provider backend answered with a non-success status
    #[error("{provider} API error ({status}): {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    /// Provider could not be reached (connect failure, timeout)
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider answered 200 with a body we could not use
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// No usable provider at all
    #[error("No embedding provider is configured")]
    NoProviderConfigured,

    /// Two providers claim the same model id
    #[error("Model '{model_id}' is already served by '{existing}', cannot register it for '{incoming}'")]
    DuplicateModel {
        model_id: String,
        existing: String,
        incoming: String,
    },

    // =========================================================================
    // Request / storage errors
    // =========================================================================
    /// Artifact has no text to embed
    #[error("Artifact {artifact_id} has no content to embed")]
    NoContent { artifact_id: i64 },

    /// Malformed search or embedding request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    pub fn not_configured(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Build an upstream error, keeping only the head of the response body.
    pub fn upstream(provider: impl Into<String>, status: u16, body: &str) -> Self {
        Self::Upstream {
            provider: provider.into(),
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }

    /// Whether a caller may reasonably retry the same call later.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::ProviderUnavailable(_) => true,
            _ => false,
        }
    }
}

/// Result type for mimir-search operations
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_truncates_body() {
        let body = "x".repeat(1000);
        match SearchError::upstream("voyage", 500, &body) {
            SearchError::Upstream { body, status, .. } => {
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
                assert_eq!(status, 500);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_upstream_truncation_respects_char_boundaries() {
        let body = "é".repeat(300);
        let err = SearchError::upstream("openai", 400, &body);
        if let SearchError::Upstream { body, .. } = err {
            assert_eq!(body.chars().count(), MAX_ERROR_BODY_CHARS);
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SearchError::upstream("voyage", 503, "").is_retryable());
        assert!(SearchError::upstream("voyage", 429, "").is_retryable());
        assert!(!SearchError::upstream("voyage", 401, "").is_retryable());
        assert!(SearchError::ProviderUnavailable("timeout".into()).is_retryable());
        assert!(!SearchError::NoProviderConfigured.is_retryable());
        assert!(!SearchError::UnknownModel("x".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SearchError::not_configured("openai", "OPENAI_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Embedding provider 'openai' is not configured: OPENAI_API_KEY is not set"
        );
        let err = SearchError::NoContent { artifact_id: 7 };
        assert!(err.to_string().contains('7'));
    }
}
