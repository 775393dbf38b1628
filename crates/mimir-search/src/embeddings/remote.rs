//! Shared client for OpenAI-compatible cloud embedding APIs
//!
//! # Endpoint Format
//!
//! - POST `{base_url}/embeddings`
//! - Request: `{"model": "...", "input": "text"}` or `{"model": "...", "input": ["a", "b"]}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}, ...], "usage": {"total_tokens": N}}`
//!
//! Batch responses are not guaranteed to preserve request order; results are
//! sorted by `index` before they are returned.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "rate-limit")]
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
#[cfg(feature = "rate-limit")]
use std::num::NonZeroU32;
#[cfg(feature = "rate-limit")]
use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::schema::EmbeddingResult;

/// Default requests per second limit
#[cfg(feature = "rate-limit")]
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

#[cfg(feature = "rate-limit")]
type RemoteRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Connection settings for one cloud provider.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://api.voyageai.com/v1`
    pub base_url: String,
    /// Bearer token; `None` means the provider is not configured
    pub api_key: Option<String>,
    /// Human name of the credential, used in error messages
    pub api_key_env: String,
    pub timeout: Duration,
    pub batch_timeout: Duration,
    /// Requests per second limit (when rate-limit feature enabled)
    #[cfg(feature = "rate-limit")]
    pub requests_per_second: u32,
}

impl RemoteConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            api_key_env: api_key_env.into(),
            timeout: Duration::from_secs(60),
            batch_timeout: Duration::from_secs(120),
            #[cfg(feature = "rate-limit")]
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    /// Set single and batch request timeouts
    pub fn with_timeouts(mut self, timeout_secs: u64, batch_timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self.batch_timeout = Duration::from_secs(batch_timeout_secs);
        self
    }

    /// Set requests per second limit (when rate-limit feature enabled)
    #[cfg(feature = "rate-limit")]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: EmbeddingInput<'a>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Usage,
}

/// HTTP client speaking the OpenAI-compatible embeddings protocol.
pub struct RemoteEmbeddingClient {
    provider: &'static str,
    client: Client,
    config: RemoteConfig,
    #[cfg(feature = "rate-limit")]
    rate_limiter: Arc<RemoteRateLimiter>,
}

impl RemoteEmbeddingClient {
    pub fn new(provider: &'static str, config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;

        #[cfg(feature = "rate-limit")]
        let rate_limiter = {
            let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
            Arc::new(RateLimiter::direct(Quota::per_second(rps)))
        };

        Ok(Self {
            provider,
            client,
            config,
            #[cfg(feature = "rate-limit")]
            rate_limiter,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Fail with `NotConfigured` when no credential is present
    pub fn ensure_configured(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    fn api_key(&self) -> Result<&str> {
        self.config.api_key.as_deref().ok_or_else(|| {
            SearchError::not_configured(
                self.provider,
                format!("{} is not set", self.config.api_key_env),
            )
        })
    }

    /// Wait for rate limiter permission (when feature enabled)
    #[cfg(feature = "rate-limit")]
    async fn wait_for_permit(&self) {
        self.rate_limiter.until_ready().await;
    }

    /// No-op when rate limiting is disabled
    #[cfg(not(feature = "rate-limit"))]
    async fn wait_for_permit(&self) {}

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str, model_id: &str) -> Result<EmbeddingResult> {
        let response = self
            .send(EmbeddingInput::Single(text), model_id, self.config.timeout)
            .await?;
        let tokens = response.usage.total_tokens;
        let data = response.data.into_iter().next().ok_or_else(|| {
            SearchError::InvalidResponse(format!("{} returned no embedding", self.provider))
        })?;

        Ok(EmbeddingResult::new(data.embedding, model_id, tokens))
    }

    /// Embed many texts in one request, returned in input order.
    pub async fn embed_many(
        &self,
        texts: &[String],
        model_id: &str,
    ) -> Result<Vec<EmbeddingResult>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .send(EmbeddingInput::Batch(texts), model_id, self.config.batch_timeout)
            .await?;

        if response.data.len() != texts.len() {
            return Err(SearchError::InvalidResponse(format!(
                "{} returned {} embeddings for {} inputs",
                self.provider,
                response.data.len(),
                texts.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        if data.iter().enumerate().any(|(i, d)| d.index != i) {
            return Err(SearchError::InvalidResponse(format!(
                "{} returned non-contiguous batch indices",
                self.provider
            )));
        }

        let per_item = response
            .usage
            .total_tokens
            .map(|total| total / texts.len() as u32);

        Ok(data
            .into_iter()
            .map(|d| EmbeddingResult::new(d.embedding, model_id, per_item))
            .collect())
    }

    async fn send(
        &self,
        input: EmbeddingInput<'_>,
        model_id: &str,
        timeout: Duration,
    ) -> Result<EmbeddingsResponse> {
        let api_key = self.api_key()?;
        self.wait_for_permit().await;

        let body = EmbeddingsRequest {
            input,
            model: model_id,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::ProviderUnavailable(format!(
                        "{} request timed out after {:?}",
                        self.provider, timeout
                    ))
                } else if e.is_connect() {
                    SearchError::ProviderUnavailable(format!(
                        "{} connection failed: {}",
                        self.provider, e
                    ))
                } else {
                    SearchError::ProviderUnavailable(format!(
                        "{} request failed: {}",
                        self.provider, e
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::upstream(self.provider, status.as_u16(), &body));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            SearchError::InvalidResponse(format!("{} response: {}", self.provider, e))
        })?;

        debug!(
            provider = self.provider,
            model = model_id,
            count = parsed.data.len(),
            total_tokens = ?parsed.usage.total_tokens,
            "Received embeddings"
        );

        Ok(parsed)
    }
}

impl std::fmt::Debug for RemoteEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbeddingClient")
            .field("provider", &self.provider)
            .field("base_url", &self.config.base_url)
            .field("has_api_key", &self.config.api_key.is_some())
            .field("timeout", &self.config.timeout)
            .field("batch_timeout", &self.config.batch_timeout)
            .finish()
    }
}
