/// Ollama HTTP client implementation.
///
/// This module provides `OllamaClient` for making asynchronous HTTP requests to the
/// Ollama API, along with error types and builder patterns for configuration. The
/// client implements both [`QueryVectorizer`] and [`ResponseGenerator`].
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::collaborators::{EmbeddingError, GenerationError, QueryVectorizer, ResponseGenerator};
use crate::composer::RenderedPrompt;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when interacting with the Ollama API.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Ollama API-specific errors
    #[error("Ollama API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl OllamaError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Network(error)
        }
    }
}

impl From<OllamaError> for EmbeddingError {
    fn from(error: OllamaError) -> Self {
        match error {
            OllamaError::Timeout(_) => EmbeddingError::Timeout(REQUEST_TIMEOUT),
            OllamaError::Http { status, .. } if (400..500).contains(&status) && status != 429 => {
                EmbeddingError::InvalidInput(format!("Ollama rejected the request (status {status})"))
            }
            other => EmbeddingError::Service(other.to_string()),
        }
    }
}

impl From<OllamaError> for GenerationError {
    fn from(error: OllamaError) -> Self {
        match error {
            OllamaError::Timeout(_) => GenerationError::Timeout(REQUEST_TIMEOUT),
            OllamaError::Http {
                status: 429,
                retry_after,
            } => GenerationError::RateLimited { retry_after },
            other => GenerationError::Other(other.to_string()),
        }
    }
}

/// Backoff settings for transient failures.
///
/// Network errors, client-side timeouts and HTTP 5xx responses are retried;
/// everything else (including HTTP 429) is returned at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

/// Builder for constructing `OllamaClient` instances.
///
/// # Examples
///
/// ```
/// use ragline::ollama::OllamaClientBuilder;
///
/// let client = OllamaClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .model("llama3.2")
///     .build()
///     .expect("Failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
    embed_model: Option<String>,
    retry: Option<RetryPolicy>,
}

impl OllamaClientBuilder {
    /// Creates a new `OllamaClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for the Ollama API.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the generation model (e.g., "llama3.2" or "gemma3:4b").
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the embedding model (e.g., "nomic-embed-text").
    pub fn embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = Some(model.into());
        self
    }

    /// Sets the retry policy for transient failures.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Builds the `OllamaClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// If `base_url()` was not called, `OLLAMA_HOST` is used, falling back to
    /// `http://localhost:11434`.
    ///
    /// If `model()` was not called, `OLLAMA_MODEL` is used, falling back to an
    /// empty string. If `embed_model()` was not called, `OLLAMA_EMBED_MODEL` is
    /// used, falling back to `nomic-embed-text`.
    pub fn build(self) -> Result<OllamaClient, OllamaError> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        let base_url = base_url.trim_end_matches('/').to_string();

        let model = match self.model {
            Some(m) => m,
            None => std::env::var("OLLAMA_MODEL").unwrap_or_default(),
        };

        let embed_model = match self.embed_model {
            Some(m) => m,
            None => std::env::var("OLLAMA_EMBED_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string()),
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| OllamaError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(OllamaError::Network)?;

        Ok(OllamaClient {
            client,
            base_url,
            model,
            embed_model,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

/// Asynchronous HTTP client for the Ollama API.
///
/// It should be constructed using `OllamaClientBuilder`.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the generation model configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the embedding model configured for this client.
    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    /// Embeds `text` with the configured embedding model via `/api/embed`.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, OllamaError> {
        let url = format!("{}/api/embed", self.base_url);
        let request_body = serde_json::json!({
            "model": self.embed_model,
            "input": text,
        });

        let json = retry_with_backoff(self.retry, || self.post_json(&url, &request_body)).await?;

        json.get("embeddings")
            .and_then(|v| v.as_array())
            .and_then(|embeddings| embeddings.first())
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .map(|v| v as f32)
                    .collect::<Vec<f32>>()
            })
            .filter(|vector| !vector.is_empty())
            .ok_or_else(|| OllamaError::Api {
                message: "Missing 'embeddings' field in API response".to_string(),
            })
    }

    /// Generates text with the configured model via `/api/generate`.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.0 },
        });

        let json = retry_with_backoff(self.retry, || self.post_json(&url, &request_body)).await?;

        // Extract the "response" field from Ollama API response
        json.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| OllamaError::Api {
                message: "Missing 'response' field in API response".to_string(),
            })
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, OllamaError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(OllamaError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(OllamaError::Http {
                status: status.as_u16(),
                retry_after,
            });
        }

        response.json().await.map_err(OllamaError::from_reqwest)
    }
}

#[async_trait]
impl QueryVectorizer for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        Ok(self.embed_text(text).await?)
    }
}

#[async_trait]
impl ResponseGenerator for OllamaClient {
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String, GenerationError> {
        Ok(self.generate_text(prompt.as_str()).await?)
    }
}

/// Retries an async operation with exponential backoff.
///
/// The operation runs once, then up to `policy.max_retries` more times with
/// delays of `base_delay`, `2 * base_delay`, `4 * base_delay`, ... It only
/// retries transient errors (see [`should_retry`]).
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T, OllamaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OllamaError>>,
{
    let mut delay = policy.base_delay;
    let mut retries = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if retries < policy.max_retries && should_retry(&e) => {
                retries += 1;
                warn!(error = %e, retry = retries, delay_ms = delay.as_millis() as u64, "retrying Ollama request");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                debug!(error = %e, retries, "Ollama request failed");
                return Err(e);
            }
        }
    }
}

/// Determines if an error should be retried.
///
/// Returns `true` for transient errors (HTTP 5xx, network errors, timeouts).
/// Returns `false` for client errors (HTTP 4xx, including 429) and other
/// non-retryable errors.
fn should_retry(error: &OllamaError) -> bool {
    match error {
        OllamaError::Network(_) => true,
        OllamaError::Timeout(_) => true,
        OllamaError::Http { status, .. } => (500..600).contains(status),
        OllamaError::Api { .. } => false,
        OllamaError::InvalidUrl(_) => false,
    }
}
