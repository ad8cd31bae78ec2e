/// Pinecone query client implementation.
///
/// `PineconeRetriever` sends the query vector to an index's `/query` endpoint
/// and turns the returned matches into [`RetrievedChunk`]s. It performs no
/// similarity computation of its own.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::collaborators::{ChunkRetriever, RetrievalError};
use crate::models::{ChunkMetadata, DocumentId, RetrievedChunk};

const API_VERSION: &str = "2024-07";
const DEFAULT_CONTENT_FIELD: &str = "content";
const DEFAULT_SOURCE_FIELD: &str = "article_id";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when querying a Pinecone index.
#[derive(Debug, Error)]
pub enum PineconeError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code and the response body
    #[error("HTTP error: status {status}: {body}")]
    Http { status: u16, body: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required setting was neither given to the builder nor set in the environment
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
}

impl PineconeError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Network(error)
        }
    }
}

impl From<PineconeError> for RetrievalError {
    fn from(error: PineconeError) -> Self {
        match error {
            PineconeError::Timeout(_) => RetrievalError::Timeout(REQUEST_TIMEOUT),
            other => RetrievalError::Service(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Builder for constructing `PineconeRetriever` instances.
///
/// # Examples
///
/// ```
/// use ragline::pinecone::PineconeRetrieverBuilder;
///
/// let retriever = PineconeRetrieverBuilder::new()
///     .index_host("crm-articles-rag-abc123.svc.pinecone.io")
///     .api_key("pc-key")
///     .build()
///     .expect("Failed to create retriever");
/// ```
#[derive(Debug, Default)]
pub struct PineconeRetrieverBuilder {
    index_host: Option<String>,
    api_key: Option<String>,
    namespace: Option<String>,
    content_field: Option<String>,
    source_field: Option<String>,
}

impl PineconeRetrieverBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the index host, with or without scheme.
    pub fn index_host(mut self, host: impl Into<String>) -> Self {
        self.index_host = Some(host.into());
        self
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Restricts queries to one namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the metadata field holding chunk text. Defaults to `content`.
    pub fn content_field(mut self, field: impl Into<String>) -> Self {
        self.content_field = Some(field.into());
        self
    }

    /// Sets the metadata field holding the source document id. Defaults to
    /// `article_id`; matches without it use their own id.
    pub fn source_field(mut self, field: impl Into<String>) -> Self {
        self.source_field = Some(field.into());
        self
    }

    /// Builds the `PineconeRetriever`.
    ///
    /// # Environment Variables
    ///
    /// Unset builder values fall back to `PINECONE_INDEX_HOST`,
    /// `PINECONE_API_KEY` and `PINECONE_NAMESPACE`. Host and API key are
    /// required.
    pub fn build(self) -> Result<PineconeRetriever, PineconeError> {
        let host = self
            .index_host
            .or_else(|| std::env::var("PINECONE_INDEX_HOST").ok())
            .filter(|h| !h.trim().is_empty())
            .ok_or(PineconeError::MissingSetting("PINECONE_INDEX_HOST"))?;
        let api_key = self
            .api_key
            .or_else(|| std::env::var("PINECONE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(PineconeError::MissingSetting("PINECONE_API_KEY"))?;
        let namespace = self
            .namespace
            .or_else(|| std::env::var("PINECONE_NAMESPACE").ok())
            .filter(|n| !n.is_empty());

        let host = host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        reqwest::Url::parse(&base_url)
            .map_err(|e| PineconeError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(PineconeError::Network)?;

        Ok(PineconeRetriever {
            client,
            query_url: format!("{base_url}/query"),
            api_key,
            namespace,
            content_field: self
                .content_field
                .unwrap_or_else(|| DEFAULT_CONTENT_FIELD.to_string()),
            source_field: self
                .source_field
                .unwrap_or_else(|| DEFAULT_SOURCE_FIELD.to_string()),
        })
    }
}

/// Chunk retriever backed by a Pinecone index.
pub struct PineconeRetriever {
    client: reqwest::Client,
    query_url: String,
    api_key: String,
    namespace: Option<String>,
    content_field: String,
    source_field: String,
}

impl PineconeRetriever {
    /// Returns the query endpoint URL.
    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    /// Returns the namespace queries are restricted to, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Queries the index and returns matches as chunks, most relevant first.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, PineconeError> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };

        let response = self
            .client
            .post(&self.query_url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(PineconeError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PineconeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = response.json().await.map_err(PineconeError::from_reqwest)?;
        let returned = parsed.matches.len();

        let mut chunks: Vec<RetrievedChunk> = parsed
            .matches
            .into_iter()
            .filter_map(|m| self.to_chunk(m))
            .collect();
        chunks.sort_by(|a, b| b.score().total_cmp(&a.score()));
        chunks.truncate(top_k);

        debug!(returned, kept = chunks.len(), "pinecone query finished");
        Ok(chunks)
    }

    fn to_chunk(&self, found: QueryMatch) -> Option<RetrievedChunk> {
        let mut metadata = found.metadata;

        let content = match metadata.remove(&self.content_field) {
            Some(serde_json::Value::String(text)) if !text.trim().is_empty() => text,
            _ => {
                warn!(chunk = %found.id, field = %self.content_field, "match has no text content, skipping");
                return None;
            }
        };

        let source = match metadata.get(&self.source_field) {
            Some(serde_json::Value::String(id)) => DocumentId::new(id.as_str()),
            Some(serde_json::Value::Number(id)) => DocumentId::new(id.to_string()),
            _ => DocumentId::new(found.id.as_str()),
        };

        let metadata: ChunkMetadata = metadata.into_iter().collect();
        Some(RetrievedChunk::new(found.id, source, content, found.score).with_metadata(metadata))
    }
}

#[async_trait]
impl ChunkRetriever for PineconeRetriever {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(self.query(vector, top_k).await?)
    }
}
