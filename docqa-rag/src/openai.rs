//! Embedding provider for OpenAI-compatible `/v1/embeddings` endpoints.
//!
//! The default settings target a local text-embeddings server hosting
//! `sentence-transformers/all-MiniLM-L6-v2` (384 dimensions), which speaks the
//! same wire format as the OpenAI embeddings API.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default embeddings endpoint.
pub const DEFAULT_EMBEDDINGS_URL: &str = "http://localhost:8080/v1/embeddings";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// The dimensionality of `all-MiniLM-L6-v2`.
const DEFAULT_DIMENSIONS: usize = 384;

/// Inputs per request. text-embeddings-inference refuses larger batches
/// unless started with a higher `--max-client-batch-size`.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// Uses `reqwest` to call the endpoint directly.
///
/// # Configuration
///
/// - `url` – defaults to [`DEFAULT_EMBEDDINGS_URL`].
/// - `model` – defaults to [`DEFAULT_EMBEDDING_MODEL`].
/// - `dimensions` – defaults to 384; every response is checked against it by
///   [`CachedEmbedder`](crate::CachedEmbedder).
/// - `api_key` – optional bearer token.
/// - `batch_size` – inputs per request, defaults to
///   [`DEFAULT_EMBEDDING_BATCH_SIZE`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::HttpEmbeddingProvider;
///
/// let provider = HttpEmbeddingProvider::new().with_url("http://embeddings:80/v1/embeddings");
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl Default for HttpEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpEmbeddingProvider {
    /// Create a provider with the default endpoint, model and dimensions.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: DEFAULT_EMBEDDINGS_URL.into(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    /// Set the endpoint URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Send `api_key` as a bearer token. Blank keys are ignored.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = if api_key.trim().is_empty() { None } else { Some(api_key) };
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected output dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// Set how many inputs go into one request. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn provider_error(message: String) -> RagError {
        RagError::Embedding { provider: "http".into(), message }
    }

    /// Embed one request's worth of texts.
    async fn embed_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };
        let mut request = self.client.post(&self.url).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = "http", error = %e, "request failed");
            Self::provider_error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = "http", %status, "API error");
            return Err(Self::provider_error(format!(
                "API returned {status}: {}",
                error_detail(body)
            )));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "http", error = %e, "failed to parse response");
            Self::provider_error(format!("failed to parse response: {e}"))
        })?;
        in_input_order(embedding_response.data, texts.len())
    }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull the error message out of an OpenAI-style error body, falling back to
/// the raw body.
pub(crate) fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// Check one response covers every input and put it back in input order.
fn in_input_order(mut data: Vec<EmbeddingData>, inputs: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != inputs {
        return Err(HttpEmbeddingProvider::provider_error(format!(
            "API returned {} embeddings for {inputs} inputs",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "http", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::provider_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "http",
            inputs = texts.len(),
            batch_size = self.batch_size,
            model = %self.model,
            "embedding batch"
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_request(batch).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
