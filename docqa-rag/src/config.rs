//! Configuration for the question-answering session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::Metric;
use crate::error::{RagError, Result};

/// Index name used when the caller leaves the name blank.
pub const DEFAULT_INDEX_NAME: &str = "rag-doc";

/// Embedding dimension of `all-MiniLM-L6-v2`.
pub const DEFAULT_DIMENSION: usize = 384;

/// Largest `top_k` a caller may request.
pub const MAX_TOP_K: usize = 10;

/// Configuration parameters for a [`Session`](crate::Session).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Name of the vector index holding the document's passages.
    pub index_name: String,
    /// Dimension of every embedding vector.
    pub dimension: usize,
    /// Similarity metric the index is created with.
    pub metric: Metric,
    /// Number of passages retrieved when `ask` is not given an explicit value.
    pub top_k: usize,
    /// Capacity of the embedding memo.
    pub embedding_cache_capacity: usize,
    /// Capacity of the `(query, top_k)` retrieval memo.
    pub retrieval_cache_capacity: usize,
    /// Capacity of the `(query, context)` answer memo.
    pub answer_cache_capacity: usize,
    /// Delay between readiness polls of a freshly created index.
    pub poll_interval: Duration,
    /// Upper bound on the total readiness wait.
    pub ready_timeout: Duration,
    /// Completion length limit passed to the language model.
    pub max_tokens: u32,
    /// Sampling temperature passed to the language model.
    pub temperature: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            dimension: DEFAULT_DIMENSION,
            metric: Metric::Cosine,
            top_k: 3,
            embedding_cache_capacity: 1000,
            retrieval_cache_capacity: 100,
            answer_cache_capacity: 100,
            poll_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(60),
            max_tokens: 150,
            temperature: 0.7,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the index name. A blank name falls back to [`DEFAULT_INDEX_NAME`].
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.trim();
        self.config.index_name =
            if name.is_empty() { DEFAULT_INDEX_NAME.to_string() } else { name.to_string() };
        self
    }

    /// Set the embedding dimension.
    pub fn dimension(mut self, dimension: usize) -> Self {
        self.config.dimension = dimension;
        self
    }

    /// Set the similarity metric.
    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the default number of passages to retrieve.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the embedding memo capacity.
    pub fn embedding_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.embedding_cache_capacity = capacity;
        self
    }

    /// Set the retrieval memo capacity.
    pub fn retrieval_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.retrieval_cache_capacity = capacity;
        self
    }

    /// Set the answer memo capacity.
    pub fn answer_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.answer_cache_capacity = capacity;
        self
    }

    /// Set the delay between readiness polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the maximum readiness wait.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = timeout;
        self
    }

    /// Set the completion length limit.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if:
    /// - `top_k` is outside `1..=10`
    /// - `dimension == 0`
    /// - any cache capacity is zero
    /// - `poll_interval` is zero or longer than `ready_timeout`
    /// - `temperature` is outside `0.0..=2.0`
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        validate_top_k(config.top_k).map_err(|e| RagError::Configuration(e.to_string()))?;
        if config.dimension == 0 {
            return Err(RagError::Configuration("dimension must be greater than zero".into()));
        }
        for (name, capacity) in [
            ("embedding_cache_capacity", config.embedding_cache_capacity),
            ("retrieval_cache_capacity", config.retrieval_cache_capacity),
            ("answer_cache_capacity", config.answer_cache_capacity),
        ] {
            if capacity == 0 {
                return Err(RagError::Configuration(format!("{name} must be greater than zero")));
            }
        }
        if config.poll_interval.is_zero() || config.poll_interval > config.ready_timeout {
            return Err(RagError::Configuration(format!(
                "poll_interval ({:?}) must be non-zero and no longer than ready_timeout ({:?})",
                config.poll_interval, config.ready_timeout
            )));
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(RagError::Configuration(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                config.temperature
            )));
        }
        Ok(config)
    }
}

/// Check that `top_k` is within `1..=MAX_TOP_K`.
pub(crate) fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(RagError::InvalidInput(format!(
            "top_k ({top_k}) must be between 1 and {MAX_TOP_K}"
        )));
    }
    Ok(())
}

/// API secrets for the remote collaborators.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Key for the chat-completion endpoint.
    pub llm_api_key: String,
    /// Key for the vector database.
    pub vector_db_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"<redacted>")
            .field("vector_db_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Create credentials from the two secrets.
    pub fn new(llm_api_key: impl Into<String>, vector_db_api_key: impl Into<String>) -> Self {
        Self { llm_api_key: llm_api_key.into(), vector_db_api_key: vector_db_api_key.into() }
    }

    /// Read `GROQ_API_KEY` and `PINECONE_API_KEY` from the environment.
    ///
    /// Missing variables become empty strings; [`validate`](Self::validate)
    /// reports them.
    pub fn from_env() -> Self {
        Self {
            llm_api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
            vector_db_api_key: std::env::var("PINECONE_API_KEY").unwrap_or_default(),
        }
    }

    /// Reject blank secrets.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] naming the first blank secret.
    pub fn validate(&self) -> Result<()> {
        if self.llm_api_key.trim().is_empty() {
            return Err(RagError::Configuration("language model API key must not be empty".into()));
        }
        if self.vector_db_api_key.trim().is_empty() {
            return Err(RagError::Configuration(
                "vector database API key must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_settings() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.index_name, "rag-doc");
        assert_eq!(config.dimension, 384);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding_cache_capacity, 1000);
        assert_eq!(config.max_tokens, 150);
    }

    #[test]
    fn blank_index_name_falls_back_to_default() {
        let config = RagConfig::builder().index_name("   ").build().unwrap();
        assert_eq!(config.index_name, DEFAULT_INDEX_NAME);
        let config = RagConfig::builder().index_name(" papers ").build().unwrap();
        assert_eq!(config.index_name, "papers");
    }

    #[test]
    fn top_k_outside_slider_range_is_rejected() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().top_k(11).build().is_err());
        assert!(RagConfig::builder().top_k(10).build().is_ok());
    }

    #[test]
    fn poll_interval_longer_than_timeout_is_rejected() {
        let err = RagConfig::builder()
            .poll_interval(Duration::from_secs(5))
            .ready_timeout(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn blank_credentials_fail_validation() {
        assert!(Credentials::new("", "pc").validate().is_err());
        assert!(Credentials::new("gsk", "  ").validate().is_err());
        assert!(Credentials::new("gsk", "pc").validate().is_ok());
    }

    #[test]
    fn credentials_debug_output_hides_secrets() {
        let rendered = format!("{:?}", Credentials::new("gsk_secret", "pc_secret"));
        assert!(!rendered.contains("secret"));
    }
}
