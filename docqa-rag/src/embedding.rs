//! Embedding provider trait and the memoizing embedder used by the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheStats, LruCache};
use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. Embedding must be deterministic for a fixed model: the same text
/// always yields the same vector. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// An [`EmbeddingProvider`] decorator that memoizes the most recently used
/// distinct inputs.
///
/// Every vector coming back from the wrapped provider is checked against the
/// provider's reported dimension before it is cached. Cache contents are an
/// optimization only and never outlive the embedder.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    /// Wrap `inner` with a memo holding up to `capacity` inputs.
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let dimension = inner.dimensions();
        Self { inner, dimension, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Hit/miss counters of the memo.
    pub async fn stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    /// Forget every memoized embedding.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Embedding {
                provider: "cache".into(),
                message: format!(
                    "provider returned {} dimensions, expected {}",
                    vector.len(),
                    self.dimension
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().await.get(text) {
            debug!(text_len = text.len(), "embedding cache hit");
            return Ok(hit);
        }

        let vector = self.inner.embed(text).await?;
        self.check_dimension(&vector)?;
        self.cache.lock().await.put(text.to_string(), vector.clone());
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<&str> = Vec::new();
        {
            let mut cache = self.cache.lock().await;
            for text in texts {
                let hit = cache.get(*text);
                if hit.is_none() && !missing.contains(text) {
                    missing.push(*text);
                }
                results.push(hit);
            }
        }

        if !missing.is_empty() {
            debug!(batch_size = texts.len(), missing = missing.len(), "embedding batch");
            let fresh = self.inner.embed_batch(&missing).await?;
            if fresh.len() != missing.len() {
                return Err(RagError::Embedding {
                    provider: "cache".into(),
                    message: format!(
                        "provider returned {} embeddings for {} inputs",
                        fresh.len(),
                        missing.len()
                    ),
                });
            }
            for vector in &fresh {
                self.check_dimension(vector)?;
            }

            let fresh: HashMap<&str, Vec<f32>> = missing.into_iter().zip(fresh).collect();
            let mut cache = self.cache.lock().await;
            for (text, vector) in &fresh {
                cache.put((*text).to_string(), vector.clone());
            }
            for (slot, text) in results.iter_mut().zip(texts) {
                if slot.is_none() {
                    *slot = fresh.get(text).cloned();
                }
            }
        }

        results.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| RagError::Embedding {
            provider: "cache".into(),
            message: "missing embedding for batch input".into(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }
}
