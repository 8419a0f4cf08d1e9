//! Query-side retrieval: embed the question, search the index, memoize.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::cache::{CacheStats, LruCache};
use crate::document::RetrievalMatch;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::VectorIndex;

/// Embeds a query and returns the nearest passages from a [`VectorIndex`].
///
/// Results are memoized by `(query, top_k)`. Upserts into the index do not
/// invalidate the memo, so a cached answer may predate the latest ingest;
/// call [`invalidate`](Self::invalidate) to drop it.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    cache: Mutex<LruCache<(String, usize), Vec<RetrievalMatch>>>,
}

impl Retriever {
    /// Create a retriever memoizing up to `capacity` queries.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        capacity: usize,
    ) -> Self {
        Self { embedder, index, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Return at most `top_k` matches for `query`, best first.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and index errors
    /// ([`IndexNotReady`](crate::RagError::IndexNotReady) included) unchanged.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalMatch>> {
        let key = (query.to_string(), top_k);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(top_k, "retrieval cache hit");
            return Ok(hit);
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during retrieval");
            e
        })?;
        let matches = self.index.query(&embedding, top_k).await.map_err(|e| {
            error!(index = self.index.name(), error = %e, "vector index query failed");
            e
        })?;

        info!(top_k, match_count = matches.len(), "retrieved passages");
        self.cache.lock().await.put(key, matches.clone());
        Ok(matches)
    }

    /// Drop every memoized result.
    pub async fn invalidate(&self) {
        self.cache.lock().await.clear();
        debug!("retrieval cache cleared");
    }

    /// Hit/miss counters of the memo.
    pub async fn stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::document::{IndexedRecord, Metric, RecordMetadata};
    use crate::error::RagError;
    use crate::inmemory::InMemoryVectorDatabase;

    struct AxisEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if text.contains("left") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    async fn ready_index() -> Arc<VectorIndex> {
        let index = VectorIndex::new(Arc::new(InMemoryVectorDatabase::new()), "docs");
        index.ensure_index(2, Metric::Cosine).await.unwrap();
        index
            .upsert(&[
                IndexedRecord {
                    id: "0".into(),
                    vector: vec![1.0, 0.0],
                    metadata: RecordMetadata { text: "left".into() },
                },
                IndexedRecord {
                    id: "1".into(),
                    vector: vec![0.0, 1.0],
                    metadata: RecordMetadata { text: "up".into() },
                },
            ])
            .await
            .unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn returns_best_match_first() {
        let embedder = Arc::new(AxisEmbedder { calls: AtomicUsize::new(0) });
        let retriever = Retriever::new(embedder, ready_index().await, 10);

        let matches = retriever.retrieve("go left", 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].text(), "left");
        assert!(matches[0].score >= matches[1].score);
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache_until_invalidated() {
        let embedder = Arc::new(AxisEmbedder { calls: AtomicUsize::new(0) });
        let retriever = Retriever::new(embedder.clone(), ready_index().await, 10);

        retriever.retrieve("go left", 1).await.unwrap();
        retriever.retrieve("go left", 1).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        // A different top_k is a different key.
        retriever.retrieve("go left", 2).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        retriever.invalidate().await;
        retriever.retrieve("go left", 1).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cached_results_can_be_stale_after_upsert() {
        let embedder = Arc::new(AxisEmbedder { calls: AtomicUsize::new(0) });
        let index = ready_index().await;
        let retriever = Retriever::new(embedder, index.clone(), 10);

        let before = retriever.retrieve("go left", 1).await.unwrap();
        index
            .upsert(&[IndexedRecord {
                id: "0".into(),
                vector: vec![1.0, 0.0],
                metadata: RecordMetadata { text: "replaced".into() },
            }])
            .await
            .unwrap();
        let after = retriever.retrieve("go left", 1).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after[0].text(), "left");
    }

    #[tokio::test]
    async fn unready_index_error_propagates() {
        let embedder = Arc::new(AxisEmbedder { calls: AtomicUsize::new(0) });
        let index = Arc::new(VectorIndex::new(Arc::new(InMemoryVectorDatabase::new()), "docs"));
        let retriever = Retriever::new(embedder, index, 10);

        let err = retriever.retrieve("anything", 1).await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotReady { .. }));
    }
}
