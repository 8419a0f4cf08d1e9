//! In-memory vector database.
//!
//! This module provides [`InMemoryVectorDatabase`], a zero-dependency vector
//! database backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for offline use and testing. Newly created indexes can be made to
//! report "not ready" for a number of `describe_index` calls to exercise the
//! readiness wait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{IndexedRecord, RetrievalMatch};
use crate::error::{RagError, Result};
use crate::vectorstore::{IndexDescription, IndexSpec, VectorDatabase};

#[derive(Debug)]
struct StoredIndex {
    spec: IndexSpec,
    pending_polls: usize,
    records: HashMap<String, IndexedRecord>,
}

/// An in-memory vector database scoring with the index's [`Metric`](crate::Metric).
///
/// Indexes are stored as nested `HashMap`s: index name → record ID → record.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorDatabase, VectorDatabase};
///
/// let db = InMemoryVectorDatabase::new();
/// let spec = IndexSpec { name: "docs".into(), dimension: 384, metric: Metric::Cosine };
/// db.create_index(&spec).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorDatabase {
    indexes: RwLock<HashMap<String, StoredIndex>>,
    polls_until_ready: usize,
}

impl InMemoryVectorDatabase {
    /// Create a new empty in-memory vector database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every newly created index report "not ready" for the first
    /// `polls` calls to [`describe_index`](VectorDatabase::describe_index).
    pub fn with_polls_until_ready(mut self, polls: usize) -> Self {
        self.polls_until_ready = polls;
        self
    }

    /// Number of records stored in `index`, or `None` if it does not exist.
    pub async fn len(&self, index: &str) -> Option<usize> {
        self.indexes.read().await.get(index).map(|stored| stored.records.len())
    }

    /// Fetch a stored record by id.
    pub async fn fetch(&self, index: &str, id: &str) -> Option<IndexedRecord> {
        self.indexes.read().await.get(index).and_then(|stored| stored.records.get(id).cloned())
    }

    fn missing(index: &str) -> RagError {
        RagError::VectorStore {
            backend: "InMemory".to_string(),
            message: format!("index '{index}' does not exist"),
        }
    }
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.indexes.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(&spec.name) {
            return Err(RagError::VectorStore {
                backend: "InMemory".to_string(),
                message: format!("index '{}' already exists", spec.name),
            });
        }
        indexes.insert(
            spec.name.clone(),
            StoredIndex {
                spec: spec.clone(),
                pending_polls: self.polls_until_ready,
                records: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(name).ok_or_else(|| Self::missing(name))?;
        let ready = stored.pending_polls == 0;
        stored.pending_polls = stored.pending_polls.saturating_sub(1);
        Ok(IndexDescription {
            name: stored.spec.name.clone(),
            dimension: stored.spec.dimension,
            metric: stored.spec.metric,
            ready,
        })
    }

    async fn upsert(&self, index: &str, records: &[IndexedRecord]) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(index).ok_or_else(|| Self::missing(index))?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != stored.spec.dimension) {
            return Err(RagError::VectorStore {
                backend: "InMemory".to_string(),
                message: format!(
                    "record '{}' has dimension {}, index expects {}",
                    bad.id,
                    bad.vector.len(),
                    stored.spec.dimension
                ),
            });
        }
        for record in records {
            stored.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let indexes = self.indexes.read().await;
        let stored = indexes.get(index).ok_or_else(|| Self::missing(index))?;
        let metric = stored.spec.metric;

        let mut scored: Vec<RetrievalMatch> = stored
            .records
            .values()
            .map(|record| RetrievalMatch {
                id: record.id.clone(),
                score: metric.score(&record.vector, vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        // Ties fall back to id order so repeated queries agree.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes.get_mut(index).ok_or_else(|| Self::missing(index))?;
        for id in ids {
            stored.records.remove(id);
        }
        Ok(())
    }
}
