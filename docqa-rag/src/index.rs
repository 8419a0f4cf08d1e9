//! Readiness-aware handle to one named vector index.
//!
//! [`VectorIndex`] creates its index on first use, waits (bounded) for the
//! database to report it ready, rejects an existing index whose dimension or
//! metric disagrees with the configuration, and refuses reads and writes until
//! all of that has succeeded.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::document::{IndexedRecord, Metric, RetrievalMatch};
use crate::error::{RagError, Result};
use crate::vectorstore::{IndexDescription, IndexSpec, VectorDatabase};

/// A handle to a single named index inside a [`VectorDatabase`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorDatabase, Metric, VectorIndex};
///
/// let index = VectorIndex::new(Arc::new(InMemoryVectorDatabase::new()), "rag-doc");
/// index.ensure_index(384, Metric::Cosine).await?;
/// index.upsert(&records).await?;
/// let matches = index.query(&query_embedding, 3).await?;
/// ```
pub struct VectorIndex {
    database: Arc<dyn VectorDatabase>,
    name: String,
    poll_interval: Duration,
    ready_timeout: Duration,
    description: OnceLock<IndexDescription>,
}

impl VectorIndex {
    /// Create a handle for `name`. Nothing is contacted until
    /// [`ensure_index`](Self::ensure_index).
    pub fn new(database: Arc<dyn VectorDatabase>, name: impl Into<String>) -> Self {
        Self {
            database,
            name: name.into(),
            poll_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(60),
            description: OnceLock::new(),
        }
    }

    /// Set the delay between readiness polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum total readiness wait.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// The index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`ensure_index`](Self::ensure_index) has completed.
    pub fn is_ready(&self) -> bool {
        self.description.get().is_some()
    }

    /// Create the index if absent and wait until it is ready.
    ///
    /// Idempotent: calling it again with the same parameters returns the
    /// stored description without contacting the database.
    ///
    /// # Errors
    ///
    /// - [`RagError::Configuration`] if the index exists with a different
    ///   dimension or metric.
    /// - [`RagError::Timeout`] if the index is not ready within the
    ///   configured timeout.
    /// - [`RagError::VectorStore`] for database failures.
    pub async fn ensure_index(&self, dimension: usize, metric: Metric) -> Result<IndexDescription> {
        if let Some(description) = self.description.get() {
            self.check_matches(description, dimension, metric)?;
            return Ok(description.clone());
        }

        let existing = self.database.list_indexes().await?;
        if existing.iter().any(|name| name == &self.name) {
            debug!(index = %self.name, "index already exists, skipping creation");
        } else {
            let spec = IndexSpec { name: self.name.clone(), dimension, metric };
            self.database.create_index(&spec).await.map_err(|e| {
                error!(index = %self.name, error = %e, "failed to create index");
                e
            })?;
            info!(index = %self.name, dimension, %metric, "created index");
        }

        let started = Instant::now();
        loop {
            let description = self.database.describe_index(&self.name).await?;
            self.check_matches(&description, dimension, metric)?;
            if description.ready {
                let waited_ms = started.elapsed().as_millis() as u64;
                info!(index = %self.name, waited_ms, "index ready");
                return Ok(self.description.get_or_init(|| description).clone());
            }

            let waited = started.elapsed();
            if waited + self.poll_interval > self.ready_timeout {
                warn!(index = %self.name, ?waited, "index did not become ready");
                return Err(RagError::Timeout {
                    operation: format!("index '{}' to become ready", self.name),
                    waited,
                });
            }
            debug!(index = %self.name, "index not ready, polling again");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Insert or overwrite records by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotReady`] before `ensure_index` completes.
    pub async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        self.ready_description()?;
        if records.is_empty() {
            return Ok(());
        }
        self.database.upsert(&self.name, records).await?;
        debug!(index = %self.name, count = records.len(), "upserted records");
        Ok(())
    }

    /// Return at most `top_k` matches ordered by descending score.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotReady`] before `ensure_index` completes.
    /// - [`RagError::InvalidInput`] if `top_k` is zero.
    /// - [`RagError::Configuration`] if the vector has the wrong dimension.
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievalMatch>> {
        let description = self.ready_description()?;
        if top_k == 0 {
            return Err(RagError::InvalidInput("top_k must be at least 1".into()));
        }
        if vector.len() != description.dimension {
            return Err(RagError::Configuration(format!(
                "query vector has dimension {}, index '{}' expects {}",
                vector.len(),
                self.name,
                description.dimension
            )));
        }

        let mut matches = self.database.query(&self.name, vector, top_k).await?;
        matches.truncate(top_k);
        Ok(matches)
    }

    /// Delete records by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotReady`] before `ensure_index` completes.
    pub async fn delete(&self, ids: &[String]) -> Result<()> {
        self.ready_description()?;
        if ids.is_empty() {
            return Ok(());
        }
        self.database.delete(&self.name, ids).await?;
        debug!(index = %self.name, count = ids.len(), "deleted records");
        Ok(())
    }

    fn ready_description(&self) -> Result<&IndexDescription> {
        self.description.get().ok_or_else(|| RagError::IndexNotReady { index: self.name.clone() })
    }

    fn check_matches(
        &self,
        description: &IndexDescription,
        dimension: usize,
        metric: Metric,
    ) -> Result<()> {
        if description.dimension != dimension || description.metric != metric {
            error!(
                index = %self.name,
                existing_dimension = description.dimension,
                existing_metric = %description.metric,
                dimension,
                %metric,
                "index configuration mismatch"
            );
            return Err(RagError::Configuration(format!(
                "index '{}' exists with dimension {} and metric {}, expected dimension {} and metric {}",
                self.name, description.dimension, description.metric, dimension, metric
            )));
        }
        Ok(())
    }
}
