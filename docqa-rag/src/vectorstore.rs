//! Vector database trait for storing and searching vector embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{IndexedRecord, Metric, RetrievalMatch};
use crate::error::Result;

/// Parameters of an index to create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Dimension of every stored vector.
    pub dimension: usize,
    /// Similarity metric used by queries.
    pub metric: Metric,
}

/// State of an existing index as reported by the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,
    /// Dimension of every stored vector.
    pub dimension: usize,
    /// Similarity metric used by queries.
    pub metric: Metric,
    /// Whether the index accepts reads and writes.
    pub ready: bool,
}

/// A remote or local service holding named vector indexes.
///
/// This is the raw collaborator contract; [`VectorIndex`](crate::VectorIndex)
/// layers readiness tracking and configuration checks on top of it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorDatabase, VectorDatabase};
///
/// let db = InMemoryVectorDatabase::new();
/// db.create_index(&spec).await?;
/// db.upsert("rag-doc", &records).await?;
/// let matches = db.query("rag-doc", &query_embedding, 3).await?;
/// ```
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Names of the indexes that exist.
    async fn list_indexes(&self) -> Result<Vec<String>>;

    /// Create an index. Fails if it already exists.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Describe an existing index.
    async fn describe_index(&self, name: &str) -> Result<IndexDescription>;

    /// Insert records, replacing any with the same id.
    async fn upsert(&self, index: &str, records: &[IndexedRecord]) -> Result<()>;

    /// Return the `top_k` records most similar to `vector`.
    ///
    /// Returns matches ordered by descending similarity score.
    async fn query(&self, index: &str, vector: &[f32], top_k: usize)
    -> Result<Vec<RetrievalMatch>>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, index: &str, ids: &[String]) -> Result<()>;
}
