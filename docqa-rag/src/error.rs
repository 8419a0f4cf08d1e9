//! Error types for the `docqa-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while initializing a session, ingesting a document,
/// or answering a question.
///
/// Nothing in the crate retries on any of these. Every failure is reported to
/// the caller, who decides whether to resubmit the action.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credentials, invalid settings, or an existing index whose
    /// dimension or metric disagrees with the configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The uploaded file could not be turned into text.
    #[error("Extraction error ({extension}): {message}")]
    Extraction {
        /// Lowercase file extension the extractor was selected by.
        extension: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index was used before `ensure_index` completed.
    #[error("Index '{index}' is not ready")]
    IndexNotReady {
        /// Name of the index.
        index: String,
    },

    /// An error occurred in the vector database backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model call failed or returned nothing usable.
    #[error("Generation error ({model}): {message}")]
    Generation {
        /// The model that was called.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A bounded wait on an external service ran out.
    #[error("Timed out after {waited:?} waiting for {operation}")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The session is not in a phase that allows the requested action.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The caller supplied an argument outside the accepted range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    /// Whether the session remains usable after this error.
    ///
    /// Only configuration problems are fatal; every other failure affects a
    /// single action.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RagError::Configuration(_))
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
