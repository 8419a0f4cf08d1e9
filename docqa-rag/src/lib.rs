//! Retrieval-augmented question answering over a single uploaded document.
//!
//! The crate splits a document into paragraph passages, embeds them, stores
//! them in a vector index, and answers questions by retrieving the closest
//! passages and asking a chat model to answer from them alone.
//!
//! - [`Session`] drives the whole workflow: `initialize`, `ingest`, `ask`.
//! - [`ExtractorRegistry`] turns PDF, DOCX, and text uploads into text.
//! - [`ParagraphChunker`] splits text on blank lines.
//! - [`CachedEmbedder`], [`Retriever`], and [`AnswerGenerator`] each keep a
//!   bounded LRU memo owned by the session.
//! - [`VectorIndex`] waits (bounded) for its index to become ready and
//!   refuses to be used before that.
//!
//! # Features
//!
//! | Feature    | Adds                                                        |
//! |------------|-------------------------------------------------------------|
//! | `openai`   | `HttpEmbeddingProvider` and `OpenAiCompatibleChatModel`     |
//! | `pinecone` | `PineconeVectorDatabase`                                    |
//! | `docx`     | Word document extraction                                    |
//! | `full`     | All of the above, plus `RemoteConnector`                    |
//!
//! Without features the crate runs offline with [`HashingEmbeddingProvider`]
//! and [`InMemoryVectorDatabase`].

pub mod cache;
pub mod chunking;
pub mod config;
pub mod connect;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod hashing;
pub mod index;
pub mod inmemory;
pub mod retriever;
pub mod session;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod chat;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pinecone")]
pub mod pinecone;

pub use cache::{CacheStats, LruCache};
pub use chunking::{Chunker, ParagraphChunker};
pub use config::{
    Credentials, DEFAULT_DIMENSION, DEFAULT_INDEX_NAME, MAX_TOP_K, RagConfig, RagConfigBuilder,
};
#[cfg(all(feature = "openai", feature = "pinecone"))]
pub use connect::RemoteConnector;
pub use connect::{Backends, Connector, StaticConnector};
pub use document::{
    ChatTurn, IndexedRecord, Metric, Passage, RecordMetadata, RetrievalMatch, Role,
    cosine_similarity,
};
pub use embedding::{CachedEmbedder, EmbeddingProvider};
pub use error::{RagError, Result};
#[cfg(feature = "docx")]
pub use extract::DocxExtractor;
pub use extract::{ExtractorRegistry, PdfExtractor, PlainTextExtractor, TextExtractor};
pub use generation::{
    AnswerGenerator, ChatMessage, ChatRequest, LanguageModel, SYSTEM_PROMPT, build_context,
    build_prompt,
};
pub use hashing::HashingEmbeddingProvider;
pub use index::VectorIndex;
pub use inmemory::InMemoryVectorDatabase;
pub use retriever::Retriever;
pub use session::{Answer, IngestMode, IngestReport, Session, SessionPhase};
pub use vectorstore::{IndexDescription, IndexSpec, VectorDatabase};
