//! The question-answering session.
//!
//! A [`Session`] owns everything one user works with: the collaborator
//! handles, the indexed document, the chat history, and the passages each
//! question was answered from. It moves through three phases:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --ingest--> DocumentLoaded
//!                                                 ^          |
//!                                                 +--ingest--+
//! ```
//!
//! Every operation takes `&mut self`, so one action runs at a time. A failed
//! operation leaves the phase, history, and recorded matches as they were,
//! except that an ingest whose upsert landed counts as loaded even if the
//! stale-passage cleanup after it fails.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{Credentials, RagConfig, RemoteConnector, Session};
//!
//! let mut session = Session::new(RagConfig::default())?;
//! session.initialize(&Credentials::from_env(), &RemoteConnector::default()).await?;
//! session.ingest(&std::fs::read("paper.pdf")?, "paper.pdf").await?;
//! let answer = session.ask("What is the main result?", None).await?;
//! println!("{}", answer.text);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, ParagraphChunker};
use crate::config::{Credentials, RagConfig, validate_top_k};
use crate::connect::Connector;
use crate::document::{ChatTurn, IndexedRecord, Passage, RetrievalMatch};
use crate::embedding::{CachedEmbedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extract::ExtractorRegistry;
use crate::generation::{AnswerGenerator, build_context};
use crate::index::VectorIndex;
use crate::retriever::Retriever;

/// Where a [`Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No collaborators yet.
    Uninitialized,
    /// Collaborators built and index ready; no document ingested.
    Initialized,
    /// At least one document has been ingested.
    DocumentLoaded,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::DocumentLoaded => "document loaded",
        };
        f.write_str(name)
    }
}

/// What re-ingesting does to records of an earlier, longer document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestMode {
    /// Upsert ids `0..n` and leave any higher ids in place. Earlier
    /// retrieval results stay cached.
    #[default]
    Overwrite,
    /// Upsert ids `0..n`, delete the ids `n..` left by the previous
    /// document, and clear the retrieval cache.
    ReplaceStale,
}

/// Outcome of [`Session::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Name the document was uploaded under.
    pub filename: String,
    /// Number of passages upserted.
    pub chunk_count: usize,
    /// Ids deleted in [`IngestMode::ReplaceStale`].
    pub removed_ids: Vec<String>,
}

/// Outcome of [`Session::ask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The generated answer.
    pub text: String,
    /// The passages the answer was generated from, best first.
    pub matches: Vec<RetrievalMatch>,
}

struct Handles {
    embedder: Arc<CachedEmbedder>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    generator: AnswerGenerator,
}

/// A single user's question-answering session over one document at a time.
pub struct Session {
    config: RagConfig,
    chunker: Arc<dyn Chunker>,
    extractors: ExtractorRegistry,
    ingest_mode: IngestMode,
    handles: Option<Handles>,
    phase: SessionPhase,
    document: Option<String>,
    /// One past the highest passage id this session has written.
    indexed_count: usize,
    history: Vec<ChatTurn>,
    retrievals: HashMap<String, Vec<RetrievalMatch>>,
    last_question: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("index", &self.config.index_name)
            .field("document", &self.document)
            .field("ingest_mode", &self.ingest_mode)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl Session {
    /// Create an uninitialized session using the paragraph chunker and the
    /// default extractors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the default extractors cannot be
    /// built.
    pub fn new(config: RagConfig) -> Result<Self> {
        Ok(Self {
            config,
            chunker: Arc::new(ParagraphChunker),
            extractors: ExtractorRegistry::with_defaults()?,
            ingest_mode: IngestMode::default(),
            handles: None,
            phase: SessionPhase::Uninitialized,
            document: None,
            indexed_count: 0,
            history: Vec::new(),
            retrievals: HashMap::new(),
            last_question: None,
        })
    }

    /// Use a different chunking policy.
    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Use a different extractor registry.
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    /// Choose how re-ingesting treats records of a longer earlier document.
    pub fn with_ingest_mode(mut self, mode: IngestMode) -> Self {
        self.ingest_mode = mode;
        self
    }

    /// Change the ingest mode of a live session.
    pub fn set_ingest_mode(&mut self, mode: IngestMode) {
        self.ingest_mode = mode;
    }

    /// The configuration the session was created with.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The current ingest mode.
    pub fn ingest_mode(&self) -> IngestMode {
        self.ingest_mode
    }

    /// Name of the most recently ingested document.
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Every question and answer so far, oldest first.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// The passages the most recent answer to `query` was generated from.
    pub fn matches_for(&self, query: &str) -> Option<&[RetrievalMatch]> {
        self.retrievals.get(query).map(Vec::as_slice)
    }

    /// The passages behind the most recent answer.
    pub fn last_question_matches(&self) -> Option<&[RetrievalMatch]> {
        self.last_question.as_deref().and_then(|query| self.matches_for(query))
    }

    /// Build the collaborators, make sure the index exists and is ready, and
    /// move to [`SessionPhase::Initialized`].
    ///
    /// Calling it again reconnects and forgets the loaded document, so a new
    /// document must be ingested before asking. The chat history is kept, and
    /// so is the count of passage ids written to the configured index, which
    /// lets [`IngestMode::ReplaceStale`] still remove an earlier document's
    /// tail after reconnecting.
    ///
    /// # Errors
    ///
    /// - [`RagError::Configuration`] for blank credentials, an embedder whose
    ///   dimension disagrees with the configuration, or an existing index with
    ///   a different dimension or metric.
    /// - [`RagError::Timeout`] if the index does not become ready in time.
    /// - [`RagError::VectorStore`] for database failures.
    pub async fn initialize(
        &mut self,
        credentials: &Credentials,
        connector: &dyn Connector,
    ) -> Result<()> {
        credentials.validate()?;
        let backends = connector.connect(credentials, &self.config)?;
        if backends.embedder.dimensions() != self.config.dimension {
            return Err(RagError::Configuration(format!(
                "embedder produces {} dimensions, configuration expects {}",
                backends.embedder.dimensions(),
                self.config.dimension
            )));
        }

        let embedder = Arc::new(CachedEmbedder::new(
            backends.embedder,
            self.config.embedding_cache_capacity,
        ));
        let index = Arc::new(
            VectorIndex::new(backends.database, self.config.index_name.clone())
                .with_poll_interval(self.config.poll_interval)
                .with_ready_timeout(self.config.ready_timeout),
        );
        index.ensure_index(self.config.dimension, self.config.metric).await.map_err(|e| {
            error!(index = %self.config.index_name, error = %e, "failed to prepare index");
            e
        })?;

        let retriever = Retriever::new(
            embedder.clone() as Arc<dyn EmbeddingProvider>,
            index.clone(),
            self.config.retrieval_cache_capacity,
        );
        let generator = AnswerGenerator::new(backends.model, self.config.answer_cache_capacity)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        self.handles = Some(Handles { embedder, index, retriever, generator });
        self.phase = SessionPhase::Initialized;
        self.document = None;
        info!(
            index = %self.config.index_name,
            indexed_count = self.indexed_count,
            "session initialized"
        );
        Ok(())
    }

    /// Extract, chunk, embed, and index an uploaded file.
    ///
    /// The extractor is chosen by `filename`'s extension.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] before [`initialize`](Self::initialize).
    /// - [`RagError::Extraction`] if the file cannot be read as text.
    /// - Embedding and vector store errors from indexing.
    pub async fn ingest(&mut self, bytes: &[u8], filename: &str) -> Result<IngestReport> {
        self.handles()?;
        let text = self.extractors.extract(filename, bytes).await.map_err(|e| {
            error!(filename, error = %e, "text extraction failed");
            e
        })?;
        self.ingest_text(&text, filename).await
    }

    /// Chunk, embed, and index already extracted text.
    ///
    /// Passages get ids `"0"` to `"n-1"` in document order. In
    /// [`IngestMode::Overwrite`] a shorter document leaves the higher ids of
    /// the previous one in the index, where they can still be retrieved.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] before [`initialize`](Self::initialize).
    /// - Embedding and vector store errors from indexing. If only the
    ///   [`IngestMode::ReplaceStale`] delete fails, the new document is
    ///   already loaded and the next ingest retries the delete.
    pub async fn ingest_text(&mut self, text: &str, filename: &str) -> Result<IngestReport> {
        let mode = self.ingest_mode;
        let previous = self.indexed_count;
        let handles = self.handles()?;

        let passages = Passage::from_chunks(self.chunker.chunk(text));
        let chunk_count = passages.len();
        if chunk_count == 0 {
            warn!(filename, "document produced no passages");
        }

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let vectors = handles.embedder.embed_batch(&texts).await.map_err(|e| {
            error!(filename, error = %e, "embedding failed during ingestion");
            e
        })?;
        let records: Vec<IndexedRecord> =
            passages.into_iter().zip(vectors).map(|(p, v)| IndexedRecord::new(p, v)).collect();
        handles.index.upsert(&records).await.map_err(|e| {
            error!(filename, error = %e, "upsert failed during ingestion");
            e
        })?;

        // Ids 0..chunk_count now hold this document whatever happens next.
        self.indexed_count = previous.max(chunk_count);
        self.document = Some(filename.to_string());
        self.phase = SessionPhase::DocumentLoaded;

        let mut removed_ids = Vec::new();
        match mode {
            IngestMode::Overwrite => {
                if previous > chunk_count {
                    debug!(stale = previous - chunk_count, "leaving passages of earlier document");
                }
            }
            IngestMode::ReplaceStale => {
                let handles = self.handles()?;
                handles.retriever.invalidate().await;
                removed_ids = (chunk_count..previous).map(|id| id.to_string()).collect();
                handles.index.delete(&removed_ids).await.map_err(|e| {
                    error!(filename, error = %e, "failed to delete stale passages");
                    e
                })?;
                self.indexed_count = chunk_count;
            }
        }
        info!(filename, chunk_count, removed = removed_ids.len(), "ingested document");

        Ok(IngestReport { filename: filename.to_string(), chunk_count, removed_ids })
    }

    /// Answer `query` from the ingested document.
    ///
    /// Retrieves `top_k` passages (the configured default when `None`),
    /// generates an answer from them, appends the question and answer to the
    /// history, and records the passages under `query`.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] if no document has been ingested.
    /// - [`RagError::InvalidInput`] for a blank query or `top_k` outside
    ///   `1..=10`.
    /// - Retrieval and generation errors, which leave the history untouched.
    pub async fn ask(&mut self, query: &str, top_k: Option<usize>) -> Result<Answer> {
        if self.phase != SessionPhase::DocumentLoaded {
            return Err(RagError::NotReady(format!(
                "session is {}; ingest a document before asking",
                self.phase
            )));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into()));
        }
        let top_k = top_k.unwrap_or(self.config.top_k);
        validate_top_k(top_k)?;

        let handles = self.handles()?;
        let matches = handles.retriever.retrieve(query, top_k).await?;
        let context = build_context(&matches);
        let text = handles.generator.generate(query, &context).await?;

        self.history.push(ChatTurn::user(query));
        self.history.push(ChatTurn::assistant(text.clone()));
        self.retrievals.insert(query.to_string(), matches.clone());
        self.last_question = Some(query.to_string());
        info!(top_k, match_count = matches.len(), "answered question");

        Ok(Answer { text, matches })
    }

    /// Empty the embedding, retrieval, and answer memos.
    pub async fn clear_caches(&self) {
        if let Some(handles) = &self.handles {
            handles.embedder.clear().await;
            handles.retriever.invalidate().await;
            handles.generator.invalidate().await;
            debug!("session caches cleared");
        }
    }

    fn handles(&self) -> Result<&Handles> {
        self.handles.as_ref().ok_or_else(|| {
            RagError::NotReady(format!("session is {}; initialize it first", self.phase))
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::connect::{Backends, StaticConnector};
    use crate::generation::{ChatRequest, LanguageModel};
    use crate::hashing::HashingEmbeddingProvider;
    use crate::inmemory::InMemoryVectorDatabase;

    struct FirstLine;

    #[async_trait]
    impl LanguageModel for FirstLine {
        fn name(&self) -> &str {
            "first-line"
        }

        async fn complete(&self, request: ChatRequest) -> Result<String> {
            let prompt = &request.messages[1].content;
            Ok(prompt.lines().nth(1).unwrap_or_default().to_string())
        }
    }

    fn connector(dimension: usize) -> StaticConnector {
        StaticConnector::new(Backends {
            embedder: Arc::new(HashingEmbeddingProvider::new(dimension).unwrap()),
            database: Arc::new(InMemoryVectorDatabase::new()),
            model: Arc::new(FirstLine),
        })
    }

    fn credentials() -> Credentials {
        Credentials::new("gsk", "pc")
    }

    #[tokio::test]
    async fn ingest_before_initialize_is_not_ready() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        let err = session.ingest(b"text", "a.txt").await.unwrap_err();
        assert!(matches!(err, RagError::NotReady(_)));
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn blank_credentials_keep_session_uninitialized() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        let err = session.initialize(&Credentials::new("", "pc"), &connector(384)).await;
        assert!(matches!(err, Err(RagError::Configuration(_))));
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn embedder_dimension_mismatch_is_rejected() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        let err = session.initialize(&credentials(), &connector(64)).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn phases_advance_through_initialize_and_ingest() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        session.initialize(&credentials(), &connector(384)).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Initialized);

        let report = session.ingest(b"one\n\ntwo", "notes.txt").await.unwrap();
        assert_eq!(report.chunk_count, 2);
        assert_eq!(session.phase(), SessionPhase::DocumentLoaded);
        assert_eq!(session.document(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn reinitializing_requires_a_new_document() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        let connector = connector(384);
        session.initialize(&credentials(), &connector).await.unwrap();
        session.ingest_text("Paris is in France.", "a.txt").await.unwrap();
        session.ask("Where is Paris?", None).await.unwrap();

        session.initialize(&credentials(), &connector).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Initialized);
        assert_eq!(session.history().len(), 2);
        assert!(matches!(session.ask("Where is Paris?", None).await, Err(RagError::NotReady(_))));
    }

    #[tokio::test]
    async fn empty_document_still_loads() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        session.initialize(&credentials(), &connector(384)).await.unwrap();
        let report = session.ingest_text(" \n\n \n", "blank.txt").await.unwrap();
        assert_eq!(report.chunk_count, 0);
        assert_eq!(session.phase(), SessionPhase::DocumentLoaded);
    }

    #[tokio::test]
    async fn invalid_questions_are_rejected_without_side_effects() {
        let mut session = Session::new(RagConfig::default()).unwrap();
        session.initialize(&credentials(), &connector(384)).await.unwrap();
        session.ingest_text("Paris is in France.", "a.txt").await.unwrap();

        assert!(matches!(session.ask("   ", None).await, Err(RagError::InvalidInput(_))));
        assert!(matches!(session.ask("q", Some(0)).await, Err(RagError::InvalidInput(_))));
        assert!(matches!(session.ask("q", Some(11)).await, Err(RagError::InvalidInput(_))));
        assert!(session.history().is_empty());
        assert!(session.last_question_matches().is_none());
    }
}
