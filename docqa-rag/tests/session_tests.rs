//! End-to-end session scenarios against the offline backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa_rag::{
    Backends, ChatRequest, Credentials, EmbeddingProvider, HashingEmbeddingProvider,
    IndexDescription, IndexSpec, IndexedRecord, InMemoryVectorDatabase, IngestMode, LanguageModel,
    RagConfig, RagError, Result, RetrievalMatch, Role, Session, SessionPhase, StaticConnector,
    VectorDatabase,
};

const PARIS: &str = "Paris is the capital of France.";
const TOKYO: &str = "Tokyo is the capital of Japan.";

/// Records every request and answers with a fixed string unless told to fail.
#[derive(Default)]
struct RecordingModel {
    requests: Mutex<Vec<ChatRequest>>,
    fail: AtomicBool,
}

impl RecordingModel {
    fn last_prompt(&self) -> String {
        let requests = self.requests.lock().unwrap();
        requests.last().map(|r| r.messages[1].content.clone()).unwrap_or_default()
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Generation {
                model: "recording".into(),
                message: "429 rate limited".into(),
            });
        }
        Ok("The capital of France is Paris.".into())
    }
}

/// Counts calls reaching the underlying embedder.
struct CountingEmbedder {
    inner: HashingEmbeddingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// In-memory database whose deletes can be made to fail.
#[derive(Default)]
struct FlakyDeleteDatabase {
    inner: InMemoryVectorDatabase,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl VectorDatabase for FlakyDeleteDatabase {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        self.inner.list_indexes().await
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        self.inner.create_index(spec).await
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        self.inner.describe_index(name).await
    }

    async fn upsert(&self, index: &str, records: &[IndexedRecord]) -> Result<()> {
        self.inner.upsert(index, records).await
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        self.inner.query(index, vector, top_k).await
    }

    async fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RagError::VectorStore {
                backend: "flaky".into(),
                message: "503 unavailable".into(),
            });
        }
        self.inner.delete(index, ids).await
    }
}

struct Fixture {
    session: Session,
    database: Arc<FlakyDeleteDatabase>,
    model: Arc<RecordingModel>,
    embedder: Arc<CountingEmbedder>,
}

impl Fixture {
    fn connector(&self) -> StaticConnector {
        StaticConnector::new(Backends {
            embedder: self.embedder.clone(),
            database: self.database.clone(),
            model: self.model.clone(),
        })
    }

    async fn reinitialize(&mut self) {
        let connector = self.connector();
        self.session.initialize(&credentials(), &connector).await.unwrap();
    }
}

fn credentials() -> Credentials {
    Credentials::new("gsk_test", "pc_test")
}

async fn initialized(mode: IngestMode) -> Fixture {
    let config = RagConfig::builder().index_name("scenario").build().unwrap();
    let embedder = Arc::new(CountingEmbedder {
        inner: HashingEmbeddingProvider::new(config.dimension).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let mut fx = Fixture {
        session: Session::new(config).unwrap().with_ingest_mode(mode),
        database: Arc::new(FlakyDeleteDatabase::default()),
        model: Arc::new(RecordingModel::default()),
        embedder,
    };
    fx.reinitialize().await;
    fx
}

async fn stored_text(database: &FlakyDeleteDatabase, id: &str) -> Option<String> {
    database.inner.fetch("scenario", id).await.map(|record| record.metadata.text)
}

#[tokio::test]
async fn paris_question_is_answered_from_paris_passage() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    let document = format!("{PARIS}\n\n{TOKYO}");
    let report = fx.session.ingest(document.as_bytes(), "capitals.txt").await.unwrap();
    assert_eq!(report.chunk_count, 2);

    let question = "What is the capital of France?";
    let answer = fx.session.ask(question, Some(1)).await.unwrap();

    assert_eq!(answer.matches.len(), 1);
    assert_eq!(answer.matches[0].text(), PARIS);
    assert!(fx.model.last_prompt().contains(PARIS));
    assert_eq!(answer.text, "The capital of France is Paris.");

    let history = fx.session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, question);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(fx.session.matches_for(question), Some(answer.matches.as_slice()));
    assert_eq!(fx.session.last_question_matches(), Some(answer.matches.as_slice()));
}

#[tokio::test]
async fn default_top_k_returns_every_passage_in_score_order() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    fx.session.ingest_text(&format!("{PARIS}\n\n{TOKYO}"), "capitals.txt").await.unwrap();

    let answer = fx.session.ask("What is the capital of France?", None).await.unwrap();
    assert_eq!(answer.matches.len(), 2);
    assert!(answer.matches[0].score >= answer.matches[1].score);
    assert!(fx.model.last_prompt().contains(&format!("{PARIS}\n{TOKYO}")));
}

#[tokio::test]
async fn reingesting_shorter_document_leaves_stale_passages() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    fx.session.ingest_text("alpha one\n\nalpha two\n\nalpha three", "a.txt").await.unwrap();
    let report = fx.session.ingest_text("beta only", "b.txt").await.unwrap();

    assert!(report.removed_ids.is_empty());
    assert_eq!(stored_text(&fx.database, "0").await.as_deref(), Some("beta only"));
    assert_eq!(stored_text(&fx.database, "1").await.as_deref(), Some("alpha two"));
    assert_eq!(stored_text(&fx.database, "2").await.as_deref(), Some("alpha three"));
    assert_eq!(fx.database.inner.len("scenario").await, Some(3));
}

#[tokio::test]
async fn replace_stale_mode_deletes_leftover_passages() {
    let mut fx = initialized(IngestMode::ReplaceStale).await;
    fx.session.ingest_text("alpha one\n\nalpha two\n\nalpha three", "a.txt").await.unwrap();
    let report = fx.session.ingest_text("beta only", "b.txt").await.unwrap();

    assert_eq!(report.removed_ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(fx.database.inner.len("scenario").await, Some(1));
    assert_eq!(stored_text(&fx.database, "0").await.as_deref(), Some("beta only"));
}

#[tokio::test]
async fn replace_stale_mode_remembers_earlier_document_across_reinitialize() {
    let mut fx = initialized(IngestMode::ReplaceStale).await;
    fx.session.ingest_text("alpha one\n\nalpha two\n\nalpha three", "a.txt").await.unwrap();

    fx.reinitialize().await;
    assert_eq!(fx.session.phase(), SessionPhase::Initialized);
    let report = fx.session.ingest_text("beta only", "b.txt").await.unwrap();

    assert_eq!(report.removed_ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(fx.database.inner.len("scenario").await, Some(1));
    assert_eq!(stored_text(&fx.database, "1").await, None);
}

#[tokio::test]
async fn failed_stale_delete_keeps_new_document_and_retries_next_ingest() {
    let mut fx = initialized(IngestMode::ReplaceStale).await;
    fx.session.ingest_text("alpha one\n\nalpha two\n\nalpha three", "a.txt").await.unwrap();

    fx.database.fail_deletes.store(true, Ordering::SeqCst);
    let err = fx.session.ingest_text("beta only", "b.txt").await.unwrap_err();
    assert!(matches!(err, RagError::VectorStore { .. }));
    assert_eq!(fx.session.document(), Some("b.txt"));
    assert_eq!(fx.session.phase(), SessionPhase::DocumentLoaded);
    assert_eq!(stored_text(&fx.database, "0").await.as_deref(), Some("beta only"));

    fx.database.fail_deletes.store(false, Ordering::SeqCst);
    let report = fx.session.ingest_text("beta only", "b.txt").await.unwrap();
    assert_eq!(report.removed_ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(fx.database.inner.len("scenario").await, Some(1));
}

#[tokio::test]
async fn retrieval_cache_survives_reingest_until_cleared() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    fx.session.ingest_text(PARIS, "a.txt").await.unwrap();
    let first = fx.session.ask("capital of France", None).await.unwrap();

    fx.session.ingest_text(TOKYO, "b.txt").await.unwrap();
    let cached = fx.session.ask("capital of France", None).await.unwrap();
    assert_eq!(cached.matches, first.matches);
    assert_eq!(cached.matches[0].text(), PARIS);

    fx.session.clear_caches().await;
    let fresh = fx.session.ask("capital of France", None).await.unwrap();
    assert_eq!(fresh.matches[0].text(), TOKYO);
}

#[tokio::test]
async fn repeated_question_reuses_embedding_and_answer() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    fx.session.ingest_text(&format!("{PARIS}\n\n{TOKYO}"), "capitals.txt").await.unwrap();
    let after_ingest = fx.embedder.calls.load(Ordering::SeqCst);

    fx.session.ask("What is the capital of France?", None).await.unwrap();
    fx.session.ask("What is the capital of France?", None).await.unwrap();

    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), after_ingest + 1);
    assert_eq!(fx.model.calls(), 1);
    assert_eq!(fx.session.history().len(), 4);
}

#[tokio::test]
async fn ask_before_ingest_fails_and_leaves_state_unchanged() {
    let mut fx = initialized(IngestMode::Overwrite).await;

    let err = fx.session.ask("What is the capital of France?", None).await.unwrap_err();
    assert!(matches!(err, RagError::NotReady(_)));
    assert_eq!(fx.session.phase(), SessionPhase::Initialized);
    assert!(fx.session.history().is_empty());
    assert!(fx.session.last_question_matches().is_none());
    assert_eq!(fx.model.calls(), 0);
}

#[tokio::test]
async fn ask_on_fresh_session_is_not_ready() {
    let mut session = Session::new(RagConfig::default()).unwrap();
    let err = session.ask("anything", None).await.unwrap_err();
    assert!(matches!(err, RagError::NotReady(_)));
    assert_eq!(session.phase(), SessionPhase::Uninitialized);
}

#[tokio::test]
async fn failed_generation_leaves_history_untouched() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    fx.session.ingest_text(PARIS, "a.txt").await.unwrap();
    fx.model.fail.store(true, Ordering::SeqCst);

    let err = fx.session.ask("What is the capital of France?", None).await.unwrap_err();
    assert!(matches!(err, RagError::Generation { .. }));
    assert!(fx.session.history().is_empty());
    assert!(fx.session.matches_for("What is the capital of France?").is_none());

    fx.model.fail.store(false, Ordering::SeqCst);
    fx.session.ask("What is the capital of France?", None).await.unwrap();
    assert_eq!(fx.session.history().len(), 2);
}

#[tokio::test]
async fn unreadable_upload_is_an_extraction_error() {
    let mut fx = initialized(IngestMode::Overwrite).await;
    let err = fx.session.ingest(&[0xff, 0xfe, 0xfd], "scan.bin").await.unwrap_err();
    assert!(matches!(err, RagError::Extraction { .. }));
    assert_eq!(fx.session.phase(), SessionPhase::Initialized);
}
