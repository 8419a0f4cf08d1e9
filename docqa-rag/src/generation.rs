//! Grounded answer generation.
//!
//! [`AnswerGenerator`] turns a question and the text of the retrieved passages
//! into a single chat-completion request, sends it to a [`LanguageModel`], and
//! memoizes the trimmed answer by `(query, context)`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::cache::{CacheStats, LruCache};
use crate::document::{RetrievalMatch, Role};
use crate::error::{RagError, Result};

/// System instruction sent with every question.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based only \
on the given context. If the context does not contain the answer, say that you don't know.";

/// A message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// A system instruction.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    /// A message from the given chat role.
    pub fn from_role(role: Role, content: impl Into<String>) -> Self {
        let role = match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self { role: role.into(), content: content.into() }
    }
}

/// A single non-streaming completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Ordered conversation, system message first.
    pub messages: Vec<ChatMessage>,
    /// Completion length limit.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// A chat-completion service.
///
/// Implementations return the text of the first completion choice. Any
/// transport, authentication, or rate-limit failure must surface as
/// [`RagError::Generation`].
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Name of the model, used in logs and errors.
    fn name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Join the passage texts of `matches` in rank order, one per line.
pub fn build_context(matches: &[RetrievalMatch]) -> String {
    matches.iter().map(RetrievalMatch::text).collect::<Vec<_>>().join("\n")
}

/// Build the user message carrying the context and the question.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {query}\n\nAnswer:")
}

/// Generates answers grounded in retrieved context.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{AnswerGenerator, build_context};
///
/// let generator = AnswerGenerator::new(Arc::new(model), 100);
/// let answer = generator.generate("What is the capital of France?", &build_context(&matches)).await?;
/// ```
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
    temperature: f32,
    cache: Mutex<LruCache<(String, String), String>>,
}

impl AnswerGenerator {
    /// Create a generator memoizing up to `capacity` answers, with a 150 token
    /// limit and a temperature of 0.7.
    pub fn new(model: Arc<dyn LanguageModel>, capacity: usize) -> Self {
        Self { model, max_tokens: 150, temperature: 0.7, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Set the completion length limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// The request that [`generate`](Self::generate) sends for this pair.
    pub fn request_for(&self, query: &str, context: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::from_role(Role::User, build_prompt(query, context)),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Answer `query` from `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the model call fails or the
    /// completion is blank. Nothing is retried.
    pub async fn generate(&self, query: &str, context: &str) -> Result<String> {
        let key = (query.to_string(), context.to_string());
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(model = self.model.name(), "answer cache hit");
            return Ok(hit);
        }

        let request = self.request_for(query, context);
        let completion = self.model.complete(request).await.map_err(|e| {
            error!(model = self.model.name(), error = %e, "completion failed");
            match e {
                RagError::Generation { .. } => e,
                other => RagError::Generation {
                    model: self.model.name().to_string(),
                    message: other.to_string(),
                },
            }
        })?;

        let answer = completion.trim().to_string();
        if answer.is_empty() {
            return Err(RagError::Generation {
                model: self.model.name().to_string(),
                message: "model returned an empty completion".into(),
            });
        }

        info!(model = self.model.name(), answer_len = answer.len(), "generated answer");
        self.cache.lock().await.put(key, answer.clone());
        Ok(answer)
    }

    /// Drop every memoized answer.
    pub async fn invalidate(&self) {
        self.cache.lock().await.clear();
    }

    /// Hit/miss counters of the memo.
    pub async fn stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::document::RecordMetadata;

    struct EchoModel {
        calls: AtomicUsize,
        last: std::sync::Mutex<Option<ChatRequest>>,
    }

    impl EchoModel {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), last: std::sync::Mutex::new(None) }
        }
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ChatRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request);
            Ok("  Paris.\n".into())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            Err(RagError::Generation { model: "failing".into(), message: "rate limited".into() })
        }
    }

    fn hit(id: &str, score: f32, text: &str) -> RetrievalMatch {
        RetrievalMatch { id: id.into(), score, metadata: RecordMetadata { text: text.into() } }
    }

    #[test]
    fn context_joins_passages_in_rank_order() {
        let context = build_context(&[hit("1", 0.9, "first"), hit("0", 0.5, "second")]);
        assert_eq!(context, "first\nsecond");
        assert_eq!(build_context(&[]), "");
    }

    #[tokio::test]
    async fn prompt_carries_context_and_settings() {
        let model = Arc::new(EchoModel::new());
        let generator = AnswerGenerator::new(model.clone(), 10);

        let answer = generator.generate("Capital?", "Paris is the capital.").await.unwrap();
        assert_eq!(answer, "Paris.");

        let request = model.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.max_tokens, 150);
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(
            request.messages[1].content,
            "Context:\nParis is the capital.\n\nQuestion: Capital?\n\nAnswer:"
        );
    }

    #[tokio::test]
    async fn same_query_and_context_calls_model_once() {
        let model = Arc::new(EchoModel::new());
        let generator = AnswerGenerator::new(model.clone(), 10);

        generator.generate("q", "c").await.unwrap();
        generator.generate("q", "c").await.unwrap();
        generator.generate("q", "other context").await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(generator.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn model_failure_propagates_and_is_not_cached() {
        let generator = AnswerGenerator::new(Arc::new(FailingModel), 10);
        let err = generator.generate("q", "c").await.unwrap_err();
        assert!(matches!(err, RagError::Generation { .. }));
        assert_eq!(generator.stats().await.len, 0);
    }

    struct BlankModel;

    #[async_trait]
    impl LanguageModel for BlankModel {
        fn name(&self) -> &str {
            "blank"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            Ok("   ".into())
        }
    }

    #[tokio::test]
    async fn blank_completion_is_an_error() {
        let generator = AnswerGenerator::new(Arc::new(BlankModel), 10);
        assert!(matches!(generator.generate("q", "c").await, Err(RagError::Generation { .. })));
    }
}
