//! Chat-completion client for OpenAI-compatible endpoints (Groq by default).
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::{ChatMessage, ChatRequest, LanguageModel};
use crate::openai::error_detail;

/// Groq's OpenAI-compatible API base.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "mixtral-8x7b-32768";

/// A [`LanguageModel`] that calls `{base_url}/chat/completions`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::chat::OpenAiCompatibleChatModel;
///
/// let model = OpenAiCompatibleChatModel::groq(std::env::var("GROQ_API_KEY")?)?
///     .with_model("llama-3.1-8b-instant");
/// ```
pub struct OpenAiCompatibleChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleChatModel {
    /// Create a client for `base_url` authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the API key is blank.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration("chat API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    /// Create a Groq client.
    pub fn groq(api_key: impl Into<String>) -> Result<Self> {
        Self::new(api_key, GROQ_API_BASE)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn generation_error(&self, message: String) -> RagError {
        RagError::Generation { model: self.model.clone(), message }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "sending chat completion"
        );

        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.model, error = %e, "request failed");
                self.generation_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(model = %self.model, %status, "API error");
            return Err(
                self.generation_error(format!("API returned {status}: {}", error_detail(body)))
            );
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            error!(model = %self.model, error = %e, "failed to parse response");
            self.generation_error(format!("failed to parse response: {e}"))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.generation_error("API returned no completion choices".into()))
    }
}
