//! Building the remote collaborators a [`Session`](crate::Session) talks to.

use std::sync::Arc;

use crate::config::{Credentials, RagConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generation::LanguageModel;
use crate::vectorstore::VectorDatabase;

/// The three collaborators of a session.
#[derive(Clone)]
pub struct Backends {
    /// Embedding model; wrapped in a [`CachedEmbedder`](crate::CachedEmbedder)
    /// by the session.
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// Vector database hosting the index.
    pub database: Arc<dyn VectorDatabase>,
    /// Chat-completion model.
    pub model: Arc<dyn LanguageModel>,
}

/// Turns credentials and configuration into [`Backends`].
pub trait Connector: Send + Sync {
    /// Build the collaborators. Must not perform network round trips.
    fn connect(&self, credentials: &Credentials, config: &RagConfig) -> Result<Backends>;
}

/// Hands out the same pre-built [`Backends`] on every call.
///
/// Used for offline runs and tests.
#[derive(Clone)]
pub struct StaticConnector {
    backends: Backends,
}

impl StaticConnector {
    /// Wrap existing collaborators.
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }
}

impl Connector for StaticConnector {
    fn connect(&self, _credentials: &Credentials, _config: &RagConfig) -> Result<Backends> {
        Ok(self.backends.clone())
    }
}

#[cfg(all(feature = "openai", feature = "pinecone"))]
pub use remote::RemoteConnector;

#[cfg(all(feature = "openai", feature = "pinecone"))]
mod remote {
    use std::sync::Arc;

    use tracing::debug;

    use super::{Backends, Connector};
    use crate::chat::{DEFAULT_CHAT_MODEL, GROQ_API_BASE, OpenAiCompatibleChatModel};
    use crate::config::{Credentials, RagConfig};
    use crate::error::Result;
    use crate::openai::{
        DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDINGS_URL,
        HttpEmbeddingProvider,
    };
    use crate::pinecone::PineconeVectorDatabase;

    /// Connects to an OpenAI-compatible embeddings server, Pinecone, and an
    /// OpenAI-compatible chat endpoint (Groq by default).
    ///
    /// The LLM key authenticates the chat endpoint and the vector database key
    /// authenticates Pinecone. The embeddings server gets its own optional key.
    #[derive(Debug, Clone)]
    pub struct RemoteConnector {
        embedding_url: String,
        embedding_model: String,
        embedding_api_key: Option<String>,
        embedding_batch_size: usize,
        chat_base_url: String,
        chat_model: String,
    }

    impl Default for RemoteConnector {
        fn default() -> Self {
            Self {
                embedding_url: DEFAULT_EMBEDDINGS_URL.into(),
                embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
                embedding_api_key: None,
                embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
                chat_base_url: GROQ_API_BASE.into(),
                chat_model: DEFAULT_CHAT_MODEL.into(),
            }
        }
    }

    impl RemoteConnector {
        /// Set the embeddings endpoint URL.
        pub fn with_embedding_url(mut self, url: impl Into<String>) -> Self {
            self.embedding_url = url.into();
            self
        }

        /// Set the embedding model name.
        pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
            self.embedding_model = model.into();
            self
        }

        /// Bearer token for the embeddings endpoint.
        pub fn with_embedding_api_key(mut self, key: impl Into<String>) -> Self {
            let key = key.into();
            self.embedding_api_key = if key.trim().is_empty() { None } else { Some(key) };
            self
        }

        /// Set how many passages go into one embeddings request.
        pub fn with_embedding_batch_size(mut self, batch_size: usize) -> Self {
            self.embedding_batch_size = batch_size;
            self
        }

        /// Set the chat-completion API base URL.
        pub fn with_chat_base_url(mut self, url: impl Into<String>) -> Self {
            self.chat_base_url = url.into();
            self
        }

        /// Set the chat model name.
        pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
            self.chat_model = model.into();
            self
        }
    }

    impl Connector for RemoteConnector {
        fn connect(&self, credentials: &Credentials, config: &RagConfig) -> Result<Backends> {
            let mut embedder = HttpEmbeddingProvider::new()
                .with_url(&self.embedding_url)
                .with_model(&self.embedding_model)
                .with_dimensions(config.dimension)
                .with_batch_size(self.embedding_batch_size);
            if let Some(key) = &self.embedding_api_key {
                embedder = embedder.with_api_key(key);
            }
            let database = PineconeVectorDatabase::new(&credentials.vector_db_api_key)?;
            let model = OpenAiCompatibleChatModel::new(&credentials.llm_api_key, &self.chat_base_url)?
                .with_model(&self.chat_model);

            debug!(
                embedding_url = %self.embedding_url,
                chat_base_url = %self.chat_base_url,
                chat_model = %self.chat_model,
                "built remote backends"
            );
            Ok(Backends {
                embedder: Arc::new(embedder),
                database: Arc::new(database),
                model: Arc::new(model),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::error::RagError;

        #[test]
        fn blank_secrets_are_rejected_when_building_clients() {
            let config = RagConfig::default();
            let connector = RemoteConnector::default();
            let err = connector.connect(&Credentials::new("gsk", ""), &config).err().unwrap();
            assert!(matches!(err, RagError::Configuration(_)));
        }

        #[test]
        fn embedder_uses_configured_dimension() {
            let config = RagConfig::builder().dimension(768).build().unwrap();
            let backends = RemoteConnector::default()
                .with_chat_model("llama-3.1-8b-instant")
                .connect(&Credentials::new("gsk", "pc"), &config)
                .unwrap();
            assert_eq!(backends.embedder.dimensions(), 768);
            assert_eq!(backends.model.name(), "llama-3.1-8b-instant");
        }
    }
}
