use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Ask questions about a PDF, DOCX, or text document.
#[derive(Debug, Parser)]
#[command(name = "docqa", version, about)]
pub struct Cli {
    /// Document to ingest before the first question.
    pub file: Option<PathBuf>,

    /// Ask one question, print the answer, and exit.
    #[arg(short, long, requires = "file")]
    pub question: Option<String>,

    /// Number of passages to retrieve per question (1-10).
    #[arg(short = 'k', long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub top_k: u8,

    /// Vector index name.
    #[arg(long, env = "DOCQA_INDEX", default_value = docqa_rag::DEFAULT_INDEX_NAME)]
    pub index: String,

    /// Where passages are embedded and stored.
    #[arg(long, value_enum, default_value_t = Backend::Remote)]
    pub backend: Backend,

    /// Delete passages left over from a longer previously ingested document.
    #[arg(long)]
    pub replace_stale: bool,

    /// Seconds to wait for a new index to become ready.
    #[arg(long, default_value_t = 60)]
    pub ready_timeout: u64,

    /// OpenAI-compatible embeddings endpoint.
    #[arg(long, env = "DOCQA_EMBEDDING_URL", default_value = docqa_rag::openai::DEFAULT_EMBEDDINGS_URL)]
    pub embedding_url: String,

    /// Embedding model name.
    #[arg(long, env = "DOCQA_EMBEDDING_MODEL", default_value = docqa_rag::openai::DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Bearer token for the embeddings endpoint.
    #[arg(long, env = "DOCQA_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    /// Passages per embeddings request.
    #[arg(long, env = "DOCQA_EMBEDDING_BATCH_SIZE", default_value_t = 32, value_parser = clap::value_parser!(u16).range(1..))]
    pub embedding_batch_size: u16,

    /// OpenAI-compatible chat API base URL.
    #[arg(long, env = "DOCQA_CHAT_BASE_URL", default_value = docqa_rag::chat::GROQ_API_BASE)]
    pub chat_base_url: String,

    /// Chat model name.
    #[arg(long, env = "DOCQA_CHAT_MODEL", default_value = docqa_rag::chat::DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// API key for the chat endpoint.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// API key for Pinecone. Not needed with `--backend local`.
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Embeddings server and Pinecone.
    Remote,
    /// Offline hashing embedder and an in-memory index.
    Local,
}
