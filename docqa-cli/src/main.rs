use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser as _;
use docqa_rag::chat::OpenAiCompatibleChatModel;
use docqa_rag::{
    Answer, Backends, Connector, Credentials, HashingEmbeddingProvider, InMemoryVectorDatabase,
    IngestMode, RagConfig, RemoteConnector, RetrievalMatch, Session,
};
use tracing_subscriber::EnvFilter;

mod cli;
mod repl;

use cli::{Backend, Cli};

/// Hashing embedder and in-memory index; answers still come from the chat
/// endpoint.
struct LocalConnector {
    chat_base_url: String,
    chat_model: String,
}

impl Connector for LocalConnector {
    fn connect(
        &self,
        credentials: &Credentials,
        config: &RagConfig,
    ) -> docqa_rag::Result<Backends> {
        let model = OpenAiCompatibleChatModel::new(&credentials.llm_api_key, &self.chat_base_url)?
            .with_model(&self.chat_model);
        Ok(Backends {
            embedder: Arc::new(HashingEmbeddingProvider::new(config.dimension)?),
            database: Arc::new(InMemoryVectorDatabase::new()),
            model: Arc::new(model),
        })
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "docqa=debug,docqa_rag=debug" } else { "docqa=info,docqa_rag=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub(crate) async fn ingest_file(session: &mut Session, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let report = session.ingest(&bytes, &filename).await?;
    println!("Indexed {} passages from {}", report.chunk_count, report.filename);
    if !report.removed_ids.is_empty() {
        println!("Removed {} passages left by the previous document", report.removed_ids.len());
    }
    Ok(())
}

pub(crate) fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
}

pub(crate) fn print_sources(matches: &[RetrievalMatch]) {
    for (rank, m) in matches.iter().enumerate() {
        let text = m.text();
        let preview: String = text.chars().take(160).collect();
        let ellipsis = if text.chars().count() > 160 { "..." } else { "" };
        println!("[{}] passage {} (score {:.3})", rank + 1, m.id, m.score);
        println!("    {preview}{ellipsis}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = RagConfig::builder()
        .index_name(&cli.index)
        .top_k(usize::from(cli.top_k))
        .ready_timeout(Duration::from_secs(cli.ready_timeout))
        .build()?;

    let ingest_mode =
        if cli.replace_stale { IngestMode::ReplaceStale } else { IngestMode::Overwrite };
    let mut session = Session::new(config)?.with_ingest_mode(ingest_mode);

    let llm_api_key = cli.groq_api_key.clone().unwrap_or_default();
    let credentials = match cli.backend {
        Backend::Remote => {
            Credentials::new(llm_api_key, cli.pinecone_api_key.clone().unwrap_or_default())
        }
        // The in-memory index takes no key.
        Backend::Local => Credentials::new(llm_api_key, "local"),
    };

    let initialized = match cli.backend {
        Backend::Remote => {
            let mut connector = RemoteConnector::default()
                .with_embedding_url(&cli.embedding_url)
                .with_embedding_model(&cli.embedding_model)
                .with_embedding_batch_size(usize::from(cli.embedding_batch_size))
                .with_chat_base_url(&cli.chat_base_url)
                .with_chat_model(&cli.chat_model);
            if let Some(key) = &cli.embedding_api_key {
                connector = connector.with_embedding_api_key(key);
            }
            session.initialize(&credentials, &connector).await
        }
        Backend::Local => {
            let connector = LocalConnector {
                chat_base_url: cli.chat_base_url.clone(),
                chat_model: cli.chat_model.clone(),
            };
            session.initialize(&credentials, &connector).await
        }
    };
    initialized.context("failed to initialize session")?;
    tracing::info!(index = %cli.index, backend = ?cli.backend, "ready");

    if let Some(path) = &cli.file {
        ingest_file(&mut session, path).await?;
    }

    match &cli.question {
        Some(question) => {
            let answer = session.ask(question, None).await?;
            print_answer(&answer);
            println!();
            print_sources(&answer.matches);
            Ok(())
        }
        None => repl::run(session).await,
    }
}
