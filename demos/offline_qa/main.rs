//! # Offline QA Example
//!
//! Demonstrates a full session: initialize, ingest a document, ask questions,
//! then re-ingest a shorter document in both ingest modes.
//!
//! Uses `InMemoryVectorDatabase`, `HashingEmbeddingProvider`, and an
//! extractive `ClosestSentenceModel` so it runs with **zero API keys**.
//!
//! Run: `cargo run -p docqa-demos --example offline_qa`

use std::sync::Arc;

use docqa_rag::{
    Backends, ChatRequest, Credentials, HashingEmbeddingProvider, InMemoryVectorDatabase,
    IngestMode, LanguageModel, RagConfig, Session, StaticConnector,
};

// ---------------------------------------------------------------------------
// ClosestSentenceModel: answers with the context line sharing the most
// words with the question. A stand-in for a real chat model.
// ---------------------------------------------------------------------------

struct ClosestSentenceModel;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait::async_trait]
impl LanguageModel for ClosestSentenceModel {
    fn name(&self) -> &str {
        "closest-sentence"
    }

    async fn complete(&self, request: ChatRequest) -> docqa_rag::Result<String> {
        let prompt = request.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let (context, question) = prompt
            .strip_prefix("Context:\n")
            .and_then(|rest| rest.split_once("\n\nQuestion: "))
            .unwrap_or(("", prompt));
        let asked = words(question);

        let best = context
            .lines()
            .max_by_key(|line| words(line).iter().filter(|w| asked.contains(w)).count())
            .unwrap_or("I don't know.");
        Ok(best.to_string())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

const GUIDE: &str = "\
Rust is a systems programming language focused on safety, speed, and concurrency.

Memory safety comes from the ownership system, checked at compile time without a garbage collector.

Cargo is the Rust build tool and package manager.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -- 1. Configure and connect -------------------------------------------
    // The hashing embedder needs no model; the in-memory database becomes
    // ready immediately. Credentials are placeholders the offline backends
    // never send anywhere.
    let config = RagConfig::builder().index_name("demo").top_k(2).build()?;
    let database = Arc::new(InMemoryVectorDatabase::new());
    let connector = StaticConnector::new(Backends {
        embedder: Arc::new(HashingEmbeddingProvider::new(config.dimension)?),
        database: database.clone(),
        model: Arc::new(ClosestSentenceModel),
    });

    let mut session = Session::new(config)?;
    session.initialize(&Credentials::new("offline", "offline"), &connector).await?;
    println!("Session {}", session.phase());

    // -- 2. Ingest ------------------------------------------------------------
    let report = session.ingest(GUIDE.as_bytes(), "rust-guide.md").await?;
    println!("Ingested {} → {} passage(s)", report.filename, report.chunk_count);

    // -- 3. Ask ---------------------------------------------------------------
    for question in ["How does Rust achieve memory safety?", "What is Cargo?"] {
        let answer = session.ask(question, None).await?;
        println!("\nQ: {question}\nA: {}", answer.text);
        for m in &answer.matches {
            println!("   [score={:.3}] passage {}", m.score, m.id);
        }
    }

    // -- 4. Re-ingest a shorter document ----------------------------------------
    // In the default mode passages 1 and 2 of the guide stay in the index.
    session.ingest_text("Ferris is the unofficial Rust mascot.", "mascot.txt").await?;
    println!("\nAfter overwrite: {:?} records", database.len("demo").await);

    session.set_ingest_mode(IngestMode::ReplaceStale);
    let report = session.ingest_text("Ferris is the unofficial Rust mascot.", "mascot.txt").await?;
    println!(
        "After replace: {:?} records (removed {:?})",
        database.len("demo").await,
        report.removed_ids
    );

    println!("\n{} turns in history. Done.", session.history().len());
    Ok(())
}
