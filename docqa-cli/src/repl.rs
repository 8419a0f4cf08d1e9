use std::path::PathBuf;

use anyhow::Result;
use docqa_rag::{IngestMode, Role, Session};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use rustyline::history::History;
use tracing::debug;

use crate::{ingest_file, print_answer, print_sources};

#[derive(Debug, PartialEq)]
enum Command {
    Ask(String),
    Load(PathBuf),
    TopK(Option<usize>),
    Mode(Option<IngestMode>),
    History,
    Sources,
    ClearCache,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Ask(line.to_string());
    };
    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let arg = arg.trim();
    match name {
        "load" | "l" if !arg.is_empty() => Command::Load(PathBuf::from(arg)),
        "top-k" | "k" => Command::TopK(arg.parse().ok()),
        "mode" => Command::Mode(match arg {
            "overwrite" => Some(IngestMode::Overwrite),
            "replace" | "replace-stale" => Some(IngestMode::ReplaceStale),
            _ => None,
        }),
        "history" | "h" => Command::History,
        "sources" | "s" => Command::Sources,
        "clear-cache" => Command::ClearCache,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Add `line` to the prompt history. Failures only cost arrow-key recall.
fn remember<H: History>(history: &mut H, line: &str) -> bool {
    match history.add(line) {
        Ok(added) => added,
        Err(e) => {
            debug!(error = %e, "failed to record prompt history");
            false
        }
    }
}

fn print_help() {
    println!("Type a question, or one of:");
    println!("  :load <path>        ingest a document");
    println!("  :top-k <1-10>       passages retrieved per question");
    println!("  :mode <overwrite|replace>");
    println!("                      how re-ingesting treats leftover passages");
    println!("  :history            show the conversation");
    println!("  :sources            passages behind the last answer");
    println!("  :clear-cache        forget memoized embeddings, retrievals, and answers");
    println!("  :quit               exit");
}

/// Read questions and commands until EOF or `:quit`.
///
/// Failed actions are reported and the session stays usable.
pub async fn run(mut session: Session) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut top_k = session.config().top_k;

    println!("docqa {} (index '{}')", env!("CARGO_PKG_VERSION"), session.config().index_name);
    match session.document() {
        Some(document) => println!("Loaded {document}. Ask a question, or :help."),
        None => println!("Load a document with :load <path>, or :help."),
    }

    loop {
        let line = match editor.readline("docqa> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        remember(editor.history_mut(), &line);

        match parse_command(&line) {
            Command::Ask(question) => match session.ask(&question, Some(top_k)).await {
                Ok(answer) => print_answer(&answer),
                Err(e) if e.is_recoverable() => eprintln!("Error: {e}"),
                Err(e) => return Err(e.into()),
            },
            Command::Load(path) => {
                if let Err(e) = ingest_file(&mut session, &path).await {
                    eprintln!("Error: {e:#}");
                }
            }
            Command::TopK(Some(k)) if (1..=docqa_rag::MAX_TOP_K).contains(&k) => {
                top_k = k;
                println!("top-k set to {k}");
            }
            Command::TopK(_) => eprintln!("top-k must be between 1 and {}", docqa_rag::MAX_TOP_K),
            Command::Mode(Some(mode)) => {
                session.set_ingest_mode(mode);
                println!("ingest mode set to {mode:?}");
            }
            Command::Mode(None) => eprintln!("mode must be 'overwrite' or 'replace'"),
            Command::History => {
                for turn in session.history() {
                    let speaker = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "docqa",
                    };
                    println!("{speaker}: {}", turn.text);
                }
            }
            Command::Sources => match session.last_question_matches() {
                Some(matches) => print_sources(matches),
                None => println!("No question answered yet."),
            },
            Command::ClearCache => {
                session.clear_caches().await;
                println!("Caches cleared.");
            }
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Unknown(line) => eprintln!("Unknown command '{line}'. Try :help."),
        }
    }

    Ok(())
}
