//! CLI 모듈
//!
//! space-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{
    ChatError, ChatSession, LoadedIndex, QueryContext, Role, MISSING_INDEX_MESSAGE,
    UNUSABLE_INDEX_MESSAGE,
};
use crate::config::Settings;
use crate::embedding::{EmbeddingProvider, OllamaEmbedding};
use crate::knowledge::{ChunkConfig, DocumentCatalog, IngestEvent, IngestPipeline, LanceVectorStore, VectorStore};
use crate::llm::{ChatModel, LanguageModel, OllamaChat};
use crate::source::WikipediaSource;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "space-rag")]
#[command(version, about = "Local RAG assistant for space exploration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the Wikipedia articles and rebuild the index (deletes the old one)
    Ingest,

    /// Interactive question answering
    Chat {
        /// Local model to use
        #[arg(short, long, value_enum, default_value_t = ChatModel::default())]
        model: ChatModel,
    },

    /// Answer a single question and exit
    Ask {
        /// Question to ask
        question: String,

        /// Local model to use
        #[arg(short, long, value_enum, default_value_t = ChatModel::default())]
        model: ChatModel,
    },

    /// Show configuration and index status
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest => cmd_ingest().await,
        Commands::Chat { model } => cmd_chat(model).await,
        Commands::Ask { question, model } => cmd_ask(&question, model).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
///
/// 실패는 전부 여기서 잡아 출력하고 정상 종료합니다.
async fn cmd_ingest() -> Result<()> {
    if let Err(e) = ingest().await {
        println!("An error occurred: {:#}", e);
    }
    Ok(())
}

async fn ingest() -> Result<()> {
    let settings = Settings::from_env()?;
    let chunk_config = ChunkConfig::new(settings.chunk_size, settings.chunk_overlap)?;

    println!("[*] Initializing embedding model ({})...", settings.embedding_model);
    let embedder = connect_embedder(&settings).await?;

    let source = WikipediaSource::new().context("Failed to create Wikipedia source")?;
    let pipeline = IngestPipeline::new(
        Box::new(source),
        embedder,
        chunk_config,
        &settings.persist_dir,
    );

    println!("[*] Loading documents from Wikipedia...");
    let report = pipeline.run(&settings.topics, &mut print_ingest_event).await?;

    println!();
    println!(
        "[OK] Done! {} chunks from {} documents indexed and saved to {}",
        report.indexed,
        report.documents,
        report.index_dir.display()
    );
    if !report.failed_topics.is_empty() {
        println!("     Skipped topics: {}", report.failed_topics.join(", "));
    }

    Ok(())
}

fn print_ingest_event(event: IngestEvent<'_>) {
    match event {
        IngestEvent::Loaded { topic, title } => println!("[OK] Loaded: {} ({})", topic, title),
        IngestEvent::LoadFailed { topic, error } => {
            println!("[!] Error loading {}: {:#}", topic, error)
        }
        IngestEvent::DocumentsLoaded(n) => println!("[*] Total documents loaded: {}", n),
        IngestEvent::ChunksCreated(n) => println!("[*] Created {} chunks.", n),
        IngestEvent::Embedding { chunks, model } => {
            println!("[*] Embedding {} chunks with {}...", chunks, model)
        }
        IngestEvent::Indexing(path) => println!(
            "[*] Indexing into {} (old index is removed first, this might take a minute)...",
            path.display()
        ),
    }
}

/// 대화 명령어 (chat)
async fn cmd_chat(model: ChatModel) -> Result<()> {
    let settings = Settings::from_env()?.with_chat_model(model);

    let Some(mut session) = open_session(&settings).await? else {
        return Ok(());
    };

    println!();
    println!("Space Exploration AI Assistant");
    println!("Ask a question about space exploration. /help for commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();

        if let Some(command) = line.strip_prefix('/') {
            match ReplCommand::parse(command) {
                ReplCommand::Quit => break,
                ReplCommand::Help => print_help(),
                ReplCommand::History => print_history(&session),
                ReplCommand::ShowModel => {
                    println!(
                        "Current model: {}",
                        session.model_name().unwrap_or("(not connected)")
                    );
                    println!("Available: {}", model_choices());
                }
                ReplCommand::SwitchModel(model) => {
                    let connected = connect_model(&settings, model).await;
                    session.set_model(connected);
                }
                ReplCommand::Unknown(text) => {
                    println!("[!] Unknown command: /{} (try /help)", text)
                }
            }
            continue;
        }

        ask_in_session(&mut session, line).await;
    }

    println!("Bye.");
    Ok(())
}

/// 단일 질의 명령어 (ask)
async fn cmd_ask(question: &str, model: ChatModel) -> Result<()> {
    let settings = Settings::from_env()?.with_chat_model(model);

    let Some(mut session) = open_session(&settings).await? else {
        return Ok(());
    };

    ask_in_session(&mut session, question).await;
    Ok(())
}

/// 상태 명령어 (status)
///
/// 읽기 전용입니다. 인덱스 디렉토리에 아무것도 만들지 않습니다.
async fn cmd_status() -> Result<()> {
    let settings = Settings::from_env()?;

    println!("space-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] Index directory: {}", settings.persist_dir.display());
    println!("[*] Ollama: {}", settings.ollama_url);
    println!("[*] Embedding model: {}", settings.embedding_model);
    println!(
        "[*] Chunking: {} chars / overlap {} / k = {}",
        settings.chunk_size, settings.chunk_overlap, settings.retrieval_k
    );

    match LanceVectorStore::open_existing(&settings.persist_dir).await {
        Ok(Some(store)) => match store.count().await {
            Ok(count) => println!(
                "[OK] Vector index: {} chunks (dimension {})",
                count,
                store.dimension()
            ),
            Err(e) => println!("[!] Failed to count indexed chunks: {:#}", e),
        },
        Ok(None) => {
            println!("[!] {}", MISSING_INDEX_MESSAGE);
            return Ok(());
        }
        Err(e) => {
            println!("[!] {} ({:#})", UNUSABLE_INDEX_MESSAGE, e);
            return Ok(());
        }
    }

    let catalog = match DocumentCatalog::open_existing(&settings.persist_dir) {
        Ok(Some(catalog)) => catalog,
        Ok(None) => {
            println!("[!] No document catalog in the index directory.");
            return Ok(());
        }
        Err(e) => {
            println!("[!] Failed to open document catalog: {:#}", e);
            return Ok(());
        }
    };

    match catalog.stats() {
        Ok(stats) => println!(
            "[OK] Catalog: {} documents, {} chunks, {} chars ({})",
            stats.document_count,
            stats.chunk_count,
            stats.total_content_chars,
            stats.db_path.display()
        ),
        Err(e) => println!("[!] Failed to read catalog stats: {:#}", e),
    }

    match catalog.list() {
        Ok(entries) if entries.is_empty() => println!("[!] The catalog has no documents."),
        Ok(entries) => {
            println!();
            for entry in entries {
                println!("  #{:<3} [{}] {}", entry.id, entry.topic, entry.title);
                println!("        URL: {}", entry.source);
                println!(
                    "        {} | {} chars | {} chunks",
                    entry.ingested_at.format("%Y-%m-%d %H:%M"),
                    entry.content_chars,
                    entry.chunk_count
                );
                println!("        {}", truncate_text(&entry.summary, 100));
                println!();
            }
        }
        Err(e) => println!("[!] Failed to list catalog: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Session Helpers
// ============================================================================

/// 질의 세션 준비
///
/// 인덱스가 없거나 쓸 수 없으면 안내 메시지를 출력하고 `None`을 반환합니다 (검색 시도 없음).
/// 임베딩 모델 로드 실패는 치명적 에러입니다.
/// 언어 모델 연결 실패는 에러 메시지만 출력하고 모델 없는 세션을 만듭니다.
async fn open_session(settings: &Settings) -> Result<Option<ChatSession>> {
    let context = match QueryContext::load(settings, || connect_embedder(settings)).await? {
        LoadedIndex::Ready(context) => context,
        LoadedIndex::Missing => {
            println!("[!] {}", MISSING_INDEX_MESSAGE);
            return Ok(None);
        }
        LoadedIndex::Unusable(e) => {
            tracing::warn!("Unusable index at {}: {:#}", settings.persist_dir.display(), e);
            println!("[!] {} ({:#})", UNUSABLE_INDEX_MESSAGE, e);
            return Ok(None);
        }
    };

    let model = connect_model(settings, settings.chat_model).await;
    Ok(Some(ChatSession::new(context.retriever(), model)))
}

async fn connect_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = OllamaEmbedding::connect(&settings.ollama_url, &settings.embedding_model)
        .await
        .context("Failed to load embedding model")?;
    Ok(Arc::new(embedder))
}

/// 언어 모델 연결 (실패 시 `None`)
async fn connect_model(settings: &Settings, model: ChatModel) -> Option<Box<dyn LanguageModel>> {
    println!("[i] Ensure that `{}` is installed via Ollama.", model);

    match OllamaChat::connect(&settings.ollama_url, model).await {
        Ok(chat) => {
            println!("[OK] Using model: {}", chat.model());
            Some(Box::new(chat))
        }
        Err(e) => {
            println!(
                "[!] Error connecting to Ollama: {:#}. Make sure Ollama is running.",
                e
            );
            None
        }
    }
}

/// 질의 한 건 처리 및 출력
async fn ask_in_session(session: &mut ChatSession, query: &str) {
    if query.trim().is_empty() {
        return;
    }

    println!("[*] Searching the cosmos...");
    let mut on_token = |token: &str| {
        print!("{}", token);
        std::io::stdout().flush().ok();
    };

    match session.submit(query, &mut on_token).await {
        Ok(_) => println!("\n"),
        Err(ChatError::EmptyQuery) => {}
        Err(e) => println!("[!] {}\n", e),
    }
}

fn print_history(session: &ChatSession) {
    if session.turns().is_empty() {
        println!("(no messages yet)");
        return;
    }

    for turn in session.turns() {
        let label = match turn.role() {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("[{}] {}", label, turn.content());
        println!();
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /model           show current and available models");
    println!("  /model <name>    switch model ({})", model_choices());
    println!("  /history         show the conversation so far");
    println!("  /quit            exit");
}

fn model_choices() -> String {
    ChatModel::ALL
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// REPL Commands
// ============================================================================

/// 대화 중 슬래시 명령어
#[derive(Debug, PartialEq)]
enum ReplCommand {
    Quit,
    Help,
    History,
    ShowModel,
    SwitchModel(ChatModel),
    Unknown(String),
}

impl ReplCommand {
    /// `/` 뒤의 텍스트 파싱
    fn parse(input: &str) -> Self {
        let mut parts = input.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();

        match (name, arg) {
            ("quit" | "exit" | "q", _) => Self::Quit,
            ("help" | "h", _) => Self::Help,
            ("history", _) => Self::History,
            ("model", None) => Self::ShowModel,
            ("model", Some(arg)) => match ChatModel::from_name(arg) {
                Some(model) => Self::SwitchModel(model),
                None => Self::Unknown(input.trim().to_string()),
            },
            _ => Self::Unknown(input.trim().to_string()),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
