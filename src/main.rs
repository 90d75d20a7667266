use std::path::PathBuf;
use std::sync::Arc;

use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use research_chat::api;
use research_chat::chat::{ChatSession, TurnOptions};
use research_chat::config::Config;
use research_chat::error::ChatError;
use research_chat::ingest;
use research_chat::llm::embeddings::{document_embedding_text, Embedder, HttpEmbedder};
use research_chat::llm::provider;
use research_chat::llm::rerank::{CrossEncoderClient, Reranker};
use research_chat::prompt::build_prompt;
use research_chat::search::bm25::Bm25Index;
use research_chat::search::pipeline::{PipelineCaps, RetrievalPipeline};
use research_chat::state::AppState;
use research_chat::store::DocumentStore;

#[derive(Parser, Debug)]
#[command(
    name = "research-chat",
    version,
    about = "Chat over a corpus of research abstracts with hybrid retrieval"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a record file and build the datastore and search index
    Index {
        /// Path to the record file (NAME:/TITLE:/ABSTRACT: format)
        #[arg(short, long)]
        records: PathBuf,

        /// Datastore directory
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Run one retrieval + generation turn from the command line
    Query {
        /// The question; nothing happens without one
        query: Option<String>,

        /// Datastore directory
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Number of documents to retrieve
        #[arg(short = 'k', long, default_value = "8")]
        top_k: usize,

        /// Minimum rerank score for a document to be kept
        #[arg(short, long, default_value = "0.0")]
        cutoff: f32,

        /// Skip cross-encoder re-ranking
        #[arg(long)]
        no_rerank: bool,

        /// Keep raw retriever scores instead of rescaling into [0,1]
        #[arg(long)]
        no_scale: bool,

        /// Print the assembled prompt before the answer
        #[arg(long)]
        show_prompt: bool,

        /// Generation model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Serve the chat web UI and API
    Serve {
        /// Datastore directory
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        if let Some(chat_err) = e.downcast_ref::<ChatError>() {
            eprintln!("Error: {chat_err}");
            std::process::exit(chat_err.exit_code());
        }
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let default_level = if std::env::var("DEBUG").as_deref() == Ok("1") {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Index { records, store } => cmd_index(records, store).await,
        Commands::Query {
            query,
            store,
            top_k,
            cutoff,
            no_rerank,
            no_scale,
            show_prompt,
            model,
        } => {
            cmd_query(
                query,
                store,
                top_k,
                cutoff,
                no_rerank,
                no_scale,
                show_prompt,
                model,
            )
            .await
        }
        Commands::Serve { store, bind } => cmd_serve(store, bind).await,
    }
}

fn load_config(store_override: Option<PathBuf>) -> Config {
    let mut config = Config::from_env();
    if let Some(dir) = store_override {
        config.store_dir = dir;
    }
    config
}

// ─── index ───────────────────────────────────────────────

async fn cmd_index(records: PathBuf, store: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(store);

    let mut docs = ingest::parse_records_file(&records)?;
    tracing::info!("Parsed {} records from {}", docs.len(), records.display());

    let store = DocumentStore::open(&config.store_dir)?;
    docs.retain(|d| store.get(&d.id).is_none());
    if docs.is_empty() {
        tracing::info!("Nothing new to index");
        return Ok(());
    }

    // Embed at index time so serve-time queries only need one embedding
    // call. An unreachable embedding backend degrades to a lexical-only
    // store rather than failing the build.
    let client = reqwest::Client::new();
    let embedder = HttpEmbedder::new(client, config.llm.clone());
    let texts: Vec<String> = docs.iter().map(document_embedding_text).collect();
    match embedder.embed_batch(&texts).await {
        Ok(embeddings) if embeddings.len() == docs.len() => {
            for (doc, embedding) in docs.iter_mut().zip(embeddings) {
                doc.embedding = Some(embedding);
            }
        }
        Ok(_) => tracing::warn!("Embedding count mismatch, storing without embeddings"),
        Err(e) => tracing::warn!("Embedding failed, storing without embeddings: {e}"),
    }

    let bm25 = Bm25Index::open_or_create(&config.index_dir())?;
    bm25.index_documents(&docs)?;

    let written = store.write_documents(docs);
    store.save_to_disk()?;
    tracing::info!(
        "Indexed {} documents into {}",
        written,
        config.store_dir.display()
    );
    Ok(())
}

// ─── query ───────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
async fn cmd_query(
    query: Option<String>,
    store: Option<PathBuf>,
    top_k: usize,
    cutoff: f32,
    no_rerank: bool,
    no_scale: bool,
    show_prompt: bool,
    model: Option<String>,
) -> anyhow::Result<()> {
    let query = match query {
        Some(q) => q,
        None => return Ok(()),
    };
    let config = load_config(store);

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let resolved = provider::resolve(&client, &config.llm).await?;

    let store = Arc::new(DocumentStore::open(&config.store_dir)?);
    let bm25 = Arc::new(Bm25Index::open_or_create(&config.index_dir())?);
    let embedder: Arc<dyn Embedder> =
        Arc::new(HttpEmbedder::new(client.clone(), config.llm.clone()));
    let reranker: Option<Arc<dyn Reranker>> = if config.reranker.base_url.is_some() {
        Some(Arc::new(CrossEncoderClient::new(
            client.clone(),
            config.reranker.clone(),
        )))
    } else {
        None
    };

    let mut caps = PipelineCaps::hybrid();
    if no_rerank {
        caps = caps.without_rerank();
    }
    let pipeline =
        Arc::new(RetrievalPipeline::new(store, bm25, embedder, reranker, caps).with_scale(!no_scale));

    let mut session = ChatSession::new(
        client,
        config.llm.clone(),
        config.generation.clone(),
        pipeline,
        resolved.model.clone(),
        config.moderation_enabled,
    );

    let opts = TurnOptions {
        model,
        ..TurnOptions::from_defaults(top_k, cutoff, &config.generation)
    };
    let outcome = session.turn(&query, &opts).await?;

    let width = terminal_width();
    for scored in &outcome.context {
        println!(
            "{}",
            format_result_line(
                width,
                scored.score,
                scored.doc.researcher_name().as_deref(),
                &scored.doc.content
            )
        );
    }

    if show_prompt {
        let docs: Vec<_> = outcome.context.iter().map(|c| c.doc.clone()).collect();
        let prompt = build_prompt(Some(&query), &docs)?;
        println!("\n{prompt}\n");
    }

    println!("\n{}", outcome.answer);
    Ok(())
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(80)
}

/// One result line: five-decimal score, then the attributed text collapsed
/// to a single line and cut to the terminal width.
fn format_result_line(width: usize, score: f32, name: Option<&str>, content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let text = match name {
        Some(n) => format!("{n}:{collapsed}"),
        None => collapsed,
    };

    let budget = width.saturating_sub(8 + 3 + 1);
    let text = if text.chars().count() > budget {
        let cut: String = text.chars().take(budget).collect();
        format!("{cut}...")
    } else {
        text
    };
    format!("{score:.5} {text}")
}

// ─── serve ───────────────────────────────────────────────

async fn cmd_serve(store: Option<PathBuf>, bind: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(store);
    if let Some(addr) = bind {
        config.bind_addr = addr;
    }
    tracing::info!("Datastore: {}", config.store_dir.display());
    tracing::info!(
        "LLM provider: {} ({})",
        config.llm.provider,
        config.llm.base_url
    );

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let resolved = provider::resolve(&client, &config.llm).await?;

    let state = AppState::new(config.clone(), resolved)?;
    tracing::info!("{} documents loaded", state.store.count_documents());

    // No CORS layer: the SPA is served from the same origin so cross-origin
    // access is unnecessary.
    let app = Router::new()
        .route("/", get(serve_index))
        .route("/api/chat", post(api::chat::chat))
        .route("/api/models", get(api::models::list_models))
        .with_state(state)
        .fallback(get(serve_index));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}
