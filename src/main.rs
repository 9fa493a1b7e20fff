use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use fts_chinese::config::{self, AppConfig};
use fts_chinese::search::{SearchMode, SearchRequest};
use fts_chinese::SearchEngine;
use state::AppState;

#[derive(Parser)]
#[command(name = "fts-chinese")]
#[command(about = "Chinese full-text search over Redis", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (created with defaults when missing)
    #[arg(short, long, env = "FTS_CONFIG")]
    config: Option<PathBuf>,

    /// Use an in-process store instead of Redis
    #[arg(long)]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve {
        /// Ingest this file before serving
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Ingest a file of `HSET "KEY" field "VALUE"` lines
    Ingest { file: PathBuf },
    /// Rebuild the global word-count set
    Wc {
        /// Print the most frequent words afterwards
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Reset visit counters on every document
    Reset,
    /// Print store status as JSON
    Status,
    /// Run one search and print the hits as JSON
    Search {
        query: String,
        /// Literal substring scan instead of token ranking
        #[arg(long)]
        scan: bool,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fts_chinese=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = path.unwrap_or_else(config::default_config_path);
    let mut app_config = config::load_config(&path).context("Failed to load configuration")?;
    app_config.apply_env_overrides().context("Bad environment override")?;
    Ok(app_config)
}

async fn build_engine(app_config: &AppConfig, memory: bool) -> anyhow::Result<SearchEngine> {
    if memory {
        tracing::warn!("Using in-process store; nothing is persisted");
        return Ok(SearchEngine::in_memory(&app_config.search)?);
    }
    SearchEngine::connect(&app_config.redis, &app_config.search)
        .await
        .with_context(|| format!("Failed to connect to {}", app_config.redis.redacted_url()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(app_config: AppConfig, engine: SearchEngine) -> anyhow::Result<()> {
    let bind_addr = app_config.get_bind_address();
    let app = api::router(Arc::new(AppState::new(engine, app_config)));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let app_config = load_config(cli.config)?;
    let engine = build_engine(&app_config, cli.memory).await?;

    match cli.command.unwrap_or(Commands::Serve { seed: None }) {
        Commands::Serve { seed } => {
            if let Some(file) = seed {
                engine.ingest_file(&file).await?;
            }
            serve(app_config, engine).await?;
        }
        Commands::Ingest { file } => {
            let report = engine.ingest_file(&file).await?;
            print_json(&report)?;
        }
        Commands::Wc { top } => {
            let tokens = engine.rebuild_word_counts().await?;
            tracing::info!("Word counts rebuilt for {} tokens", tokens);
            print_json(&engine.top_words(top).await?)?;
        }
        Commands::Reset => {
            let documents = engine.reset_visit_stats().await?;
            tracing::info!("Visit stats reset on {} documents", documents);
        }
        Commands::Status => {
            print_json(&engine.status().await?)?;
        }
        Commands::Search { query, scan, offset, limit } => {
            let mode = if scan { SearchMode::Scan } else { SearchMode::Facet };
            let mut request = SearchRequest::new(query, mode);
            request.offset = offset;
            request.limit = limit;
            print_json(&engine.search(&request).await?)?;
        }
    }

    Ok(())
}
