use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::output;
use cli::watch::WatchScheduler;
use organizer_core::config::{self, AppConfig, Layout};
use organizer_core::indexer::IndexStore;
use organizer_core::pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smart-organizer")]
#[command(about = "Sorts files into category folders, labelled by content", long_about = None)]
struct Cli {
    /// Path to a config file (toml, yaml or json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Organize every loose file under a directory once
    Organize {
        /// Directory to sweep; defaults to the configured watch directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Organize the directory into itself
        #[arg(long, default_value_t = false)]
        in_place: bool,
        /// Skip content classification
        #[arg(long, default_value_t = false)]
        no_ai: bool,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Organize new files as they appear, until Ctrl-C
    Watch {
        /// Directory to watch; defaults to the configured watch directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Search the file index
    Search {
        /// Words to look for in labels, categories and paths
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show index totals
    Stats {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = config::load(cli.config.as_deref()).context("load configuration")?;

    match cli.command {
        Commands::Organize {
            dir,
            in_place,
            no_ai,
            json,
        } => run_organize(cfg, dir, in_place, no_ai, json).await,
        Commands::Watch { dir } => run_watch(cfg, dir).await,
        Commands::Search { query, limit, json } => run_search(cfg, query.join(" "), limit, json).await,
        Commands::Stats { json } => run_stats(cfg, json).await,
    }
}

fn with_watch_root(cfg: AppConfig, dir: Option<PathBuf>, in_place: bool) -> AppConfig {
    match (dir, in_place) {
        (Some(dir), true) => cfg.in_place(dir),
        (None, true) => {
            let dir = cfg.watch_directory.clone();
            cfg.in_place(dir)
        }
        (Some(dir), false) => AppConfig {
            watch_directory: dir,
            ..cfg
        },
        (None, false) => cfg,
    }
}

async fn run_organize(
    cfg: AppConfig,
    dir: Option<PathBuf>,
    in_place: bool,
    no_ai: bool,
    json: bool,
) -> Result<()> {
    let cfg = with_watch_root(cfg, dir, in_place);
    if !cfg.watch_directory.is_dir() {
        anyhow::bail!("{} is not a directory", cfg.watch_directory.display());
    }
    let use_ai = cfg.use_ai && !no_ai;
    let cfg = Arc::new(cfg.with_ai(use_ai));
    if let Layout::InPlace { root } = cfg.layout() {
        info!(root = %root.display(), "organizing in place");
    }
    let organizer = Arc::new(pipeline::build_organizer(cfg.clone()).await?);
    let summary = pipeline::run_batch(
        organizer,
        &cfg.watch_directory,
        use_ai,
        CancellationToken::new(),
    )
    .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_batch(&summary, &cfg.organized_directory);
    }
    Ok(())
}

async fn run_watch(cfg: AppConfig, dir: Option<PathBuf>) -> Result<()> {
    let cfg = Arc::new(with_watch_root(cfg, dir, false));
    let use_ai = cfg.use_ai;
    let organizer = Arc::new(pipeline::build_organizer(cfg.clone()).await?);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = WatchScheduler::new(organizer, use_ai)?
        .with_reporter(tx)
        .start(&cfg.watch_directory)?;
    println!(
        "Watching {} (Ctrl-C to stop)",
        cfg.watch_directory.display()
    );

    let output_root = cfg.organized_directory.clone();
    let printer = tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            println!("{}", output::outcome_line(&outcome, &output_root));
        }
    });

    tokio::signal::ctrl_c().await.context("listen for Ctrl-C")?;
    println!("Stopping...");
    handle.stop().await?;
    let _ = printer.await;
    Ok(())
}

async fn open_index(cfg: &AppConfig) -> Result<Option<IndexStore>> {
    let path = cfg.index_path();
    if !path.exists() {
        println!("No index found at {}", path.display());
        return Ok(None);
    }
    let index = IndexStore::open(&path)
        .await
        .with_context(|| format!("open index {}", path.display()))?;
    Ok(Some(index))
}

async fn run_search(cfg: AppConfig, query: String, limit: usize, json: bool) -> Result<()> {
    let Some(index) = open_index(&cfg).await? else {
        return Ok(());
    };
    let hits = index.search(&query, limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No files match {query:?}");
    } else {
        println!("{}", output::search_table(&hits));
    }
    Ok(())
}

async fn run_stats(cfg: AppConfig, json: bool) -> Result<()> {
    let Some(index) = open_index(&cfg).await? else {
        return Ok(());
    };
    let stats = index.stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        output::print_stats(&stats);
    }
    Ok(())
}
