pub mod app;
pub mod backend;
pub mod config;
pub mod indexer;
pub mod model;
pub mod search;
pub mod storage;
pub mod sync;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use app::AppContext;
use model::types::SearchResult;

/// Progress bar resolution; the engine publishes fractions in `[0, 1]`.
const PROGRESS_TICKS: u64 = 1000;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "iris",
    version,
    about = "Local AI image indexing and search"
)]
pub struct Cli {
    /// Override the data dir (settings, metadata db, vector index)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize a folder into the index (add, refresh, remove)
    Index {
        folder: PathBuf,
    },
    /// Remove every indexed image under a folder
    Unindex {
        folder: PathBuf,
    },
    /// Search the index
    Search {
        /// Query text (semantic), or the tag substring with --tag-only
        query: String,

        /// Tag filter; combines with the query into a hybrid search
        #[arg(long)]
        tag: Option<String>,

        /// Maximum number of semantic results
        #[arg(long, default_value_t = search::DEFAULT_TOP_K)]
        top_k: usize,

        /// Tag-substring search only, no embedding involved
        #[arg(long, default_value_t = false)]
        tag_only: bool,
    },
    /// List every indexed image
    Images,
    /// Show or replace the tags of one indexed image
    Tags {
        path: PathBuf,

        /// Replacement tags, comma-separated
        #[arg(long, value_delimiter = ',')]
        set: Option<Vec<String>>,
    },
    /// List registered models, or switch the active one
    Models {
        /// Set the active model by name
        #[arg(long)]
        set: Option<String>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let ctx = AppContext::open(&data_dir)?;

    match cli.command {
        Commands::Index { folder } => run_sync_job(&ctx, &folder, JobKind::Index),
        Commands::Unindex { folder } => run_sync_job(&ctx, &folder, JobKind::Unindex),
        Commands::Search {
            query,
            tag,
            top_k,
            tag_only,
        } => run_search(&ctx, &query, tag.as_deref(), top_k, tag_only),
        Commands::Images => run_images(&ctx),
        Commands::Tags { path, set } => run_tags(&ctx, &path, set),
        Commands::Models { set } => run_models(&ctx, set.as_deref()),
    }
}

pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = dotenvy::var("IRIS_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    directories::ProjectDirs::from("com", "local-image-search", "local-image-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("iris-data"))
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Index,
    Unindex,
}

/// Drive one sync job on a worker thread while a progress bar observes it.
fn run_sync_job(ctx: &AppContext, folder: &Path, kind: JobKind) -> Result<()> {
    // The path string is the identity key, so resolve to an absolute form
    // first. A folder that does not exist is still handed to the engine,
    // which reports it through the status channel.
    let folder = fs::canonicalize(folder).unwrap_or_else(|_| folder.to_path_buf());

    let bar = ProgressBar::new(PROGRESS_TICKS);
    bar.set_style(ProgressStyle::with_template(
        "{bar:32.cyan/blue} {percent:>3}% {wide_msg}",
    )?);

    let observed = Arc::clone(&ctx.sync);
    let observer_bar = bar.clone();
    let observer = ctx.sync.subscribe(move || {
        let snap = observed.snapshot();
        observer_bar.set_position((snap.progress * PROGRESS_TICKS as f32) as u64);
        observer_bar.set_message(snap.status);
    });

    let worker_sync = Arc::clone(&ctx.sync);
    let worker_folder = folder.clone();
    let started = std::thread::spawn(move || match kind {
        JobKind::Index => worker_sync.start_indexing(&worker_folder),
        JobKind::Unindex => worker_sync.unindex_folder(&worker_folder),
    })
    .join()
    .map_err(|_| anyhow!("indexing thread panicked"))?;

    ctx.sync.unsubscribe(observer);
    let snap = ctx.sync.snapshot();
    bar.finish_with_message(snap.status.clone());

    if !started {
        println!("Another indexing job is already running; nothing was done.");
    }
    Ok(())
}

fn run_search(
    ctx: &AppContext,
    query: &str,
    tag: Option<&str>,
    top_k: usize,
    tag_only: bool,
) -> Result<()> {
    let results = if tag_only {
        ctx.search.search_by_tag(query)?
    } else if let Some(tag_filter) = tag {
        let hybrid = ctx.search.search_hybrid(query, tag_filter, top_k)?;
        search::merge_hybrid(&hybrid)
    } else {
        ctx.search.search_semantic(query, top_k)?
    };

    if results.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for result in &results {
        print_result(result);
    }
    println!("{} result(s)", results.len());
    Ok(())
}

fn run_images(ctx: &AppContext) -> Result<()> {
    let images = ctx.metadata.get_all_images()?;
    for image in &images {
        print_result(image);
    }
    println!("{} image(s) indexed", images.len());
    Ok(())
}

fn run_tags(ctx: &AppContext, path: &Path, set: Option<Vec<String>>) -> Result<()> {
    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let record = ctx
        .metadata
        .get_image(&path)?
        .with_context(|| format!("not indexed: {}", path.display()))?;

    match set {
        Some(tags) => {
            let tags: Vec<String> = tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            ctx.metadata.update_tags(&path, &tags)?;
            println!("{}: {}", path.display(), tags.join(", "));
        }
        None => {
            println!("{}: {}", path.display(), record.tags.join(", "));
        }
    }
    Ok(())
}

fn run_models(ctx: &AppContext, set: Option<&str>) -> Result<()> {
    if let Some(name) = set {
        ctx.set_active_model(name)?;
        println!("Active model set to {name}");
        return Ok(());
    }

    let active = ctx.models.model_name();
    for registered in backend::registry::REGISTERED_BACKENDS {
        let marker = if registered.name == active { "*" } else { " " };
        let mut line = format!("{marker} {:<14} {}", registered.name, registered.description);
        if registered.requires_endpoint {
            line.push_str(" [needs endpoint]");
        }
        println!("{line}");
    }
    Ok(())
}

fn print_result(result: &SearchResult) {
    let tags = if result.tags.is_empty() {
        style("(no tags)").dim().to_string()
    } else {
        style(result.tags.join(", ")).green().to_string()
    };
    let stamp = if result.indexed_at.is_empty() {
        String::new()
    } else {
        format!("  {}", style(&result.indexed_at).dim())
    };
    println!("{}  {tags}{stamp}", style(result.path.display()).bold());
}
