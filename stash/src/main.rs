use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stash_core::{Outcome, Report, Store, StoreConfig};
use tracing_subscriber::EnvFilter;

/// Stash - a deduplicating, content-addressed file store
#[derive(Parser)]
#[command(name = "stash")]
#[command(about = "Deduplicating file store with a SQLite catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository location
    #[arg(short, long)]
    repository: PathBuf,

    /// Chunk size in bytes
    #[arg(
        long,
        default_value_t = stash_core::DEFAULT_CHUNK_SIZE as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    chunk_size: u64,

    /// Width of a digest path segment in the data directory
    #[arg(
        long,
        default_value_t = stash_core::DEFAULT_PATH_BREAK as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    path_break: u64,

    /// Log informational messages
    #[arg(short, long)]
    verbose: bool,

    /// Log debug messages
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the repository
    Init,

    /// Add file(s) to the repository
    Add {
        /// Files to add
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Get file(s) from the repository
    Get {
        /// Destination paths; the basename selects the stored file
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete file(s) from the repository
    Remove {
        /// Files to remove (by basename)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List files in the repository
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = StoreConfig {
        chunk_size: cli.chunk_size as usize,
        path_break: cli.path_break as usize,
        ..StoreConfig::default()
    };

    let failures = match cli.command {
        Commands::Init => cmd_init(&cli.repository, config).await?,
        Commands::Add { files } => cmd_add(&cli.repository, config, files).await?,
        Commands::Get { files } => cmd_get(&cli.repository, config, files).await?,
        Commands::Remove { files } => cmd_remove(&cli.repository, config, files).await?,
        Commands::List => cmd_list(&cli.repository, config).await?,
    };

    if failures > 0 {
        // Per-file errors were already reported; only the exit status
        // is left to signal.
        std::process::exit(1);
    }

    Ok(())
}

async fn open_store(repository: &PathBuf, config: StoreConfig) -> Result<Store> {
    Store::open(repository, config).await.with_context(|| {
        format!(
            "Failed to open the repository at {}. Is it initialized?",
            repository.display()
        )
    })
}

async fn cmd_init(repository: &PathBuf, config: StoreConfig) -> Result<usize> {
    let store = Store::init(repository, config).await.with_context(|| {
        format!(
            "Failed to initialize the repository at {}",
            repository.display()
        )
    })?;
    store.close().await;

    println!("Initialized repository at {}", repository.display());
    Ok(0)
}

async fn cmd_add(repository: &PathBuf, config: StoreConfig, files: Vec<PathBuf>) -> Result<usize> {
    let store = open_store(repository, config).await?;
    let reports = store.add(&files).await;
    store.close().await;

    Ok(report_outcomes(&reports))
}

async fn cmd_get(repository: &PathBuf, config: StoreConfig, files: Vec<PathBuf>) -> Result<usize> {
    let store = open_store(repository, config).await?;
    let reports = store.get(&files).await;
    store.close().await;

    Ok(report_outcomes(&reports))
}

async fn cmd_remove(
    repository: &PathBuf,
    config: StoreConfig,
    files: Vec<PathBuf>,
) -> Result<usize> {
    let store = open_store(repository, config).await?;
    let reports = store.remove(&files).await;
    store.close().await;

    Ok(report_outcomes(&reports))
}

async fn cmd_list(repository: &PathBuf, config: StoreConfig) -> Result<usize> {
    let store = open_store(repository, config).await?;
    let names = store.list().await.context("Failed to list files")?;
    store.close().await;

    for name in names {
        println!("{name}");
    }

    Ok(0)
}

/// Print per-file outcomes and return the number of unexpected failures.
///
/// Duplicate and not-found are normal per-item results, not failures;
/// they never affect the exit status.
fn report_outcomes(reports: &[Report]) -> usize {
    let mut failures = 0;

    for report in reports {
        match &report.outcome {
            Outcome::Added | Outcome::Retrieved | Outcome::Removed => {}
            Outcome::Duplicate => {
                println!("{} is already in the repository.", report.name);
            }
            Outcome::NotFound => {
                println!("{} is not in the repository.", report.name);
            }
            Outcome::Failed(e) => {
                eprintln!("{}: {}", report.name, e);
                failures += 1;
            }
        }
    }

    failures
}
