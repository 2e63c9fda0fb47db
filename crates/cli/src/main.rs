//! folio command-line entry point.
//!
//! Inspects and maintains a folio cache store. Logging goes to stderr so
//! command output on stdout stays machine-readable.

use anyhow::Result;
use clap::Parser;
use folio_core::{CacheConfig, CacheManager};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Inspect and maintain the folio content cache")]
#[command(version)]
struct Args {
    /// Override the database path from configuration
    #[arg(short, long)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();

    let mut config = CacheConfig::load()?;
    if let Some(db) = args.db {
        config.db_path = db;
    }

    tracing::debug!(db = %config.db_path.display(), max_mb = config.clamped_size_mb(), "opening cache");
    let cache = CacheManager::open(&config).await?;

    let output = commands::run(&cache, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
