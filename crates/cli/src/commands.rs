//! Subcommand implementations.
//!
//! Each command returns a JSON value that `main` prints to stdout.

use clap::Subcommand;
use folio_core::CacheManager;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show row counts, accounted size, and budget
    Stats,
    /// Compact the store file
    Vacuum,
    /// Evict oldest content until the store fits the budget
    Evict,
    /// Delete every cached row
    Clear,
    /// Prune collections not named by --keep (the pinned alias is always kept)
    Minimize {
        /// Live collection alias; repeat for each alias
        #[arg(long = "keep")]
        keep: Vec<String>,
    },
    /// Print a cached content item
    Get { uuid: String },
    /// Print a window of a collection
    Window {
        alias: String,
        #[arg(long, default_value_t = 0)]
        from: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Print the earliest expiry of a collection
    Expiration { alias: String },
    /// Print the navigation snapshot for a hierarchy key
    Nav { key: String },
}

pub async fn run(cache: &CacheManager, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::Stats => to_value(cache.stats().await?)?,
        Command::Vacuum => {
            cache.vacuum().await?;
            json!({ "accounted_bytes": cache.accounted_size().await? })
        }
        Command::Evict => to_value(cache.evict_to_budget().await?)?,
        Command::Clear => to_value(cache.clear_all().await?)?,
        Command::Minimize { keep } => to_value(cache.minimize_collections(&keep).await?)?,
        Command::Get { uuid } => to_value(cache.get_content_item(&uuid).await)?,
        Command::Window { alias, from, size } => to_value(cache.get_collection_window(&alias, from, size).await)?,
        Command::Expiration { alias } => json!({
            "alias": alias,
            "expires_at": cache.get_collection_expiration(&alias).await,
        }),
        Command::Nav { key } => to_value(cache.get_navigation_snapshot(&key).await)?,
    };
    Ok(value)
}

fn to_value(value: impl Serialize) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}
