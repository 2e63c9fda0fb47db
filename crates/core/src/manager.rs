//! Cache manager: the entry point the content repository talks to.
//!
//! Owns the size budget and the pinned alias. Writes go through the
//! size-bound eviction loop where required; reads follow a best-effort
//! policy where a store failure is reported as a miss so the caller falls
//! back to the network.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::{
    CacheCounts, CacheDb, CollectionEntry, CollectionSlot, ContentItem, EvictionReport, NavigationSnapshot,
    collections,
};
use crate::config::CacheConfig;

/// Result of pruning collections that are no longer live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimizeReport {
    /// Aliases whose rows were deleted, sorted.
    pub pruned_aliases: Vec<String>,
    /// Membership rows deleted across those aliases.
    pub rows_deleted: u64,
}

/// Point-in-time view of the cache for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub counts: CacheCounts,
    pub accounted_bytes: u64,
    pub max_bytes: u64,
    pub pinned_alias: String,
}

/// Size-bounded cache over a [`CacheDb`].
///
/// Construct once and hand clones to whoever needs the cache; clones share
/// the same connection thread, which serializes every mutation.
#[derive(Clone, Debug)]
pub struct CacheManager {
    db: CacheDb,
    max_bytes: u64,
    pinned_alias: String,
}

impl CacheManager {
    /// Open the store named by `config` and wrap it.
    pub async fn open(config: &CacheConfig) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        Ok(Self::new(db, config))
    }

    /// Wrap an already opened store.
    pub fn new(db: CacheDb, config: &CacheConfig) -> Self {
        Self { db, max_bytes: config.max_size_bytes(), pinned_alias: config.pinned_alias.clone() }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Budget in bytes after clamping.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn pinned_alias(&self) -> &str {
        &self.pinned_alias
    }

    /// Cache a content payload, then evict oldest items until under budget.
    ///
    /// An error means the item was not durably cached.
    pub async fn insert_content_item(
        &self, uuid: &str, payload: &str, expires_at: DateTime<Utc>,
    ) -> Result<EvictionReport, Error> {
        let item = ContentItem::new(uuid, payload, expires_at);
        let report = self.db.insert_content_item_bounded(&item, self.max_bytes).await?;
        if report.evicted > 0 {
            tracing::debug!(uuid, evicted = report.evicted, bytes = report.accounted_bytes, "cache trimmed after insert");
        }
        Ok(report)
    }

    /// Cached content item, or None on a miss or store failure.
    pub async fn get_content_item(&self, uuid: &str) -> Option<ContentItem> {
        self.db
            .get_content_item(uuid)
            .await
            .unwrap_or_else(|e| miss("get_content_item", uuid, &e))
    }

    /// Upsert a batch of collection positions.
    pub async fn insert_collection_entries(&self, alias: &str, entries: &[CollectionEntry]) -> Result<usize, Error> {
        self.db.insert_collection_entries(alias, entries).await
    }

    /// Replace all positions of a collection with `entries`.
    pub async fn replace_collection(&self, alias: &str, entries: &[CollectionEntry]) -> Result<usize, Error> {
        self.db.replace_collection(alias, entries).await
    }

    /// Ordered window of a collection; empty on a store failure.
    pub async fn get_collection_window(&self, alias: &str, from: u32, size: u32) -> Vec<CollectionSlot> {
        self.db
            .get_collection_window(alias, from, size)
            .await
            .unwrap_or_else(|e| miss("get_collection_window", alias, &e))
    }

    /// Earliest expiry across a collection; None if empty or on a store failure.
    pub async fn get_collection_expiration(&self, alias: &str) -> Option<DateTime<Utc>> {
        self.db
            .get_collection_expiration(alias)
            .await
            .unwrap_or_else(|e| miss("get_collection_expiration", alias, &e))
    }

    pub async fn delete_collection(&self, alias: &str) -> Result<u64, Error> {
        self.db.delete_collection(alias).await
    }

    pub async fn delete_collection_entry(&self, alias: &str, index: u32) -> Result<u64, Error> {
        self.db.delete_collection_entry(alias, index).await
    }

    /// Cache the navigation payload for a hierarchy key.
    pub async fn insert_navigation_snapshot(
        &self, hierarchy_key: &str, payload: &str, expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.db.upsert_navigation_snapshot(hierarchy_key, payload, expires_at).await
    }

    /// Cached navigation snapshot, or None on a miss or store failure.
    pub async fn get_navigation_snapshot(&self, hierarchy_key: &str) -> Option<NavigationSnapshot> {
        self.db
            .get_navigation_snapshot(hierarchy_key)
            .await
            .unwrap_or_else(|e| miss("get_navigation_snapshot", hierarchy_key, &e))
    }

    /// Delete membership rows of every alias not in `current`, except the pinned alias.
    ///
    /// Content items referenced by the pruned rows are left for the eviction
    /// loop to reclaim.
    pub async fn minimize_collections<I, S>(&self, current: I) -> Result<MinimizeReport, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let current: BTreeSet<String> = current.into_iter().map(|s| s.as_ref().to_string()).collect();
        let pinned = self.pinned_alias.clone();

        let report = self
            .db
            .conn
            .call(move |conn| -> Result<MinimizeReport, Error> {
                let tx = conn.transaction()?;
                let mut stale: BTreeSet<String> = collections::distinct_aliases(&tx)?
                    .difference(&current)
                    .cloned()
                    .collect();
                stale.remove(&pinned);

                let mut rows_deleted = 0;
                for alias in &stale {
                    rows_deleted += collections::delete_alias(&tx, alias)?;
                }
                tx.commit()?;

                Ok(MinimizeReport { pruned_aliases: stale.into_iter().collect(), rows_deleted })
            })
            .await
            .map_err(Error::from)?;

        if !report.pruned_aliases.is_empty() {
            tracing::info!(
                aliases = ?report.pruned_aliases,
                rows = report.rows_deleted,
                "pruned collections no longer live"
            );
        }
        Ok(report)
    }

    /// Run the eviction loop against the configured budget without inserting.
    pub async fn evict_to_budget(&self) -> Result<EvictionReport, Error> {
        self.db.enforce_budget(self.max_bytes).await
    }

    /// Compact the store file.
    pub async fn vacuum(&self) -> Result<(), Error> {
        self.db.vacuum().await?;
        tracing::info!("cache vacuumed");
        Ok(())
    }

    /// Wipe all three tables.
    pub async fn clear_all(&self) -> Result<CacheCounts, Error> {
        let removed = self.db.clear_all().await?;
        tracing::info!(rows = removed.total(), "cache cleared");
        Ok(removed)
    }

    /// Checkpoint, then report the accounted size in bytes.
    pub async fn accounted_size(&self) -> Result<u64, Error> {
        self.db.accounted_size().await
    }

    pub async fn count_content_items(&self) -> Result<u64, Error> {
        self.db.count_content_items().await
    }

    pub async fn count_collection_entries(&self) -> Result<u64, Error> {
        self.db.count_collection_entries().await
    }

    pub async fn count_all(&self) -> Result<u64, Error> {
        self.db.count_all().await
    }

    pub async fn stats(&self) -> Result<CacheStats, Error> {
        Ok(CacheStats {
            counts: self.db.counts().await?,
            accounted_bytes: self.db.accounted_size().await?,
            max_bytes: self.max_bytes,
            pinned_alias: self.pinned_alias.clone(),
        })
    }
}

fn miss<T: Default>(op: &str, key: &str, err: &Error) -> T {
    tracing::warn!(op, key, error = %err, "cache read failed; treating as miss");
    T::default()
}
