//! Size-bound, oldest-first eviction of content items.
//!
//! The loop measures the accounted size (primary file plus WAL, shared-memory
//! index, and rollback journal) after a checkpoint and deletes the oldest
//! content item until the store fits the budget or no content is left.
//! Collection membership and navigation rows are never evicted.

use std::path::Path;

use super::connection::CacheDb;
use super::content::{self, ContentItem};
use super::maintenance::{accounted_size, checkpoint};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Content items deleted during the pass.
    pub evicted: u64,
    /// Accounted bytes when the pass finished.
    pub accounted_bytes: u64,
}

/// Shrink the store to `max_bytes`.
///
/// Terminates because every iteration either deletes a row or stops on an
/// empty table. On return, `accounted_bytes <= max_bytes` or the content
/// table is empty.
pub(crate) fn enforce_budget(
    conn: &rusqlite::Connection, path: Option<&Path>, max_bytes: u64,
) -> Result<EvictionReport, Error> {
    checkpoint(conn)?;
    let mut size = accounted_size(conn, path)?;
    let mut evicted = 0u64;

    while size > max_bytes {
        let Some(uuid) = content::delete_oldest(conn)? else {
            tracing::debug!(size, max_bytes, "content table empty; cache still over budget");
            break;
        };
        evicted += 1;
        tracing::trace!(%uuid, size, "evicted content item");

        checkpoint(conn)?;
        size = accounted_size(conn, path)?;
    }

    if evicted > 0 {
        tracing::debug!(evicted, size, max_bytes, "eviction pass finished");
    }

    Ok(EvictionReport { evicted, accounted_bytes: size })
}

impl CacheDb {
    /// Upsert a content item and evict until the store fits `max_bytes`.
    ///
    /// The item's `created_at` is ignored; the store stamps it when the row is
    /// written, and the new row is always the last candidate for eviction.
    ///
    /// The upsert and the whole eviction pass run as a single job on the
    /// connection thread, so no other write lands between a measurement and
    /// the delete it triggers. Once submitted, the job runs to completion even
    /// if the returned future is dropped.
    pub async fn insert_content_item_bounded(&self, item: &ContentItem, max_bytes: u64) -> Result<EvictionReport, Error> {
        let item = item.clone();
        let path = self.path.clone();
        self.conn
            .call(move |conn| -> Result<EvictionReport, Error> {
                content::upsert(conn, &item)?;
                enforce_budget(conn, path.as_deref(), max_bytes)
            })
            .await
            .map_err(Error::from)
    }

    /// Run an eviction pass without inserting.
    pub async fn enforce_budget(&self, max_bytes: u64) -> Result<EvictionReport, Error> {
        let path = self.path.clone();
        self.conn
            .call(move |conn| -> Result<EvictionReport, Error> { enforce_budget(conn, path.as_deref(), max_bytes) })
            .await
            .map_err(Error::from)
    }
}
