//! Content item CRUD operations.
//!
//! Content items are the only rows the size-bound eviction loop removes.

use super::connection::CacheDb;
use super::{from_millis, to_millis};
use crate::Error;
use crate::error::require_non_empty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached content payload (article, gallery, video).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub uuid: String,
    pub payload: String,
    /// Set by the store when the row is written; a caller-supplied value is ignored.
    pub created_at: DateTime<Utc>,
    /// Stored and returned as given; staleness is judged by the caller.
    pub expires_at: DateTime<Utc>,
}

impl ContentItem {
    /// Build an item; `created_at` is provisional until the store writes it.
    pub fn new(uuid: impl Into<String>, payload: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self { uuid: uuid.into(), payload: payload.into(), created_at: Utc::now(), expires_at }
    }
}

/// Insert or replace a content item by uuid.
///
/// `created_at` is stamped here, on the connection thread, so it follows
/// commit order. Replacement deletes the old row, so a rewritten item also
/// takes a fresh insertion sequence and counts as the newest for eviction.
pub(crate) fn upsert(conn: &rusqlite::Connection, item: &ContentItem) -> Result<(), Error> {
    require_non_empty("uuid", &item.uuid)?;
    conn.execute(
        "INSERT OR REPLACE INTO content_items (uuid, payload, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&item.uuid, &item.payload, to_millis(Utc::now()), to_millis(item.expires_at)],
    )?;
    Ok(())
}

/// Delete the oldest content item, returning its uuid.
///
/// Oldest means lowest insertion sequence. The sequence is never reused and
/// matches commit order, so wall-clock steps cannot reorder eviction.
/// Returns `None` when the table is empty.
pub(crate) fn delete_oldest(conn: &rusqlite::Connection) -> Result<Option<String>, Error> {
    let oldest = conn.query_row(
        "SELECT id, uuid FROM content_items ORDER BY id ASC LIMIT 1",
        [],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    );

    let (id, uuid) = match oldest {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    conn.execute("DELETE FROM content_items WHERE id = ?1", params![id])?;
    Ok(Some(uuid))
}

pub(crate) fn count(conn: &rusqlite::Connection) -> Result<u64, Error> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM content_items", [], |row| row.get(0))?;
    Ok(n as u64)
}

impl CacheDb {
    /// Insert or update a content item without running eviction.
    ///
    /// Callers that must respect the size budget go through
    /// [`crate::CacheManager::insert_content_item`] instead.
    pub async fn upsert_content_item(&self, item: &ContentItem) -> Result<(), Error> {
        let item = item.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> { upsert(conn, &item) })
            .await
            .map_err(Error::from)
    }

    /// Get a content item by uuid.
    ///
    /// Returns None if the uuid isn't cached.
    pub async fn get_content_item(&self, uuid: &str) -> Result<Option<ContentItem>, Error> {
        let uuid = uuid.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ContentItem>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT uuid, payload, created_at, expires_at FROM content_items WHERE uuid = ?1",
                )?;

                let result = stmt.query_row(params![uuid], |row| {
                    Ok(ContentItem {
                        uuid: row.get(0)?,
                        payload: row.get(1)?,
                        created_at: from_millis(row.get(2)?),
                        expires_at: from_millis(row.get(3)?),
                    })
                });

                match result {
                    Ok(item) => Ok(Some(item)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Number of cached content items.
    pub async fn count_content_items(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> { count(conn) })
            .await
            .map_err(Error::from)
    }
}
