//! Collection membership operations.
//!
//! A collection is an ordered list of content uuids cached under an alias.
//! Membership rows reference content by uuid only; when the referenced item
//! has been evicted the row stays behind and windowed reads skip it.

use std::collections::BTreeSet;

use super::connection::CacheDb;
use super::{from_millis, to_millis};
use crate::Error;
use crate::error::require_non_empty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// One position of a collection as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub index: u32,
    pub uuid: String,
    pub expires_at: DateTime<Utc>,
}

impl CollectionEntry {
    pub fn new(index: u32, uuid: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self { index, uuid: uuid.into(), expires_at }
    }
}

/// A stored membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMembership {
    /// `alias-index`, unique per position.
    pub internal_id: String,
    pub index: u32,
    pub alias: String,
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A windowed read result: a collection position and its content payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSlot {
    pub index: u32,
    pub payload: String,
}

/// Identity of a collection position.
pub fn internal_id(alias: &str, index: u32) -> String {
    format!("{alias}-{index}")
}

fn insert_entries(conn: &rusqlite::Connection, alias: &str, entries: &[CollectionEntry]) -> Result<usize, Error> {
    let created_at = to_millis(Utc::now());
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO collection_entries (internal_id, idx, alias, uuid, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for entry in entries {
        require_non_empty("uuid", &entry.uuid)?;
        stmt.execute(params![
            internal_id(alias, entry.index),
            entry.index,
            alias,
            &entry.uuid,
            created_at,
            to_millis(entry.expires_at),
        ])?;
    }
    Ok(entries.len())
}

pub(crate) fn delete_alias(conn: &rusqlite::Connection, alias: &str) -> Result<u64, Error> {
    let deleted = conn.execute("DELETE FROM collection_entries WHERE alias = ?1", params![alias])?;
    Ok(deleted as u64)
}

pub(crate) fn distinct_aliases(conn: &rusqlite::Connection) -> Result<BTreeSet<String>, Error> {
    let mut stmt = conn.prepare("SELECT DISTINCT alias FROM collection_entries")?;
    let aliases = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(aliases)
}

pub(crate) fn count(conn: &rusqlite::Connection) -> Result<u64, Error> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM collection_entries", [], |row| row.get(0))?;
    Ok(n as u64)
}

impl CacheDb {
    /// Upsert a batch of positions for an alias in one transaction.
    ///
    /// Existing positions are overwritten; positions not in the batch are
    /// kept, so successive pages of a collection accumulate.
    pub async fn insert_collection_entries(&self, alias: &str, entries: &[CollectionEntry]) -> Result<usize, Error> {
        require_non_empty("alias", alias)?;
        let alias = alias.to_string();
        let entries = entries.to_vec();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let written = insert_entries(&tx, &alias, &entries)?;
                tx.commit()?;
                Ok(written)
            })
            .await
            .map_err(Error::from)
    }

    /// Replace every position of an alias with the given batch.
    ///
    /// The delete and the inserts commit together; readers never see the
    /// collection half-replaced.
    pub async fn replace_collection(&self, alias: &str, entries: &[CollectionEntry]) -> Result<usize, Error> {
        require_non_empty("alias", alias)?;
        let alias = alias.to_string();
        let entries = entries.to_vec();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                delete_alias(&tx, &alias)?;
                let written = insert_entries(&tx, &alias, &entries)?;
                tx.commit()?;
                Ok(written)
            })
            .await
            .map_err(Error::from)
    }

    /// Read up to `size` payloads of a collection starting at index `from`.
    ///
    /// Membership rows are joined to content items on uuid and ordered by
    /// index. Positions whose content is no longer cached produce no row.
    pub async fn get_collection_window(&self, alias: &str, from: u32, size: u32) -> Result<Vec<CollectionSlot>, Error> {
        let alias = alias.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CollectionSlot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.idx, c.payload
                     FROM collection_entries e
                     INNER JOIN content_items c ON c.uuid = e.uuid
                     WHERE e.alias = ?1 AND e.idx >= ?2
                     ORDER BY e.idx ASC
                     LIMIT ?3",
                )?;
                let slots = stmt
                    .query_map(params![alias, from, size], |row| {
                        Ok(CollectionSlot { index: row.get(0)?, payload: row.get(1)? })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(slots)
            })
            .await
            .map_err(Error::from)
    }

    /// Raw membership rows of an alias ordered by index, without the content join.
    pub async fn get_collection_entries(&self, alias: &str) -> Result<Vec<CollectionMembership>, Error> {
        let alias = alias.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CollectionMembership>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT internal_id, idx, alias, uuid, created_at, expires_at
                     FROM collection_entries WHERE alias = ?1 ORDER BY idx ASC",
                )?;
                let rows = stmt
                    .query_map(params![alias], |row| {
                        Ok(CollectionMembership {
                            internal_id: row.get(0)?,
                            index: row.get(1)?,
                            alias: row.get(2)?,
                            uuid: row.get(3)?,
                            created_at: from_millis(row.get(4)?),
                            expires_at: from_millis(row.get(5)?),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    /// Earliest `expires_at` across an alias, or None if it has no rows.
    pub async fn get_collection_expiration(&self, alias: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let alias = alias.to_string();
        self.conn
            .call(move |conn| -> Result<Option<DateTime<Utc>>, Error> {
                let earliest: Option<i64> = conn.query_row(
                    "SELECT MIN(expires_at) FROM collection_entries WHERE alias = ?1",
                    params![alias],
                    |row| row.get(0),
                )?;
                Ok(earliest.map(from_millis))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every position of an alias.
    ///
    /// Returns the number of deleted rows.
    pub async fn delete_collection(&self, alias: &str) -> Result<u64, Error> {
        let alias = alias.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> { delete_alias(conn, &alias) })
            .await
            .map_err(Error::from)
    }

    /// Delete a single position of an alias.
    ///
    /// Returns the number of deleted rows (0 or 1).
    pub async fn delete_collection_entry(&self, alias: &str, index: u32) -> Result<u64, Error> {
        let id = internal_id(alias, index);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM collection_entries WHERE internal_id = ?1", params![id])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Distinct aliases with at least one membership row, sorted.
    pub async fn list_aliases(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> { Ok(distinct_aliases(conn)?.into_iter().collect()) })
            .await
            .map_err(Error::from)
    }

    /// Number of membership rows across all aliases.
    pub async fn count_collection_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> { count(conn) })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentItem;
    use chrono::Duration;

    fn later(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    async fn seed_collection(db: &CacheDb, alias: &str, len: u32) {
        let mut entries = Vec::new();
        for i in 0..len {
            let uuid = format!("{alias}-item-{i}");
            db.upsert_content_item(&ContentItem::new(&uuid, format!("payload-{i}"), later(1)))
                .await
                .unwrap();
            entries.push(CollectionEntry::new(i, uuid, later(1)));
        }
        db.insert_collection_entries(alias, &entries).await.unwrap();
    }

    #[test]
    fn test_internal_id_format() {
        assert_eq!(internal_id("home", 0), "home-0");
        assert_eq!(internal_id("top-stories", 12), "top-stories-12");
    }

    #[tokio::test]
    async fn test_window_is_ordered_and_bounded() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_collection(&db, "home", 10).await;

        let window = db.get_collection_window("home", 5, 3).await.unwrap();
        let indices: Vec<u32> = window.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![5, 6, 7]);
        assert_eq!(window[0].payload, "payload-5");
    }

    #[tokio::test]
    async fn test_window_past_end_is_empty() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_collection(&db, "home", 3).await;

        assert!(db.get_collection_window("home", 3, 10).await.unwrap().is_empty());
        assert_eq!(db.get_collection_window("home", 1, 10).await.unwrap().len(), 2);
        assert!(db.get_collection_window("home", 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_only_reads_requested_alias() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_collection(&db, "home", 3).await;
        seed_collection(&db, "sports", 3).await;

        let window = db.get_collection_window("sports", 0, 10).await.unwrap();
        assert_eq!(window.len(), 3);
        assert!(db.get_collection_window("missing", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_skips_uncached_content() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_collection(&db, "home", 3).await;
        db.insert_collection_entries("home", &[CollectionEntry::new(3, "never-cached", later(1))])
            .await
            .unwrap();

        let window = db.get_collection_window("home", 0, 10).await.unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(db.get_collection_entries("home").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_same_position_is_overwritten() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_collection_entries("home", &[CollectionEntry::new(0, "first", later(1))])
            .await
            .unwrap();
        db.insert_collection_entries("home", &[CollectionEntry::new(0, "second", later(2))])
            .await
            .unwrap();

        let rows = db.get_collection_entries("home").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uuid, "second");
        assert_eq!(rows[0].internal_id, "home-0");
    }

    #[tokio::test]
    async fn test_pages_accumulate_but_replace_discards() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let page1: Vec<_> = (0..3).map(|i| CollectionEntry::new(i, format!("a{i}"), later(1))).collect();
        let page2: Vec<_> = (3..6).map(|i| CollectionEntry::new(i, format!("a{i}"), later(1))).collect();

        db.insert_collection_entries("home", &page1).await.unwrap();
        db.insert_collection_entries("home", &page2).await.unwrap();
        assert_eq!(db.count_collection_entries().await.unwrap(), 6);

        db.replace_collection("home", &page1).await.unwrap();
        let rows = db.get_collection_entries("home").await.unwrap();
        assert_eq!(rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_expiration_is_minimum() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let soonest = later(1);
        db.insert_collection_entries(
            "home",
            &[
                CollectionEntry::new(0, "a", later(5)),
                CollectionEntry::new(1, "b", soonest),
                CollectionEntry::new(2, "c", later(3)),
            ],
        )
        .await
        .unwrap();

        let expiration = db.get_collection_expiration("home").await.unwrap().unwrap();
        assert_eq!(expiration.timestamp_millis(), soonest.timestamp_millis());
        assert!(db.get_collection_expiration("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_collection_and_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_collection(&db, "home", 4).await;
        seed_collection(&db, "world", 2).await;

        assert_eq!(db.delete_collection_entry("home", 2).await.unwrap(), 1);
        assert_eq!(db.delete_collection_entry("home", 2).await.unwrap(), 0);
        let indices: Vec<u32> = db
            .get_collection_entries("home")
            .await
            .unwrap()
            .iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 3]);

        assert_eq!(db.delete_collection("home").await.unwrap(), 3);
        assert_eq!(db.list_aliases().await.unwrap(), vec!["world".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_alias_rejected() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.insert_collection_entries("", &[CollectionEntry::new(0, "a", later(1))]).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
