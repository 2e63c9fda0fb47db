//! Store maintenance: checkpoint, vacuum, size accounting, bulk clear.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::connection::CacheDb;
use super::{collections, content, navigation};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Suffixes of the side files SQLite keeps next to the primary store file.
const SIDE_FILE_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounts {
    pub content_items: u64,
    pub collection_entries: u64,
    pub navigation_snapshots: u64,
}

impl CacheCounts {
    pub fn total(&self) -> u64 {
        self.content_items + self.collection_entries + self.navigation_snapshots
    }
}

/// Flush the write-ahead log into the primary file and truncate it.
///
/// A checkpoint blocked by another reader is logged and skipped; the next
/// measurement will simply over-report until a later checkpoint succeeds.
pub(crate) fn checkpoint(conn: &rusqlite::Connection) -> Result<(), Error> {
    let (busy, log_frames, checkpointed): (i64, i64, i64) =
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    if busy != 0 {
        tracing::warn!(log_frames, checkpointed, "wal checkpoint was blocked");
    }
    Ok(())
}

/// Bytes attributable to the cache.
///
/// For a file store this is the primary file plus every side file. In-memory
/// stores report their page usage.
pub(crate) fn accounted_size(conn: &rusqlite::Connection, path: Option<&Path>) -> Result<u64, Error> {
    match path {
        Some(path) => Ok(total_len(&store_files(path))),
        None => {
            let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
            Ok((pages * page_size) as u64)
        }
    }
}

/// Primary store file followed by its side files.
pub fn store_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in SIDE_FILE_SUFFIXES {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

/// Combined size of `files`, each unreadable file contributing 0.
fn total_len(files: &[PathBuf]) -> u64 {
    files.iter().map(|f| file_len(f)).sum()
}

/// Size of one file; an unreadable file counts as empty so eviction can proceed.
fn file_len(path: &Path) -> u64 {
    match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => 0,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot stat cache file; counting as 0 bytes");
            0
        }
    }
}

pub(crate) fn counts(conn: &rusqlite::Connection) -> Result<CacheCounts, Error> {
    Ok(CacheCounts {
        content_items: content::count(conn)?,
        collection_entries: collections::count(conn)?,
        navigation_snapshots: navigation::count(conn)?,
    })
}

impl CacheDb {
    /// Checkpoint the WAL so the primary file reflects every committed write.
    pub async fn checkpoint(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> { checkpoint(conn) })
            .await
            .map_err(Error::from)
    }

    /// Checkpoint, then report the accounted size in bytes.
    pub async fn accounted_size(&self) -> Result<u64, Error> {
        let path = self.path.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                checkpoint(conn)?;
                accounted_size(conn, path.as_deref())
            })
            .await
            .map_err(Error::from)
    }

    /// Rebuild the store file to reclaim free space.
    pub async fn vacuum(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute_batch("VACUUM")?;
                checkpoint(conn)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every row from all three cache tables in one transaction.
    ///
    /// Returns the counts that were removed.
    pub async fn clear_all(&self) -> Result<CacheCounts, Error> {
        self.conn
            .call(|conn| -> Result<CacheCounts, Error> {
                let tx = conn.transaction()?;
                let removed = counts(&tx)?;
                tx.execute_batch(
                    "DELETE FROM content_items;
                     DELETE FROM collection_entries;
                     DELETE FROM navigation_snapshots;",
                )?;
                tx.commit()?;
                checkpoint(conn)?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }

    /// Row counts for every table.
    pub async fn counts(&self) -> Result<CacheCounts, Error> {
        self.conn
            .call(|conn| -> Result<CacheCounts, Error> { counts(conn) })
            .await
            .map_err(Error::from)
    }

    /// Total rows across all three tables.
    pub async fn count_all(&self) -> Result<u64, Error> {
        Ok(self.counts().await?.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CollectionEntry, ContentItem};
    use chrono::{Duration, Utc};

    #[test]
    fn test_store_files_lists_side_files() {
        let files = store_files(Path::new("/tmp/cache.sqlite"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/tmp/cache.sqlite"),
                PathBuf::from("/tmp/cache.sqlite-wal"),
                PathBuf::from("/tmp/cache.sqlite-shm"),
                PathBuf::from("/tmp/cache.sqlite-journal"),
            ]
        );
    }

    #[test]
    fn test_missing_file_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_len(&dir.path().join("absent")), 0);
    }

    #[test]
    fn test_unstattable_file_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"plain file").unwrap();

        let below_file = blocker.join("cache.sqlite-wal");
        let err = std::fs::metadata(&below_file).unwrap_err();
        assert_ne!(err.kind(), ErrorKind::NotFound);

        assert_eq!(file_len(&below_file), 0);
    }

    #[test]
    fn test_total_len_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("cache.sqlite");
        std::fs::write(&primary, vec![0u8; 4096]).unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"0123456789").unwrap();

        let files = vec![primary, blocker.join("cache.sqlite-wal"), dir.path().join("cache.sqlite-shm"), blocker];
        assert_eq!(total_len(&files), 4096 + 10);
    }

    #[tokio::test]
    async fn test_accounted_size_includes_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let db = CacheDb::open(&path).await.unwrap();

        let accounted = db.accounted_size().await.unwrap();
        let on_disk: u64 = store_files(&path)
            .iter()
            .filter_map(|f| std::fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();
        let primary = std::fs::metadata(&path).unwrap().len();

        assert_eq!(accounted, on_disk);
        assert!(accounted >= primary);
    }

    #[tokio::test]
    async fn test_clear_all_empties_every_table() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let expires_at = Utc::now() + Duration::hours(1);
        db.upsert_content_item(&ContentItem::new("u1", "p", expires_at)).await.unwrap();
        db.insert_collection_entries("home", &[CollectionEntry::new(0, "u1", expires_at)])
            .await
            .unwrap();
        db.upsert_navigation_snapshot("site", "nav", expires_at).await.unwrap();

        let before = db.counts().await.unwrap();
        assert_eq!(before, CacheCounts { content_items: 1, collection_entries: 1, navigation_snapshots: 1 });
        assert_eq!(db.count_all().await.unwrap(), 3);

        let removed = db.clear_all().await.unwrap();
        assert_eq!(removed.total(), 3);
        assert_eq!(db.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vacuum_keeps_rows() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let expires_at = Utc::now() + Duration::hours(1);
        db.upsert_content_item(&ContentItem::new("u1", "p", expires_at)).await.unwrap();
        db.vacuum().await.unwrap();
        assert_eq!(db.count_content_items().await.unwrap(), 1);
    }
}
