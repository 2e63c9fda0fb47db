//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for space reclamation and concurrency (auto-vacuum, WAL mode), and running
//! migrations.

use super::migrations;
use crate::Error;
use std::path::{Path, PathBuf};
use tokio_rusqlite::{Connection, rusqlite};

const PRAGMAS: &str = "PRAGMA auto_vacuum=FULL;
     PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Closures submitted through the handle execute
/// one at a time in submission order.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    pub(crate) path: Option<PathBuf>,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file and any missing parent directories, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).await.map_err(|e| Error::Database(e.into()))?;
        configure(&conn).await?;
        migrations::run(&conn).await?;

        tracing::debug!(path = %path.display(), "opened cache database");

        Ok(Self { conn, path: Some(path) })
    }

    /// Open an in-memory database for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases. Its accounted size is
    /// the page count times the page size.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        configure(&conn).await?;
        migrations::run(&conn).await?;

        Ok(Self { conn, path: None })
    }

    /// Location of the primary store file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Apply connection pragmas.
///
/// `auto_vacuum` only takes effect on a store with no tables yet; an existing
/// store created without it is rebuilt once with `VACUUM`.
async fn configure(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS)?;

        let auto_vacuum: i64 = conn.query_row("PRAGMA auto_vacuum", [], |row| row.get(0))?;
        if auto_vacuum != 1 {
            tracing::info!(auto_vacuum, "enabling full auto-vacuum on existing cache store");
            conn.execute_batch("PRAGMA auto_vacuum=FULL; VACUUM;")?;
        }
        Ok::<_, rusqlite::Error>(())
    })
    .await
    .map_err(Error::Database)
}
