//! Navigation snapshot operations.
//!
//! One row per hierarchy key. Snapshots are never touched by eviction or
//! minimization.

use super::connection::CacheDb;
use super::{from_millis, to_millis};
use crate::Error;
use crate::error::require_non_empty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// The latest navigation (section list) payload for a hierarchy key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationSnapshot {
    pub hierarchy_key: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub(crate) fn count(conn: &rusqlite::Connection) -> Result<u64, Error> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM navigation_snapshots", [], |row| row.get(0))?;
    Ok(n as u64)
}

impl CacheDb {
    /// Insert or replace the snapshot for a hierarchy key.
    pub async fn upsert_navigation_snapshot(
        &self, hierarchy_key: &str, payload: &str, expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        require_non_empty("hierarchy_key", hierarchy_key)?;
        let hierarchy_key = hierarchy_key.to_string();
        let payload = payload.to_string();
        let created_at = to_millis(Utc::now());

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO navigation_snapshots (hierarchy_key, payload, created_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(hierarchy_key) DO UPDATE SET
                        payload = excluded.payload,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at",
                    params![hierarchy_key, payload, created_at, to_millis(expires_at)],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the snapshot for a hierarchy key.
    ///
    /// Returns None if nothing is cached for the key.
    pub async fn get_navigation_snapshot(&self, hierarchy_key: &str) -> Result<Option<NavigationSnapshot>, Error> {
        let hierarchy_key = hierarchy_key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<NavigationSnapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT hierarchy_key, payload, created_at, expires_at
                     FROM navigation_snapshots WHERE hierarchy_key = ?1",
                )?;

                let result = stmt.query_row(params![hierarchy_key], |row| {
                    Ok(NavigationSnapshot {
                        hierarchy_key: row.get(0)?,
                        payload: row.get(1)?,
                        created_at: from_millis(row.get(2)?),
                        expires_at: from_millis(row.get(3)?),
                    })
                });

                match result {
                    Ok(snapshot) => Ok(Some(snapshot)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Number of cached navigation snapshots.
    pub async fn count_navigation_snapshots(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> { count(conn) })
            .await
            .map_err(Error::from)
    }
}
