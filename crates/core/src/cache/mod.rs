//! SQLite-backed cache for content items, collections, and navigation.
//!
//! This module provides a persistent cache using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Upsert-by-key storage for content payloads and navigation snapshots
//! - Aliased, ordered collections with windowed reads joined to content
//! - Size-bounded, oldest-first eviction accounting for WAL side files
//! - Automatic schema migrations

pub mod collections;
pub mod connection;
pub mod content;
pub mod eviction;
pub mod maintenance;
pub mod migrations;
pub mod navigation;

pub use crate::Error;

pub use collections::{CollectionEntry, CollectionMembership, CollectionSlot};
pub use connection::CacheDb;
pub use content::ContentItem;
pub use eviction::EvictionReport;
pub use maintenance::CacheCounts;
pub use navigation::NavigationSnapshot;

use chrono::{DateTime, Utc};

/// Timestamps are stored as Unix milliseconds so SQL aggregates compare numerically.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
