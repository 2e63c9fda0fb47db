//! Core types and shared functionality for folio.
//!
//! This crate provides:
//! - Durable SQLite cache for content items, collections, and navigation
//! - Size-bounded eviction and collection minimization via [`CacheManager`]
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod manager;

pub use cache::{
    CacheCounts, CacheDb, CollectionEntry, CollectionMembership, CollectionSlot, ContentItem, EvictionReport,
    NavigationSnapshot,
};
pub use config::{CacheConfig, ConfigError};
pub use error::Error;
pub use manager::{CacheManager, CacheStats, MinimizeReport};
