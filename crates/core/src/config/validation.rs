//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{CacheConfig, MAX_SIZE_MB, MIN_SIZE_MB};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// An out-of-range `max_size_mb` is not rejected; it is clamped by
    /// [`CacheConfig::max_size_bytes`] and reported here as a warning.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `db_path` is empty
    /// - `pinned_alias` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "db_path".into(), reason: "must not be empty".into() });
        }

        if self.pinned_alias.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "pinned_alias".into(), reason: "must not be empty".into() });
        }

        if !(MIN_SIZE_MB..=MAX_SIZE_MB).contains(&self.max_size_mb) {
            tracing::warn!(
                requested_mb = self.max_size_mb,
                clamped_mb = self.clamped_size_mb(),
                "max_size_mb outside {MIN_SIZE_MB}..={MAX_SIZE_MB}; clamping"
            );
        }

        Ok(())
    }
}
