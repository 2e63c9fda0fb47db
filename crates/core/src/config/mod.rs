//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FOLIO_*)
//! 2. TOML config file (if FOLIO_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Smallest accepted cache budget, in megabytes.
pub const MIN_SIZE_MB: u64 = 1;

/// Largest accepted cache budget, in megabytes.
pub const MAX_SIZE_MB: u64 = 4096;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FOLIO_*)
/// 2. TOML config file (if FOLIO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via FOLIO_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Maximum accounted disk usage in megabytes.
    ///
    /// Set via FOLIO_MAX_SIZE_MB environment variable. Values outside
    /// `MIN_SIZE_MB..=MAX_SIZE_MB` are clamped.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Collection alias that minimization never prunes.
    ///
    /// Set via FOLIO_PINNED_ALIAS environment variable.
    #[serde(default = "default_pinned_alias")]
    pub pinned_alias: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./folio-cache.sqlite")
}

fn default_max_size_mb() -> u64 {
    50
}

fn default_pinned_alias() -> String {
    "videos".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { db_path: default_db_path(), max_size_mb: default_max_size_mb(), pinned_alias: default_pinned_alias() }
    }
}

impl CacheConfig {
    /// Configured budget clamped into the accepted range.
    pub fn clamped_size_mb(&self) -> u64 {
        self.max_size_mb.clamp(MIN_SIZE_MB, MAX_SIZE_MB)
    }

    /// Configured budget in bytes (`MB * 1024 * 1024`), after clamping.
    pub fn max_size_bytes(&self) -> u64 {
        self.clamped_size_mb() * BYTES_PER_MB
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FOLIO_`
    /// 2. TOML file from `FOLIO_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FOLIO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FOLIO_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
