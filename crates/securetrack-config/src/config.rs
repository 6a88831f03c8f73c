// crates/securetrack-config/src/config.rs
// ============================================================================
// Module: SecureTrack Configuration
// Description: Configuration loading and validation for the device store.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: securetrack-core, securetrack-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The `[store]` section embeds [`SqliteStoreConfig`] directly; `[retention]`
//! carries the command log retention policy. Missing sections take defaults,
//! invalid values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use securetrack_core::RetentionPolicy;
use securetrack_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "securetrack.toml";
/// Environment variable consulted when no path is passed explicitly.
pub const CONFIG_ENV_VAR: &str = "SECURETRACK_CONFIG";
/// Database file name used when `[store]` is omitted.
pub const DEFAULT_DATABASE_NAME: &str = "securetrack_db";
/// Maximum accepted config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for the `SQLite` busy timeout.
pub(crate) const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Upper bound for the read connection pool.
pub(crate) const MAX_READ_POOL_SIZE: usize = 16;
/// Upper bound for buffered live query results.
pub(crate) const MAX_LIVE_QUERY_BUFFER: usize = 1024;
/// Upper bound for command log retention.
pub(crate) const MAX_RETENTION_DAYS: u32 = 3650;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// SecureTrack device store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecureTrackConfig {
    /// Store connection and open-time settings.
    #[serde(default = "default_store")]
    pub store: SqliteStoreConfig,
    /// Command log retention policy.
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for SecureTrackConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl SecureTrackConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order is the explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// `securetrack.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_retention(self.retention)
    }
}

/// Store section used when the file omits `[store]`.
fn default_store() -> SqliteStoreConfig {
    SqliteStoreConfig::new(DEFAULT_DATABASE_NAME)
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates store limits beyond what the store itself enforces.
fn validate_store(store: &SqliteStoreConfig) -> Result<(), ConfigError> {
    store.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
    if store.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "store.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
        )));
    }
    if store.read_pool_size > MAX_READ_POOL_SIZE {
        return Err(ConfigError::Invalid(format!(
            "store.read_pool_size must be at most {MAX_READ_POOL_SIZE}"
        )));
    }
    if store.live_query_buffer > MAX_LIVE_QUERY_BUFFER {
        return Err(ConfigError::Invalid(format!(
            "store.live_query_buffer must be at most {MAX_LIVE_QUERY_BUFFER}"
        )));
    }
    Ok(())
}

/// Validates the retention window.
fn validate_retention(retention: RetentionPolicy) -> Result<(), ConfigError> {
    match retention.max_age_days {
        Some(0) => Err(ConfigError::Invalid(
            "retention.max_age_days must be greater than zero".to_string(),
        )),
        Some(days) if days > MAX_RETENTION_DAYS => Err(ConfigError::Invalid(format!(
            "retention.max_age_days must be at most {MAX_RETENTION_DAYS}"
        ))),
        _ => Ok(()),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}
