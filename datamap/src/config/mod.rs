//! Configuration for the DataMap client.
//!
//! [`Settings`] is an explicit value resolved once at startup by
//! [`SettingsLoader`]; nothing in the crate reads configuration globally.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod loader;
mod settings;

pub use loader::{
    default_config_path, write_template, SettingsLoader, CONFIG_SECTION, ENV_PREFIX, SETTING_KEYS,
};
pub use settings::{
    mask_secret, LogFormat, LogLevel, OutputFormat, Settings, CHUNK_SIZE_RANGE,
    CONCURRENCY_RANGE, DEFAULT_API_BASE_URL, DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_CONCURRENCY,
};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The config file could not be read or parsed.
    #[error("failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// The config file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// Refused to overwrite an existing config file.
    #[error("config file already exists: {} (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),

    /// One or more settings are invalid.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
