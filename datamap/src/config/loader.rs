//! Settings resolution from the config file and environment.
//!
//! Sources are layered, later ones winning:
//!
//! ```text
//! built-in defaults  <  config.ini [datamap]  <  DATAMAP_* env vars  <  CLI flags
//! ```
//!
//! CLI flags are applied by the caller on the returned [`Settings`] through
//! its `with_*` builders.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::debug;

use super::settings::{Settings, DEFAULT_API_BASE_URL};
use super::{ConfigError, ConfigResult};

/// INI section holding all settings.
pub const CONFIG_SECTION: &str = "datamap";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DATAMAP_";

/// Every recognised setting key, in display order.
pub const SETTING_KEYS: &[&str] = &[
    "api_key",
    "api_secret",
    "api_base_url",
    "timeout",
    "retry_attempts",
    "retry_delay_ms",
    "user_id",
    "tenancies",
    "log_level",
    "log_format",
    "output_format",
    "color_output",
    "download_concurrency",
    "chunk_size",
];

/// Default config file location: `<config_dir>/datamap/config.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("datamap").join("config.ini"))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

fn parse_num<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("expected a number, got '{}'", value.trim()))
}

/// Apply one `key = value` pair. Returns `Ok(false)` for unknown keys.
fn apply(settings: &mut Settings, key: &str, value: &str) -> Result<bool, String> {
    match key {
        "api_key" => settings.api_key = Some(value.to_string()),
        "api_secret" => settings.api_secret = Some(value.to_string()),
        "api_base_url" => settings.api_base_url = value.to_string(),
        "timeout" => settings.timeout_secs = parse_num(value)?,
        "retry_attempts" => settings.retry_attempts = parse_num(value)?,
        "retry_delay_ms" => settings.retry_delay_ms = parse_num(value)?,
        "user_id" => settings.user_id = Some(value.to_string()),
        "tenancies" => settings.tenancies = Some(value.to_string()),
        "log_level" => settings.log_level = value.parse()?,
        "log_format" => settings.log_format = value.parse()?,
        "output_format" => settings.output_format = value.parse()?,
        "color_output" => settings.color_output = parse_bool(value)?,
        "download_concurrency" => settings.download_concurrency = parse_num(value)?,
        "chunk_size" => settings.chunk_size = parse_num(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Builds [`Settings`] from the layered sources.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    config_file: Option<PathBuf>,
    explicit_file: bool,
    env: HashMap<String, String>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Loader reading the default config path and the process environment.
    pub fn new() -> Self {
        Self {
            config_file: default_config_path(),
            explicit_file: false,
            env: std::env::vars()
                .filter(|(k, _)| k.starts_with(ENV_PREFIX))
                .collect(),
        }
    }

    /// Read settings from this file instead of the default location.
    ///
    /// Unlike the default location, an explicit file must exist.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self.explicit_file = true;
        self
    }

    /// Replace the environment the loader reads overrides from.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// The config file this loader would read.
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Resolve settings.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotFound` if an explicit config file is missing
    /// - `ConfigError::Read` if the file is not valid INI
    /// - `ConfigError::Invalid` listing every unparsable or out-of-range value
    pub fn load(&self) -> ConfigResult<Settings> {
        let mut settings = Settings::default();
        let mut issues = Vec::new();

        if let Some(ref path) = self.config_file {
            if path.exists() {
                self.apply_file(path, &mut settings, &mut issues)?;
                settings.source_file = Some(path.clone());
            } else if self.explicit_file {
                return Err(ConfigError::NotFound(path.clone()));
            }
        }

        for key in SETTING_KEYS {
            let var = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
            if let Some(value) = self.env.get(&var) {
                if let Err(e) = apply(&mut settings, key, value) {
                    issues.push(format!("{}: {}", var, e));
                }
            }
        }

        settings.normalize();
        issues.extend(settings.validate());

        if issues.is_empty() {
            Ok(settings)
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    fn apply_file(
        &self,
        path: &Path,
        settings: &mut Settings,
        issues: &mut Vec<String>,
    ) -> ConfigResult<()> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let Some(section) = ini.section(Some(CONFIG_SECTION)) else {
            debug!(path = %path.display(), "Config file has no [datamap] section");
            return Ok(());
        };

        for (key, value) in section.iter() {
            match apply(settings, key, value) {
                Ok(true) => {}
                Ok(false) => debug!(key, "Ignoring unknown config key"),
                Err(e) => issues.push(format!("{} (in {}): {}", key, path.display(), e)),
            }
        }
        debug!(path = %path.display(), "Loaded config file");
        Ok(())
    }
}

/// Write a starter config file.
///
/// # Errors
///
/// Returns `ConfigError::AlreadyExists` unless `force` is set, or
/// `ConfigError::Write` if the file or its directory cannot be created.
pub fn write_template(path: &Path, force: bool) -> ConfigResult<()> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let defaults = Settings::default();
    let mut ini = Ini::new();
    ini.with_section(Some(CONFIG_SECTION))
        .set("api_key", "your-api-key-here")
        .set("api_secret", "your-api-secret-here")
        .set("api_base_url", DEFAULT_API_BASE_URL)
        .set("timeout", defaults.timeout_secs.to_string())
        .set("retry_attempts", defaults.retry_attempts.to_string())
        .set("log_level", defaults.log_level.to_string())
        .set("log_format", defaults.log_format.to_string())
        .set("output_format", defaults.output_format.to_string())
        .set("color_output", defaults.color_output.to_string())
        .set("download_concurrency", defaults.download_concurrency.to_string())
        .set("chunk_size", defaults.chunk_size.to_string());

    ini.write_to_file(path).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}
