//! Resolved application settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://datamap.pcs.usp.br/api/v1";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retries for failed API requests.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay between API retries in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default number of simultaneous file downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 3;

/// Default download chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Accepted range for `timeout`.
pub const TIMEOUT_RANGE: (u64, u64) = (1, 300);

/// Accepted range for `retry_attempts`.
pub const RETRY_RANGE: (u32, u32) = (0, 10);

/// Accepted range for `download_concurrency`.
pub const CONCURRENCY_RANGE: (usize, usize) = (1, 10);

/// Accepted range for `chunk_size`.
pub const CHUNK_SIZE_RANGE: (usize, usize) = (1024, 1_048_576);

/// Logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!(
                "invalid log level '{}' (expected DEBUG, INFO, WARNING, ERROR or CRITICAL)",
                other
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!(
                "invalid log format '{}' (expected json or text)",
                other
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Text => "text",
        })
    }
}

/// How command results are rendered on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{}' (expected table or json)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Json => "json",
        })
    }
}

/// Application settings.
///
/// Built once at startup by [`SettingsLoader`](super::SettingsLoader) and
/// passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub user_id: Option<String>,
    pub tenancies: Option<String>,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub output_format: OutputFormat,
    pub color_output: bool,
    pub download_concurrency: usize,
    pub chunk_size: usize,
    /// Config file the settings were read from, if one existed.
    pub source_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            user_id: None,
            tenancies: None,
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            output_format: OutputFormat::default(),
            color_output: true,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            source_file: None,
        }
    }
}

impl Settings {
    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the API secret.
    pub fn with_api_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(secret.into());
        self
    }

    /// Set the API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the output format.
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Enable or disable colored output.
    pub fn with_color_output(mut self, enabled: bool) -> Self {
        self.color_output = enabled;
        self
    }

    /// Set the number of simultaneous downloads.
    pub fn with_download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = concurrency;
        self
    }

    /// Set the download chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// API key and secret, if both are present and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let secret = self
            .api_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((key, secret))
    }

    /// Trim credentials and strip the trailing slash from the base URL.
    pub fn normalize(&mut self) {
        fn clean(value: &mut Option<String>) {
            *value = value
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        clean(&mut self.api_key);
        clean(&mut self.api_secret);
        clean(&mut self.user_id);
        clean(&mut self.tenancies);
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
    }

    /// Check value ranges and formats, returning every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            issues.push(format!(
                "api_base_url must start with http:// or https:// (got '{}')",
                self.api_base_url
            ));
        }
        if !(TIMEOUT_RANGE.0..=TIMEOUT_RANGE.1).contains(&self.timeout_secs) {
            issues.push(format!(
                "timeout must be between {} and {} seconds (got {})",
                TIMEOUT_RANGE.0, TIMEOUT_RANGE.1, self.timeout_secs
            ));
        }
        if !(RETRY_RANGE.0..=RETRY_RANGE.1).contains(&self.retry_attempts) {
            issues.push(format!(
                "retry_attempts must be between {} and {} (got {})",
                RETRY_RANGE.0, RETRY_RANGE.1, self.retry_attempts
            ));
        }
        if !(CONCURRENCY_RANGE.0..=CONCURRENCY_RANGE.1).contains(&self.download_concurrency) {
            issues.push(format!(
                "download_concurrency must be between {} and {} (got {})",
                CONCURRENCY_RANGE.0, CONCURRENCY_RANGE.1, self.download_concurrency
            ));
        }
        if !(CHUNK_SIZE_RANGE.0..=CHUNK_SIZE_RANGE.1).contains(&self.chunk_size) {
            issues.push(format!(
                "chunk_size must be between {} and {} bytes (got {})",
                CHUNK_SIZE_RANGE.0, CHUNK_SIZE_RANGE.1, self.chunk_size
            ));
        }

        issues
    }

    /// Like [`validate`](Self::validate), but also requires credentials.
    pub fn validate_for_api(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.credentials().is_none() {
            issues.push(
                "api_key and api_secret are required (set DATAMAP_API_KEY and DATAMAP_API_SECRET)"
                    .to_string(),
            );
        }
        issues.extend(self.validate());
        issues
    }

    /// Key/value pairs for display, with secrets masked unless requested.
    pub fn display_entries(&self, show_secrets: bool) -> Vec<(&'static str, String)> {
        let secret = |value: &Option<String>| match value {
            Some(v) if show_secrets => v.clone(),
            Some(v) => mask_secret(v),
            None => "(not set)".to_string(),
        };
        let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "(not set)".to_string());

        vec![
            ("api_key", secret(&self.api_key)),
            ("api_secret", secret(&self.api_secret)),
            ("api_base_url", self.api_base_url.clone()),
            ("timeout", self.timeout_secs.to_string()),
            ("retry_attempts", self.retry_attempts.to_string()),
            ("retry_delay_ms", self.retry_delay_ms.to_string()),
            ("user_id", optional(&self.user_id)),
            ("tenancies", optional(&self.tenancies)),
            ("log_level", self.log_level.to_string()),
            ("log_format", self.log_format.to_string()),
            ("output_format", self.output_format.to_string()),
            ("color_output", self.color_output.to_string()),
            ("download_concurrency", self.download_concurrency.to_string()),
            ("chunk_size", self.chunk_size.to_string()),
        ]
    }
}

/// Mask a secret, keeping the first and last four characters of long values.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}
