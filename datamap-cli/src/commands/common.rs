//! Common types and utilities shared across CLI commands.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::{Args, ValueEnum};
use datamap::api::{ClientConfig, DataMapClient};
use datamap::config::{ConfigResult, LogLevel, OutputFormat, Settings, SettingsLoader};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CliError;
use crate::output::ConsoleOutput;

/// Output format selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable tables
    Table,
    /// Pretty-printed JSON
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Options accepted by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Read settings from this file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Render results as a table or as JSON
    #[arg(long, global = true, value_enum)]
    pub output_format: Option<FormatArg>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl GlobalArgs {
    /// Settings loader honouring `--config`.
    pub fn loader(&self) -> SettingsLoader {
        match self.config {
            Some(ref path) => SettingsLoader::new().with_config_file(path),
            None => SettingsLoader::new(),
        }
    }

    /// Apply flag overrides on top of file and environment settings.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        // CLI takes precedence, then config
        if self.verbose {
            settings = settings.with_log_level(LogLevel::Debug);
        } else if self.quiet {
            settings = settings.with_log_level(LogLevel::Error);
        }
        if let Some(format) = self.output_format {
            settings = settings.with_output_format(format.into());
        }
        if self.no_color {
            settings = settings.with_color_output(false);
        }
        settings
    }
}

/// Everything a command handler needs from `main`.
pub struct Context {
    pub globals: GlobalArgs,
    loaded: Result<Settings, String>,
    /// Fired on Ctrl-C.
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(
        globals: GlobalArgs,
        loaded: ConfigResult<Settings>,
        cancel: CancellationToken,
    ) -> Self {
        let loaded = loaded
            .map(|s| globals.apply(s))
            .map_err(|e| e.to_string());
        Self {
            globals,
            loaded,
            cancel,
        }
    }

    /// Resolved settings.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Config` if the config file or environment was invalid.
    pub fn settings(&self) -> Result<&Settings, CliError> {
        self.loaded.as_ref().map_err(|e| CliError::Config(e.clone()))
    }

    /// Output sink honouring the resolved format and colour settings.
    ///
    /// Falls back to flag values when settings failed to load, so errors can
    /// still be printed.
    pub fn output(&self) -> ConsoleOutput {
        match self.loaded {
            Ok(ref s) => ConsoleOutput::new(s.output_format, s.color_output),
            Err(_) => ConsoleOutput::new(
                self.globals
                    .output_format
                    .map(OutputFormat::from)
                    .unwrap_or_default(),
                !self.globals.no_color,
            ),
        }
    }

    /// API client built from the resolved settings.
    ///
    /// # Errors
    ///
    /// `CliError::Config` when credentials are missing or settings are invalid.
    pub fn client(&self) -> Result<Arc<DataMapClient>, CliError> {
        let settings = self.settings()?;
        let issues = settings.validate_for_api();
        if !issues.is_empty() {
            return Err(CliError::Config(issues.join("; ")));
        }
        let config = ClientConfig::from_settings(settings)?;
        Ok(Arc::new(DataMapClient::new(config)?))
    }

    /// Whether progress bars should be drawn.
    pub fn show_progress(&self) -> bool {
        let json = self
            .settings()
            .map(|s| s.output_format == OutputFormat::Json)
            .unwrap_or(false);
        !self.globals.quiet && !json && std::io::stderr().is_terminal()
    }
}

fn version_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"))
}

/// Parse a dataset or file identifier.
pub fn parse_uuid(value: &str) -> Result<Uuid, String> {
    let trimmed = value.trim();
    Uuid::parse_str(trimmed).map_err(|_| {
        format!(
            "'{}' is not a valid UUID (expected e.g. 12345678-1234-1234-1234-123456789abc)",
            trimmed
        )
    })
}

/// Parse a version name: trimmed, letters, digits, `.`, `_` and `-` only.
pub fn parse_version_name(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("version name cannot be empty".to_string());
    }
    if !version_name_pattern().is_match(trimmed) {
        return Err(format!(
            "'{}' is not a valid version name (use letters, digits, '.', '_' and '-')",
            trimmed
        ));
    }
    Ok(trimmed.to_string())
}

pub fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}
