//! Logging setup.
//!
//! Log lines go to stderr through a non-blocking writer so they never mix
//! with command output on stdout. `RUST_LOG`, when set, replaces the
//! configured level entirely.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LogLevel};

/// Options for [`init`].
#[derive(Debug, Clone, Copy)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Emit ANSI colours in text mode.
    pub ansi: bool,
}

impl LogSettings {
    pub fn new(level: LogLevel, format: LogFormat) -> Self {
        Self {
            level,
            format,
            ansi: true,
        }
    }

    /// Enable or disable ANSI colours.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

/// Filter directive for a configured level.
///
/// Our own crates log at `level`; dependencies are capped at `warn` unless
/// the level is stricter.
pub fn filter_directive(level: LogLevel) -> String {
    let ours = level.as_filter();
    let deps = match level {
        LogLevel::Error | LogLevel::Critical => "error",
        _ => "warn",
    };
    format!("{},datamap={},datamap_cli={}", deps, ours, ours)
}

/// Install the global tracing subscriber.
///
/// The returned guard flushes buffered lines when dropped and must be held
/// for the life of the process.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<WorkerGuard, TryInitError> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(settings.level)));

    let (json, text) = match settings.format {
        LogFormat::Json => (
            Some(fmt::layer().json().with_writer(writer)),
            None,
        ),
        LogFormat::Text => (
            None,
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(settings.ansi)
                    .with_writer(writer),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_for_info() {
        assert_eq!(
            filter_directive(LogLevel::Info),
            "warn,datamap=info,datamap_cli=info"
        );
    }

    #[test]
    fn test_filter_directive_critical_maps_to_error() {
        assert_eq!(
            filter_directive(LogLevel::Critical),
            "error,datamap=error,datamap_cli=error"
        );
    }

    #[test]
    fn test_filter_directive_parses() {
        for level in [LogLevel::Debug, LogLevel::Warning, LogLevel::Error] {
            assert!(EnvFilter::try_new(filter_directive(level)).is_ok());
        }
    }
}
