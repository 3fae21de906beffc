//! CLI error type and exit codes.

use datamap::api::ApiError;
use datamap::config::ConfigError;
use datamap::download::DownloadError;
use thiserror::Error;

/// Exit code for operational failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for bad arguments or configuration.
pub const EXIT_USAGE: i32 = 2;

/// Errors surfaced to the user by the `datamap` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("{failed} of {total} file(s) failed to download")]
    DownloadsFailed { failed: usize, total: usize },

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::ConfigFile(_) => EXIT_USAGE,
            Self::Api(ApiError::Configuration(_)) => EXIT_USAGE,
            Self::Download(DownloadError::Config(_)) => EXIT_USAGE,
            Self::Api(_)
            | Self::Download(_)
            | Self::DownloadsFailed { .. }
            | Self::Output(_)
            | Self::Prompt(_)
            | Self::Runtime(_) => EXIT_FAILURE,
        }
    }

    /// Follow-up advice printed under the error, if any.
    pub fn hint(&self) -> Option<&'static str> {
        let api = match self {
            Self::Api(e) | Self::Download(DownloadError::Api(e)) => e,
            Self::Config(_) | Self::ConfigFile(_) => {
                return Some("Run 'datamap config validate' to check your settings.")
            }
            Self::Download(DownloadError::InsufficientSpace { .. }) => {
                return Some("Free up space or choose another output directory with --output.")
            }
            Self::DownloadsFailed { .. } => {
                return Some("Re-run with --resume to retry only the incomplete files.")
            }
            _ => return None,
        };
        match api {
            ApiError::Authentication => {
                Some("Check DATAMAP_API_KEY and DATAMAP_API_SECRET, or run 'datamap config show'.")
            }
            ApiError::Authorization => Some("Your credentials lack access to this resource."),
            ApiError::RateLimit | ApiError::Server { .. } => Some("Wait a moment and try again."),
            ApiError::Network(_) | ApiError::Timeout(_) => {
                Some("Check your network connection and api_base_url.")
            }
            ApiError::Configuration(_) => {
                Some("Run 'datamap config validate' to check your settings.")
            }
            ApiError::NotFound { .. }
            | ApiError::Validation(_)
            | ApiError::InvalidResponse(_)
            | ApiError::Unexpected { .. } => None,
        }
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        Self::Prompt(e.to_string())
    }
}
