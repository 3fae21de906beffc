//! Error taxonomy for DataMap API calls.

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the DataMap API client.
///
/// Every HTTP failure is classified into exactly one variant; callers match
/// on the variant rather than on status codes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The requested resource does not exist (HTTP 404).
    #[error("{resource} with ID '{id}' not found")]
    NotFound { resource: String, id: String },

    /// Credentials were rejected (HTTP 401).
    #[error("Authentication failed. Please check your API key and secret")]
    Authentication,

    /// Credentials are valid but lack access (HTTP 403).
    #[error("You are not authorized to access this resource")]
    Authorization,

    /// The request was rejected as malformed (HTTP 400).
    #[error("Bad request: {0}")]
    Validation(String),

    /// Too many requests (HTTP 429).
    #[error("API rate limit exceeded. Please try again later")]
    RateLimit,

    /// The server failed to handle the request (HTTP 5xx).
    #[error("Server error (HTTP {status}). Please try again later")]
    Server { status: u16 },

    /// Connection-level failure after all retries.
    #[error("Network error: {0}")]
    Network(String),

    /// The request timed out after all retries.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The client is misconfigured (missing credentials, bad base URL).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The response body could not be interpreted.
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl ApiError {
    /// Classify a non-success HTTP response.
    ///
    /// `resource` and `id` describe what was requested and are only used to
    /// build `NotFound`.
    pub fn from_status(status: u16, body: &str, resource: &str, id: &str) -> Self {
        match status {
            400 => Self::Validation(body.to_string()),
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound {
                resource: resource.to_string(),
                id: id.to_string(),
            },
            429 => Self::RateLimit,
            s if s >= 500 => Self::Server { status: s },
            s => Self::Unexpected {
                status: s,
                body: body.to_string(),
            },
        }
    }

    /// Whether this error is worth retrying at the transport level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}
