//! Error types for the download subsystem.
//!
//! Three layers:
//!
//! - [`TransferError`]: one file transfer failed (never retried here)
//! - [`TaskError`]: anything that can fail a single scheduled task,
//!   including resolving its download URL
//! - [`DownloadError`]: the whole operation was aborted before or instead
//!   of scheduling transfers
//!
//! [`ErrorKind`] is the flat, copyable classification recorded in outcomes.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::api::ApiError;
use crate::format::format_size;

/// Classification of a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Authentication,
    Authorization,
    Validation,
    RateLimit,
    Server,
    Network,
    Timeout,
    Configuration,
    InvalidResponse,
    Http,
    PermissionDenied,
    DiskFull,
    SizeMismatch,
    Io,
    Cancelled,
    /// The task panicked.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Configuration => "configuration",
            Self::InvalidResponse => "invalid_response",
            Self::Http => "http",
            Self::PermissionDenied => "permission_denied",
            Self::DiskFull => "disk_full",
            Self::SizeMismatch => "size_mismatch",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ApiError> for ErrorKind {
    fn from(e: &ApiError) -> Self {
        match e {
            ApiError::NotFound { .. } => Self::NotFound,
            ApiError::Authentication => Self::Authentication,
            ApiError::Authorization => Self::Authorization,
            ApiError::Validation(_) => Self::Validation,
            ApiError::RateLimit => Self::RateLimit,
            ApiError::Server { .. } => Self::Server,
            ApiError::Network(_) => Self::Network,
            ApiError::Timeout(_) => Self::Timeout,
            ApiError::Configuration(_) => Self::Configuration,
            ApiError::InvalidResponse(_) => Self::InvalidResponse,
            ApiError::Unexpected { .. } => Self::Http,
        }
    }
}

/// A single file transfer failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    #[error("disk full while writing {}", path.display())]
    DiskFull { path: PathBuf },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("network error: {0}")]
    Network(String),

    /// The server stopped sending data for longer than the read timeout.
    #[error("download timed out: {0}")]
    Timeout(String),

    #[error("download server responded with HTTP {status}")]
    Http { status: u16 },

    #[error("download cancelled")]
    Cancelled,
}

#[cfg(unix)]
fn is_disk_full(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(windows)]
fn is_disk_full(e: &io::Error) -> bool {
    // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
    matches!(e.raw_os_error(), Some(39) | Some(112))
}

#[cfg(not(any(unix, windows)))]
fn is_disk_full(_e: &io::Error) -> bool {
    false
}

impl TransferError {
    /// Classify a filesystem error raised while writing `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.to_path_buf(),
                source,
            }
        } else if is_disk_full(&source) {
            Self::DiskFull {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::DiskFull { .. } => ErrorKind::DiskFull,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::Io { .. } => ErrorKind::Io,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Http { .. } => ErrorKind::Http,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Failure of one scheduled task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Resolving the download URL failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Transfer(#[from] TransferError),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(e) => ErrorKind::from(e),
            Self::Transfer(e) => e.kind(),
        }
    }
}

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// A download operation was aborted before per-file accounting applied.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Metadata could not be fetched.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(
        "insufficient disk space in {}: {} required, {} available",
        path.display(),
        format_size(*required),
        format_size(*available)
    )]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("file {file_id} not found in version '{version}'")]
    FileNotInVersion { file_id: Uuid, version: String },

    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir { path: PathBuf, source: io::Error },

    #[error("invalid download settings: {0}")]
    Config(String),
}

impl DownloadError {
    /// Outcome classification for this error, where one applies.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(e) => ErrorKind::from(e),
            Self::InsufficientSpace { .. } => ErrorKind::DiskFull,
            Self::FileNotInVersion { .. } => ErrorKind::NotFound,
            Self::OutputDir { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            Self::OutputDir { .. } => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }
}
