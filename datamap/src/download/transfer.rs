//! Single-file downloader with resume support.
//!
//! This module provides the core transfer loop including:
//! - Resumable downloads via HTTP Range requests
//! - Per-chunk progress callbacks
//! - Post-transfer size verification
//!
//! Partial files are never deleted; a later resumed run continues from
//! whatever is on disk.

use std::io;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::TransferError;
use super::source::{ByteSource, RemoteBody};
use crate::config::DEFAULT_CHUNK_SIZE;

/// Progress callback invoked after every written chunk.
///
/// # Arguments
///
/// * `bytes_on_disk` - Size of the output file so far, including any resumed prefix
/// * `total_bytes` - Expected final size
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// One transfer to perform.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub url: &'a str,
    pub output_path: &'a Path,
    pub expected_size: u64,
    pub resume: bool,
}

/// What a finished transfer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Final size of the output file.
    pub bytes_on_disk: u64,
    /// Bytes received from the network.
    pub bytes_downloaded: u64,
    /// Offset the transfer continued from (0 for a fresh download).
    pub resumed_from: u64,
    /// The file was already complete and no request was made.
    pub skipped: bool,
}

/// Streams one URL to one file.
#[derive(Clone)]
pub struct FileDownloader {
    source: Arc<dyn ByteSource>,
    chunk_size: usize,
    verify_size: bool,
}

impl FileDownloader {
    /// Create a downloader with the default chunk size and size verification on.
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            source,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_size: true,
        }
    }

    /// Largest write (and progress step) in bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Enable or disable the final size comparison.
    pub fn with_verify_size(mut self, verify: bool) -> Self {
        self.verify_size = verify;
        self
    }

    /// Download `request.url` to `request.output_path`.
    ///
    /// With `resume`, an existing file of at least the expected size is
    /// reported as skipped without contacting the server; a shorter one is
    /// continued with a range request. Without `resume` the file is
    /// truncated.
    ///
    /// Cancellation is observed between chunks.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`, `DiskFull` or `Io` for filesystem failures
    /// - `Network`, `Timeout` or `Http` for transport failures
    /// - `SizeMismatch` when verification is on and the final size differs
    /// - `Cancelled` if `cancel` fires
    pub async fn download(
        &self,
        request: &TransferRequest<'_>,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferError> {
        let path = request.output_path;

        let existing = if request.resume {
            existing_size(path).await?
        } else {
            None
        };

        if let Some(size) = existing.filter(|&s| s >= request.expected_size) {
            debug!(path = %path.display(), size, "File already complete, skipping");
            on_progress(size, request.expected_size);
            return Ok(TransferReport {
                bytes_on_disk: size,
                bytes_downloaded: 0,
                resumed_from: size,
                skipped: true,
            });
        }

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let offset = existing.unwrap_or(0);
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            body = self.source.open(request.url, offset) => body?,
        };

        let (start, file) = self.prepare_destination(path, offset, body.start).await?;
        if start > 0 {
            info!(path = %path.display(), offset = start, "Resuming download");
        }

        let downloaded = self
            .stream_download(body, file, path, start, request.expected_size, on_progress, cancel)
            .await?;

        let actual = fs::metadata(path)
            .await
            .map_err(|e| TransferError::from_io(path, e))?
            .len();

        if self.verify_size && actual != request.expected_size {
            return Err(TransferError::SizeMismatch {
                expected: request.expected_size,
                actual,
            });
        }

        Ok(TransferReport {
            bytes_on_disk: actual,
            bytes_downloaded: downloaded,
            resumed_from: start,
            skipped: false,
        })
    }

    /// Open the output file for appending or truncating.
    ///
    /// Appends only when the server actually honoured the range; a body
    /// starting at zero always rewrites the file.
    async fn prepare_destination(
        &self,
        path: &Path,
        requested: u64,
        served: u64,
    ) -> Result<(u64, File), TransferError> {
        if served > 0 {
            if served != requested {
                return Err(TransferError::Network(format!(
                    "server resumed at byte {} but {} were requested",
                    served, requested
                )));
            }
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .await
                .map_err(|e| TransferError::from_io(path, e))?;
            return Ok((served, file));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::from_io(parent, e))?;
        }
        let file = File::create(path)
            .await
            .map_err(|e| TransferError::from_io(path, e))?;
        Ok((0, file))
    }

    /// Write the body to `file`, reporting after every chunk.
    ///
    /// Returns the number of bytes written.
    #[allow(clippy::too_many_arguments)]
    async fn stream_download(
        &self,
        mut body: RemoteBody,
        mut file: File,
        path: &Path,
        start: u64,
        total: u64,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    file.flush().await.map_err(|e| TransferError::from_io(path, e))?;
                    return Err(TransferError::Cancelled);
                }
                next = body.chunks.next() => next,
            };

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    file.flush().await.map_err(|e| TransferError::from_io(path, e))?;
                    return Err(e);
                }
                None => break,
            };

            for piece in bytes.chunks(self.chunk_size) {
                file.write_all(piece)
                    .await
                    .map_err(|e| TransferError::from_io(path, e))?;
                written += piece.len() as u64;
                on_progress(start + written, total);
            }
        }

        file.flush()
            .await
            .map_err(|e| TransferError::from_io(path, e))?;

        Ok(written)
    }
}

/// Size of `path`, or `None` if it does not exist.
async fn existing_size(path: &Path) -> Result<Option<u64>, TransferError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TransferError::from_io(path, e)),
    }
}
