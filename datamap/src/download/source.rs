//! Remote byte sources for file transfers.
//!
//! [`ByteSource`] hides the HTTP layer from the transfer loop so resume and
//! failure handling can be tested against in-memory bodies.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tracing::debug;

use super::error::TransferError;
use crate::BoxFuture;

/// An opened response body.
pub struct RemoteBody {
    /// Offset of the first byte in `chunks`.
    ///
    /// Zero when a range was requested but the server sent the whole file.
    pub start: u64,
    pub chunks: BoxStream<'static, Result<Bytes, TransferError>>,
}

/// Opens download URLs, optionally from a byte offset.
pub trait ByteSource: Send + Sync {
    /// Open `url` starting at `offset`.
    ///
    /// An `offset` of zero requests the whole body.
    fn open<'a>(&'a self, url: &'a str, offset: u64) -> BoxFuture<'a, Result<RemoteBody, TransferError>>;
}

/// reqwest-backed [`ByteSource`].
///
/// `timeout` bounds connecting and every individual read, not the whole
/// transfer, so a large file may stream for as long as data keeps arriving
/// while a stalled server fails the task instead of holding its slot.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source whose connect and read phases time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        Self::from_builder(Self::client_builder(timeout))
    }

    pub(crate) fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
    }

    pub(crate) fn from_builder(builder: reqwest::ClientBuilder) -> Result<Self, TransferError> {
        let client = builder
            .build()
            .map_err(|e| TransferError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn open_url(&self, url: &str, offset: u64) -> Result<RemoteBody, TransferError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let start = match status {
            StatusCode::PARTIAL_CONTENT => offset,
            s if s.is_success() => {
                if offset > 0 {
                    debug!(offset, "Server ignored range request, restarting from zero");
                }
                0
            }
            s => return Err(TransferError::Http { status: s.as_u16() }),
        };

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| classify_transport(&e)))
            .boxed();

        Ok(RemoteBody { start, chunks })
    }
}

/// Map a reqwest failure to a transfer error, keeping timeouts distinct.
fn classify_transport(e: &reqwest::Error) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout(e.to_string())
    } else {
        TransferError::Network(e.to_string())
    }
}

impl ByteSource for HttpSource {
    fn open<'a>(&'a self, url: &'a str, offset: u64) -> BoxFuture<'a, Result<RemoteBody, TransferError>> {
        Box::pin(self.open_url(url, offset))
    }
}
