//! Dataset file downloads.
//!
//! This module provides functionality for transferring dataset files to
//! disk, including:
//! - Single file transfers with resume support (`transfer`)
//! - Remote byte sources over HTTP (`source`)
//! - Free-space preflight checks (`disk`)
//! - Task lifecycle tracking (`state`)
//! - Bounded-concurrency scheduling (`coordinator`)
//! - Live progress bars (`progress`)
//! - Batch summaries (`summary`)
//! - High-level version and file downloads (`service`)
//!
//! # Architecture
//!
//! ```text
//! Downloader (service)
//!         │
//!         ├── DatasetApi (metadata, presigned URLs)
//!         │
//!         ├── SpaceProbe (preflight)
//!         │
//!         ├── Coordinator (semaphore gate, K in flight)
//!         │       └── FileDownloader ──► ByteSource
//!         │
//!         ├── ProgressAggregator (per-task rows + total)
//!         │
//!         └── DownloadSummary (outcomes, throughput, exit code)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use datamap::api::{ClientConfig, DataMapClient};
//! use datamap::download::{DownloadOptions, Downloader};
//!
//! let api = Arc::new(DataMapClient::new(ClientConfig::from_settings(&settings)?)?);
//! let downloader = Downloader::from_settings(api, &settings)?.with_progress(true);
//!
//! let summary = downloader
//!     .download_version(dataset_id, "v1.0", None, &DownloadOptions::default())
//!     .await?;
//! println!("{}", summary);
//! std::process::exit(summary.exit_code());
//! ```

mod coordinator;
mod disk;
mod error;
mod progress;
mod service;
mod source;
mod state;
mod summary;
mod transfer;

pub use coordinator::Coordinator;
pub use disk::{ensure_space, nearest_existing_ancestor, SpaceProbe, StatvfsProbe};
pub use error::{DownloadError, DownloadResult, ErrorKind, TaskError, TransferError};
pub use progress::{NoProgress, ProgressAggregator, ProgressSink};
pub use service::{
    safe_file_name, unique_file_names, DownloadOptions, Downloader, FilePlan, VersionPlan,
};
pub use source::{ByteSource, HttpSource, RemoteBody};
pub use state::{
    DownloadOutcome, DownloadTask, FileDescriptor, InvalidTransition, TaskId, TaskState,
    TransferProgress,
};
pub use summary::DownloadSummary;
pub use transfer::{FileDownloader, ProgressFn, TransferReport, TransferRequest};
