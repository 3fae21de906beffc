//! Task and outcome types for scheduled downloads.
//!
//! A [`DownloadTask`] moves through [`TaskState`]:
//!
//! ```text
//! Pending ──► InProgress ──┬──► Completed
//!    │                     ├──► Failed
//!    │                     └──► Skipped
//!    └──────────────────────────► Failed   (cancelled before admission)
//! ```
//!
//! Terminal states are final.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::error::ErrorKind;
use crate::api::DataFile;

/// Position of a task in its batch. Outcomes are reported in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// The file was already complete on disk.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::InProgress, Self::Skipped)
        )
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid task transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// What is being downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub format: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&DataFile> for FileDescriptor {
    fn from(file: &DataFile) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            size_bytes: file.size_bytes,
            format: file.format.clone(),
            created_at: file.created_at,
        }
    }
}

/// One file transfer owned by the coordinator.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: TaskId,
    pub descriptor: FileDescriptor,
    /// Resolved lazily, inside the admission gate, when `None`.
    pub download_url: Option<String>,
    pub output_path: PathBuf,
    /// Bytes already on disk when the task was created.
    pub resume_offset: u64,
    state: TaskState,
}

impl DownloadTask {
    pub fn new(id: TaskId, descriptor: FileDescriptor, output_path: PathBuf) -> Self {
        Self {
            id,
            descriptor,
            download_url: None,
            output_path,
            resume_offset: 0,
            state: TaskState::Pending,
        }
    }

    /// Use a download URL that is already known.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn with_resume_offset(mut self, offset: u64) -> Self {
        self.resume_offset = offset;
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`, rejecting transitions out of terminal states.
    pub fn transition(&mut self, next: TaskState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Byte-level progress of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub task_id: TaskId,
    /// Bytes present in the output file, including any resumed prefix.
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Terminal result of one task, produced exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub task_id: TaskId,
    pub file_name: String,
    pub state: TaskState,
    pub success: bool,
    /// Size of the output file when the task ended.
    pub bytes_written: u64,
    /// Bytes received from the network during this run.
    pub bytes_downloaded: u64,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl DownloadOutcome {
    pub fn completed(
        task_id: TaskId,
        file_name: impl Into<String>,
        bytes_written: u64,
        bytes_downloaded: u64,
    ) -> Self {
        Self {
            task_id,
            file_name: file_name.into(),
            state: TaskState::Completed,
            success: true,
            bytes_written,
            bytes_downloaded,
            error: None,
            message: None,
        }
    }

    pub fn skipped(task_id: TaskId, file_name: impl Into<String>, bytes_on_disk: u64) -> Self {
        Self {
            task_id,
            file_name: file_name.into(),
            state: TaskState::Skipped,
            success: true,
            bytes_written: bytes_on_disk,
            bytes_downloaded: 0,
            error: None,
            message: Some("already complete".to_string()),
        }
    }

    pub fn failed(
        task_id: TaskId,
        file_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            file_name: file_name.into(),
            state: TaskState::Failed,
            success: false,
            bytes_written: 0,
            bytes_downloaded: 0,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    /// Record how much of the output file exists, e.g. a partial transfer.
    pub fn with_bytes_written(mut self, bytes_written: u64) -> Self {
        self.bytes_written = bytes_written;
        self
    }
}
