//! High-level download orchestration.
//!
//! [`Downloader`] turns dataset metadata into download tasks, runs the
//! free-space preflight, and drives the [`Coordinator`] with a job that
//! resolves each presigned URL just before its transfer starts.
//!
//! Both entry points come in two halves so a caller can show what is about
//! to happen (and ask for confirmation) between fetching metadata and
//! moving bytes:
//!
//! - [`Downloader::plan_version`] / [`Downloader::execute_version`]
//! - [`Downloader::plan_file`] / [`Downloader::execute_file`]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::coordinator::Coordinator;
use super::disk::{ensure_space, SpaceProbe, StatvfsProbe};
use super::error::{DownloadError, DownloadResult, ErrorKind, TaskError};
use super::progress::{ProgressAggregator, ProgressSink};
use super::source::{ByteSource, HttpSource};
use super::state::{DownloadOutcome, DownloadTask, FileDescriptor, TaskId, TransferProgress};
use super::summary::DownloadSummary;
use super::transfer::{FileDownloader, TransferReport, TransferRequest};
use crate::api::{DataFile, DatasetApi, Version};
use crate::config::{Settings, DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_CONCURRENCY};

/// Per-operation download switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Simultaneous transfers, 1 to 10. Ignored for single files.
    pub max_concurrency: usize,
    /// Continue partial files instead of truncating them.
    pub resume: bool,
    /// Compare final sizes against the catalogue.
    pub verify: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            resume: false,
            verify: true,
        }
    }
}

impl DownloadOptions {
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// A version download whose metadata has been fetched.
#[derive(Debug, Clone)]
pub struct VersionPlan {
    pub dataset_id: Uuid,
    pub version: Version,
    pub output_dir: PathBuf,
}

impl VersionPlan {
    /// Bytes the whole version occupies.
    pub fn total_size(&self) -> u64 {
        self.version.total_size()
    }

    pub fn file_count(&self) -> usize {
        self.version.file_count()
    }

    /// Where each file will be written, in catalogue order.
    ///
    /// Every file gets its own path; see [`unique_file_names`].
    pub fn output_paths(&self) -> Vec<PathBuf> {
        unique_file_names(&self.version.files)
            .into_iter()
            .map(|name| self.output_dir.join(name))
            .collect()
    }
}

/// A single-file download whose metadata has been fetched.
#[derive(Debug, Clone)]
pub struct FilePlan {
    pub dataset_id: Uuid,
    pub version_name: String,
    pub file: DataFile,
    pub output_path: PathBuf,
}

/// Reduce an API-supplied file name to a bare file name.
///
/// Directory components are dropped so a name can never escape the output
/// directory. Names with nothing usable left fall back to the file id.
pub fn safe_file_name(name: &str, id: Uuid) -> String {
    let last = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    match last {
        "" | "." | ".." => id.to_string(),
        other => other.to_string(),
    }
}

/// Safe, distinct output names for a set of files.
///
/// Files whose safe names collide (compared case-insensitively, since the
/// output directory may be on a case-insensitive filesystem) are prefixed
/// with their id. The result depends only on the list, so a resumed run
/// maps each file to the same name again.
pub fn unique_file_names(files: &[DataFile]) -> Vec<String> {
    let names: Vec<String> = files.iter().map(|f| safe_file_name(&f.name, f.id)).collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in &names {
        *counts.entry(name.to_lowercase()).or_default() += 1;
    }

    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    files
        .iter()
        .zip(names)
        .enumerate()
        .map(|(index, (file, name))| {
            let mut candidate = if counts[&name.to_lowercase()] > 1 {
                format!("{}_{}", file.id, name)
            } else {
                name
            };
            if !taken.insert(candidate.to_lowercase()) {
                // Same id listed twice.
                candidate = format!("{}_{}", index, candidate);
                taken.insert(candidate.to_lowercase());
            }
            candidate
        })
        .collect()
}

/// Everything a running task needs, shared by all tasks of one batch.
struct TaskContext {
    api: Arc<dyn DatasetApi>,
    files: FileDownloader,
    progress: Arc<dyn ProgressSink>,
    dataset_id: Uuid,
    version_name: String,
    resume: bool,
}

impl TaskContext {
    async fn transfer(
        &self,
        task: DownloadTask,
        cancel: CancellationToken,
    ) -> Result<TransferReport, TaskError> {
        let id = task.id;
        let expected = task.descriptor.size_bytes;
        let on_progress = |bytes: u64, total: u64| {
            self.progress.advance(TransferProgress {
                task_id: id,
                bytes_transferred: bytes,
                total_bytes: total,
            })
        };

        // Already complete: no URL request, no transfer.
        if self.resume && task.resume_offset >= expected {
            debug!(task = %id, file = %task.descriptor.name, "File already complete, skipping");
            on_progress(task.resume_offset, expected);
            return Ok(TransferReport {
                bytes_on_disk: task.resume_offset,
                bytes_downloaded: 0,
                resumed_from: task.resume_offset,
                skipped: true,
            });
        }

        let url = match task.download_url {
            Some(url) => url,
            None => {
                self.api
                    .get_file_download_url(self.dataset_id, &self.version_name, task.descriptor.id)
                    .await?
                    .url
            }
        };

        let request = TransferRequest {
            url: &url,
            output_path: &task.output_path,
            expected_size: expected,
            resume: self.resume,
        };
        let report = self.files.download(&request, &on_progress, &cancel).await?;
        Ok(report)
    }
}

/// Downloads dataset files through the platform API.
pub struct Downloader {
    api: Arc<dyn DatasetApi>,
    source: Arc<dyn ByteSource>,
    space: Arc<dyn SpaceProbe>,
    chunk_size: usize,
    show_progress: bool,
    cancel: CancellationToken,
}

impl Downloader {
    /// Create a downloader using `api` for metadata and `source` for bytes.
    ///
    /// Progress bars are off until [`with_progress`](Self::with_progress).
    pub fn new(api: Arc<dyn DatasetApi>, source: Arc<dyn ByteSource>) -> Self {
        Self {
            api,
            source,
            space: Arc::new(StatvfsProbe),
            chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a downloader with an HTTP byte source configured from `settings`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Config` if the HTTP client cannot be built.
    pub fn from_settings(api: Arc<dyn DatasetApi>, settings: &Settings) -> DownloadResult<Self> {
        let source = HttpSource::new(Duration::from_secs(settings.timeout_secs))
            .map_err(|e| DownloadError::Config(e.to_string()))?;
        Ok(Self::new(api, Arc::new(source)).with_chunk_size(settings.chunk_size))
    }

    /// Use a different free-space probe.
    pub fn with_space_probe(mut self, space: Arc<dyn SpaceProbe>) -> Self {
        self.space = space;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Draw progress bars on stderr.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Abort queued and running transfers when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch version metadata and decide where it will be written.
    ///
    /// `output_dir` defaults to a directory named after the version in the
    /// current working directory.
    ///
    /// # Errors
    ///
    /// Any API error, unmodified.
    pub async fn plan_version(
        &self,
        dataset_id: Uuid,
        version_name: &str,
        output_dir: Option<&Path>,
    ) -> DownloadResult<VersionPlan> {
        let version = self.api.get_version(dataset_id, version_name).await?;
        let output_dir = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(safe_file_name(&version.name, version.id)));

        info!(
            dataset_id = %dataset_id,
            version = %version.name,
            file_count = version.file_count(),
            total_bytes = version.total_size(),
            "Version fetched"
        );

        Ok(VersionPlan {
            dataset_id,
            version,
            output_dir,
        })
    }

    /// Download every file of a planned version.
    ///
    /// Free space for the whole version is checked before the output
    /// directory is created or any transfer starts. Per-file failures,
    /// including failures to obtain a download URL, are recorded in the
    /// summary rather than returned.
    ///
    /// # Errors
    ///
    /// - `Config` for an out-of-range concurrency
    /// - `InsufficientSpace` when the target filesystem is too small
    /// - `OutputDir` when the directory cannot be created
    pub async fn execute_version(
        &self,
        plan: &VersionPlan,
        options: &DownloadOptions,
    ) -> DownloadResult<DownloadSummary> {
        let coordinator = Coordinator::new(options.max_concurrency)?;

        if plan.version.files.is_empty() {
            info!(version = %plan.version.name, "Version has no files, nothing to download");
            return Ok(DownloadSummary::empty());
        }

        let required = plan.total_size();
        ensure_space(self.space.as_ref(), &plan.output_dir, required)?;
        create_dir(&plan.output_dir).await?;

        let mut tasks = Vec::with_capacity(plan.file_count());
        let paths = plan.output_paths();
        for (index, (file, output_path)) in plan.version.files.iter().zip(paths).enumerate() {
            let offset = if options.resume {
                on_disk_size(&output_path).await
            } else {
                0
            };
            tasks.push(
                DownloadTask::new(TaskId(index), FileDescriptor::from(file), output_path)
                    .with_resume_offset(offset),
            );
        }

        let progress = Arc::new(ProgressAggregator::new(required, self.show_progress));
        let context = Arc::new(TaskContext {
            api: Arc::clone(&self.api),
            files: self.file_downloader(options),
            progress: progress.clone(),
            dataset_id: plan.dataset_id,
            version_name: plan.version.name.clone(),
            resume: options.resume,
        });

        info!(
            version = %plan.version.name,
            files = tasks.len(),
            max_concurrency = options.max_concurrency,
            output_dir = %plan.output_dir.display(),
            "Starting version download"
        );

        let started = Instant::now();
        let outcomes = coordinator
            .with_progress(progress.clone())
            .with_cancellation(self.cancel.clone())
            .run(tasks, move |task, cancel| {
                let context = Arc::clone(&context);
                async move { context.transfer(task, cancel).await }
            })
            .await;
        let elapsed = started.elapsed();
        progress.stop();

        let summary = DownloadSummary::from_outcomes(outcomes, required, elapsed);
        info!(
            succeeded = summary.success_count,
            failed = summary.failure_count,
            skipped = summary.skipped_count,
            bytes = summary.bytes_downloaded,
            elapsed_ms = elapsed.as_millis() as u64,
            "Version download finished"
        );
        Ok(summary)
    }

    /// Fetch metadata for, then download, every file of a version.
    pub async fn download_version(
        &self,
        dataset_id: Uuid,
        version_name: &str,
        output_dir: Option<&Path>,
        options: &DownloadOptions,
    ) -> DownloadResult<DownloadSummary> {
        let plan = self.plan_version(dataset_id, version_name, output_dir).await?;
        self.execute_version(&plan, options).await
    }

    /// Look up a file in a version and decide where it will be written.
    ///
    /// `output_path` defaults to the file's name in the current working
    /// directory.
    ///
    /// # Errors
    ///
    /// - Any API error, unmodified
    /// - `FileNotInVersion` if the version does not list `file_id`
    pub async fn plan_file(
        &self,
        dataset_id: Uuid,
        version_name: &str,
        file_id: Uuid,
        output_path: Option<&Path>,
    ) -> DownloadResult<FilePlan> {
        let version = self.api.get_version(dataset_id, version_name).await?;
        let file = version
            .file(file_id)
            .cloned()
            .ok_or_else(|| DownloadError::FileNotInVersion {
                file_id,
                version: version.name.clone(),
            })?;

        let output_path = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(safe_file_name(&file.name, file.id)));

        debug!(file_id = %file_id, file = %file.name, size = file.size_bytes, "File located");

        Ok(FilePlan {
            dataset_id,
            version_name: version.name,
            file,
            output_path,
        })
    }

    /// Download a planned single file.
    ///
    /// Transfer failures are reported in the returned outcome.
    ///
    /// # Errors
    ///
    /// - `InsufficientSpace` when the target filesystem is too small
    /// - `OutputDir` when the parent directory cannot be created
    /// - Any API error raised while obtaining the download URL
    pub async fn execute_file(
        &self,
        plan: &FilePlan,
        options: &DownloadOptions,
    ) -> DownloadResult<DownloadOutcome> {
        let size = plan.file.size_bytes;
        let parent = plan
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        ensure_space(self.space.as_ref(), parent, size)?;
        create_dir(parent).await?;

        let offset = if options.resume {
            on_disk_size(&plan.output_path).await
        } else {
            0
        };
        let mut task = DownloadTask::new(
            TaskId(0),
            FileDescriptor::from(&plan.file),
            plan.output_path.clone(),
        )
        .with_resume_offset(offset);

        if !(options.resume && offset >= size) {
            let url = self
                .api
                .get_file_download_url(plan.dataset_id, &plan.version_name, plan.file.id)
                .await?;
            task = task.with_url(url.url);
        }

        let progress = Arc::new(ProgressAggregator::new(size, self.show_progress));
        let context = Arc::new(TaskContext {
            api: Arc::clone(&self.api),
            files: self.file_downloader(options),
            progress: progress.clone(),
            dataset_id: plan.dataset_id,
            version_name: plan.version_name.clone(),
            resume: options.resume,
        });

        info!(
            file = %plan.file.name,
            size,
            output = %plan.output_path.display(),
            "Starting file download"
        );

        let mut outcomes = Coordinator::new(1)?
            .with_progress(progress.clone())
            .with_cancellation(self.cancel.clone())
            .run(vec![task], move |task, cancel| {
                let context = Arc::clone(&context);
                async move { context.transfer(task, cancel).await }
            })
            .await;
        progress.stop();

        Ok(outcomes.pop().unwrap_or_else(|| {
            DownloadOutcome::failed(
                TaskId(0),
                plan.file.name.clone(),
                ErrorKind::Internal,
                "download produced no outcome",
            )
        }))
    }

    /// Fetch metadata for, then download, a single file.
    pub async fn download_file(
        &self,
        dataset_id: Uuid,
        version_name: &str,
        file_id: Uuid,
        output_path: Option<&Path>,
        options: &DownloadOptions,
    ) -> DownloadResult<DownloadOutcome> {
        let plan = self
            .plan_file(dataset_id, version_name, file_id, output_path)
            .await?;
        self.execute_file(&plan, options).await
    }

    fn file_downloader(&self, options: &DownloadOptions) -> FileDownloader {
        FileDownloader::new(Arc::clone(&self.source))
            .with_chunk_size(self.chunk_size)
            .with_verify_size(options.verify)
    }
}

async fn create_dir(path: &Path) -> DownloadResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| DownloadError::OutputDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Size of an existing output file; zero when absent or unreadable.
async fn on_disk_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_strips_directories() {
        let id = Uuid::nil();
        assert_eq!(safe_file_name("data.csv", id), "data.csv");
        assert_eq!(safe_file_name("../../etc/passwd", id), "passwd");
        assert_eq!(safe_file_name("raw\\2024\\a.parquet", id), "a.parquet");
    }

    #[test]
    fn test_safe_file_name_falls_back_to_id() {
        let id = Uuid::from_u128(0x1234);
        assert_eq!(safe_file_name("", id), id.to_string());
        assert_eq!(safe_file_name("dir/", id), id.to_string());
        assert_eq!(safe_file_name("..", id), id.to_string());
    }

    fn file(id: u128, name: &str) -> DataFile {
        DataFile {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            size_bytes: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            extension: None,
            format: None,
            storage_file_name: None,
            storage_path: None,
            created_by: None,
        }
    }

    #[test]
    fn test_unique_names_keep_distinct_files_apart() {
        let files = vec![
            file(1, "north/data.csv"),
            file(2, "south/data.csv"),
            file(3, "readme.txt"),
            file(4, "DATA.CSV"),
        ];
        let names = unique_file_names(&files);

        assert_eq!(names[0], format!("{}_data.csv", Uuid::from_u128(1)));
        assert_eq!(names[1], format!("{}_data.csv", Uuid::from_u128(2)));
        assert_eq!(names[2], "readme.txt");
        assert_eq!(names[3], format!("{}_DATA.CSV", Uuid::from_u128(4)));
        assert_eq!(unique_file_names(&files), names);
    }

    #[test]
    fn test_unique_names_handle_repeated_ids() {
        let files = vec![file(7, "a.bin"), file(7, "a.bin")];
        let names = unique_file_names(&files);
        assert_ne!(names[0].to_lowercase(), names[1].to_lowercase());
    }

    #[test]
    fn test_default_options() {
        let options = DownloadOptions::default();
        assert_eq!(options.max_concurrency, 3);
        assert!(!options.resume);
        assert!(options.verify);

        let options = options.with_concurrency(5).with_resume(true).with_verify(false);
        assert_eq!(options.max_concurrency, 5);
        assert!(options.resume);
        assert!(!options.verify);
    }
}
