//! Integration tests for version and file downloads.
//!
//! These tests drive the public [`Downloader`] API end to end against an
//! in-memory catalogue and byte source:
//! - metadata → preflight → coordinator → transfers → summary
//! - disk space rejection before anything is written
//! - per-file failure isolation and resume skips
//!
//! Run with: `cargo test --test download_integration`

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tempfile::TempDir;
use uuid::Uuid;

use datamap::api::{ApiError, ApiResult, DataFile, Dataset, DatasetApi, DownloadUrl, Version};
use datamap::download::{
    ByteSource, DownloadError, DownloadOptions, Downloader, ErrorKind, RemoteBody, SpaceProbe,
    TaskState, TransferError,
};
use datamap::BoxFuture;

// ============================================================================
// In-memory platform
// ============================================================================

const VERSION: &str = "v1.0";

fn dataset_id() -> Uuid {
    Uuid::from_u128(0xD47A)
}

fn file_id(index: usize) -> Uuid {
    Uuid::from_u128(0xF000 + index as u128)
}

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn data_file(index: usize, size: u64) -> DataFile {
    DataFile {
        id: file_id(index),
        name: format!("part-{}.bin", index),
        size_bytes: size,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        extension: Some("bin".to_string()),
        format: None,
        storage_file_name: None,
        storage_path: None,
        created_by: None,
    }
}

fn version_with(files: Vec<DataFile>) -> Version {
    Version {
        id: Uuid::from_u128(0x5E5),
        name: VERSION.to_string(),
        design_state: "published".to_string(),
        is_enabled: true,
        files,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Catalogue with one dataset and one version.
struct FakeApi {
    version: Version,
    /// Files whose download URL request fails.
    broken_urls: HashSet<Uuid>,
    url_requests: AtomicUsize,
}

impl FakeApi {
    fn new(version: Version) -> Self {
        Self {
            version,
            broken_urls: HashSet::new(),
            url_requests: AtomicUsize::new(0),
        }
    }

    fn with_broken_url(mut self, id: Uuid) -> Self {
        self.broken_urls.insert(id);
        self
    }

    fn url_requests(&self) -> usize {
        self.url_requests.load(Ordering::SeqCst)
    }
}

fn url_for(id: Uuid) -> String {
    format!("https://storage.test/{}", id)
}

impl DatasetApi for FakeApi {
    fn get_dataset(&self, dataset_id: Uuid) -> BoxFuture<'_, ApiResult<Dataset>> {
        Box::pin(async move {
            Err(ApiError::NotFound {
                resource: "Dataset".to_string(),
                id: dataset_id.to_string(),
            })
        })
    }

    fn get_version<'a>(
        &'a self,
        id: Uuid,
        version_name: &'a str,
    ) -> BoxFuture<'a, ApiResult<Version>> {
        Box::pin(async move {
            if id != dataset_id() || version_name != self.version.name {
                return Err(ApiError::NotFound {
                    resource: "Version".to_string(),
                    id: version_name.to_string(),
                });
            }
            Ok(self.version.clone())
        })
    }

    fn get_file_download_url<'a>(
        &'a self,
        _dataset_id: Uuid,
        _version_name: &'a str,
        file_id: Uuid,
    ) -> BoxFuture<'a, ApiResult<DownloadUrl>> {
        Box::pin(async move {
            self.url_requests.fetch_add(1, Ordering::SeqCst);
            if self.broken_urls.contains(&file_id) {
                return Err(ApiError::Server { status: 503 });
            }
            Ok(DownloadUrl {
                url: url_for(file_id),
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Byte store keyed by URL, honouring range offsets.
#[derive(Default)]
struct FakeStorage {
    objects: HashMap<String, Vec<u8>>,
    opens: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    offsets: Mutex<Vec<u64>>,
}

impl FakeStorage {
    fn with_object(mut self, id: Uuid, data: Vec<u8>) -> Self {
        self.objects.insert(url_for(id), data);
        self
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ByteSource for FakeStorage {
    fn open<'a>(
        &'a self,
        url: &'a str,
        offset: u64,
    ) -> BoxFuture<'a, Result<RemoteBody, TransferError>> {
        Box::pin(async move {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.offsets.lock().unwrap().push(offset);

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let data = self
                .objects
                .get(url)
                .ok_or(TransferError::Http { status: 404 })?;
            let body: Vec<Result<Bytes, TransferError>> = data[offset as usize..]
                .chunks(700)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();

            Ok::<_, TransferError>(RemoteBody {
                start: offset,
                chunks: stream::iter(body).boxed(),
            })
        })
    }
}

struct FixedSpace(u64);

impl SpaceProbe for FixedSpace {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const SIZES: [usize; 3] = [1024, 2048, 4096];

fn three_file_platform() -> (Version, FakeStorage) {
    let files: Vec<DataFile> = SIZES
        .iter()
        .enumerate()
        .map(|(i, &size)| data_file(i, size as u64))
        .collect();
    let storage = SIZES
        .iter()
        .enumerate()
        .fold(FakeStorage::default(), |storage, (i, &size)| {
            storage.with_object(file_id(i), payload(size, i as u8))
        });
    (version_with(files), storage)
}

fn downloader(api: Arc<FakeApi>, storage: Arc<FakeStorage>, free: u64) -> Downloader {
    Downloader::new(api, storage)
        .with_space_probe(Arc::new(FixedSpace(free)))
        .with_chunk_size(1024)
}

// ============================================================================
// Version Downloads
// ============================================================================

/// Three files with K=2: everything lands on disk and the tally is exact.
#[tokio::test]
async fn test_version_download_three_files() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("v1");
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version));
    let storage = Arc::new(storage);

    let summary = downloader(Arc::clone(&api), Arc::clone(&storage), u64::MAX)
        .download_version(
            dataset_id(),
            VERSION,
            Some(&out),
            &DownloadOptions::default().with_concurrency(2),
        )
        .await
        .unwrap();

    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.failure_count, 0);
    assert_eq!(summary.total_bytes, 7168);
    assert_eq!(summary.bytes_requested, 7168);
    assert_eq!(summary.exit_code(), 0);
    assert!(storage.peak() <= 2);
    assert_eq!(api.url_requests(), 3);

    for (i, &size) in SIZES.iter().enumerate() {
        let written = std::fs::read(out.join(format!("part-{}.bin", i))).unwrap();
        assert_eq!(written, payload(size, i as u8));
    }

    let names: Vec<&str> = summary.outcomes.iter().map(|o| o.file_name.as_str()).collect();
    assert_eq!(names, vec!["part-0.bin", "part-1.bin", "part-2.bin"]);
}

/// Files sharing a name in different folders each keep their own bytes.
#[tokio::test]
async fn test_same_named_files_do_not_overwrite_each_other() {
    let dir = TempDir::new().unwrap();
    let mut north = data_file(0, 1000);
    north.name = "north/data.csv".to_string();
    let mut south = data_file(1, 2000);
    south.name = "south/data.csv".to_string();
    let api = Arc::new(FakeApi::new(version_with(vec![north, south])));
    let storage = FakeStorage::default()
        .with_object(file_id(0), payload(1000, 1))
        .with_object(file_id(1), payload(2000, 2));

    let summary = downloader(api, Arc::new(storage), u64::MAX)
        .download_version(
            dataset_id(),
            VERSION,
            Some(dir.path()),
            &DownloadOptions::default().with_concurrency(2),
        )
        .await
        .unwrap();

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 0);

    let north_path = dir.path().join(format!("{}_data.csv", file_id(0)));
    let south_path = dir.path().join(format!("{}_data.csv", file_id(1)));
    assert_eq!(std::fs::read(north_path).unwrap(), payload(1000, 1));
    assert_eq!(std::fs::read(south_path).unwrap(), payload(2000, 2));
    assert!(!dir.path().join("data.csv").exists());
}

/// Not enough free space: abort before any request, nothing created.
#[tokio::test]
async fn test_insufficient_space_aborts_before_transfer() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("v1");
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version));
    let storage = Arc::new(storage);

    let err = downloader(Arc::clone(&api), Arc::clone(&storage), 1000)
        .download_version(dataset_id(), VERSION, Some(&out), &DownloadOptions::default())
        .await
        .unwrap_err();

    match err {
        DownloadError::InsufficientSpace {
            required,
            available,
            ..
        } => {
            assert_eq!(required, 7168);
            assert_eq!(available, 1000);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(api.url_requests(), 0);
    assert_eq!(storage.opens(), 0);
    assert!(!out.exists());
}

/// A broken URL fails only its own file.
#[tokio::test]
async fn test_url_failure_isolated_to_one_file() {
    let dir = TempDir::new().unwrap();
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version).with_broken_url(file_id(1)));

    let summary = downloader(api, Arc::new(storage), u64::MAX)
        .download_version(
            dataset_id(),
            VERSION,
            Some(dir.path()),
            &DownloadOptions::default().with_concurrency(3),
        )
        .await
        .unwrap();

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.exit_code(), 1);

    let failed: Vec<_> = summary.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_name, "part-1.bin");
    assert_eq!(failed[0].error, Some(ErrorKind::Server));
    assert!(summary.to_string().contains("part-1.bin [server]"));
}

/// With resume, complete files are skipped and partial ones continue.
#[tokio::test]
async fn test_resume_skips_complete_and_continues_partial() {
    let dir = TempDir::new().unwrap();
    let (version, storage) = three_file_platform();
    std::fs::write(dir.path().join("part-0.bin"), payload(1024, 0)).unwrap();
    std::fs::write(dir.path().join("part-2.bin"), &payload(4096, 2)[..1500]).unwrap();

    let api = Arc::new(FakeApi::new(version));
    let storage = Arc::new(storage);

    let summary = downloader(Arc::clone(&api), Arc::clone(&storage), u64::MAX)
        .download_version(
            dataset_id(),
            VERSION,
            Some(dir.path()),
            &DownloadOptions::default().with_concurrency(1).with_resume(true),
        )
        .await
        .unwrap();

    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.skipped_count, 1);
    assert_eq!(summary.outcomes[0].state, TaskState::Skipped);
    assert_eq!(summary.bytes_downloaded, 2048 + (4096 - 1500));
    // The complete file needed neither a URL nor a transfer.
    assert_eq!(api.url_requests(), 2);
    assert_eq!(storage.opens(), 2);
    let mut offsets = storage.offsets.lock().unwrap().clone();
    offsets.sort_unstable();
    assert_eq!(offsets, vec![0, 1500]);
    assert_eq!(
        std::fs::read(dir.path().join("part-2.bin")).unwrap(),
        payload(4096, 2)
    );
}

/// A version without files is an empty, successful batch.
#[tokio::test]
async fn test_empty_version_is_successful() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("empty");
    let api = Arc::new(FakeApi::new(version_with(Vec::new())));

    let summary = downloader(api, Arc::new(FakeStorage::default()), 0)
        .download_version(dataset_id(), VERSION, Some(&out), &DownloadOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.total_files, 0);
    assert!(summary.is_success());
}

/// Metadata errors come back unmodified.
#[tokio::test]
async fn test_unknown_version_surfaces_api_error() {
    let api = Arc::new(FakeApi::new(version_with(Vec::new())));

    let err = downloader(api, Arc::new(FakeStorage::default()), u64::MAX)
        .download_version(dataset_id(), "v9", None, &DownloadOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::Api(ApiError::NotFound { ref resource, .. }) if resource == "Version"
    ));
}

#[tokio::test]
async fn test_out_of_range_concurrency_rejected() {
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version));

    let err = downloader(api, Arc::new(storage), u64::MAX)
        .download_version(
            dataset_id(),
            VERSION,
            None,
            &DownloadOptions::default().with_concurrency(11),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ============================================================================
// Single File Downloads
// ============================================================================

#[tokio::test]
async fn test_single_file_download() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested").join("copy.bin");
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version));

    let outcome = downloader(api, Arc::new(storage), u64::MAX)
        .download_file(
            dataset_id(),
            VERSION,
            file_id(1),
            Some(&target),
            &DownloadOptions::default(),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.state, TaskState::Completed);
    assert_eq!(outcome.bytes_written, 2048);
    assert_eq!(std::fs::read(&target).unwrap(), payload(2048, 1));
}

#[tokio::test]
async fn test_file_missing_from_version() {
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version));
    let missing = Uuid::from_u128(0xBAD);

    let err = downloader(api, Arc::new(storage), u64::MAX)
        .download_file(dataset_id(), VERSION, missing, None, &DownloadOptions::default())
        .await
        .unwrap_err();

    match err {
        DownloadError::FileNotInVersion { file_id, version } => {
            assert_eq!(file_id, missing);
            assert_eq!(version, VERSION);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_single_file_url_error_is_operation_error() {
    let dir = TempDir::new().unwrap();
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version).with_broken_url(file_id(0)));

    let err = downloader(api, Arc::new(storage), u64::MAX)
        .download_file(
            dataset_id(),
            VERSION,
            file_id(0),
            Some(&dir.path().join("a.bin")),
            &DownloadOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Api(ApiError::Server { status: 503 })));
}

#[tokio::test]
async fn test_single_file_insufficient_space() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("a.bin");
    let (version, storage) = three_file_platform();
    let api = Arc::new(FakeApi::new(version));

    let err = downloader(api, Arc::new(storage), 100)
        .download_file(
            dataset_id(),
            VERSION,
            file_id(0),
            Some(&target),
            &DownloadOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DiskFull);
    assert!(!target.exists());
}
