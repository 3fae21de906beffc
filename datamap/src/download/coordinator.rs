//! Bounded-concurrency scheduling of download tasks.
//!
//! Every task is spawned immediately and then waits on a shared semaphore
//! of capacity `K` before doing any work, so at most `K` jobs run at once.
//! Permits are owned by the task future and are released when it ends,
//! including by panic. Outcomes are collected by awaiting the join handles
//! in submission order.

use std::future::Future;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::error::{DownloadError, DownloadResult, ErrorKind, TaskError};
use super::progress::{NoProgress, ProgressSink};
use super::state::{DownloadOutcome, DownloadTask, TaskId, TaskState};
use super::transfer::TransferReport;
use crate::config::CONCURRENCY_RANGE;

/// Runs download tasks with at most `max_concurrency` in flight.
#[derive(Clone)]
pub struct Coordinator {
    max_concurrency: usize,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Create a coordinator.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Config` unless `1 <= max_concurrency <= 10`.
    pub fn new(max_concurrency: usize) -> DownloadResult<Self> {
        let (min, max) = CONCURRENCY_RANGE;
        if !(min..=max).contains(&max_concurrency) {
            return Err(DownloadError::Config(format!(
                "max concurrency must be between {} and {} (got {})",
                min, max, max_concurrency
            )));
        }
        Ok(Self {
            max_concurrency,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        })
    }

    /// Report task lifecycle and byte progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop admitting tasks once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `job` for every task and return one outcome per task, in the
    /// order the tasks were given.
    ///
    /// A failing or panicking job only fails its own task.
    pub async fn run<F, Fut>(&self, tasks: Vec<DownloadTask>, job: F) -> Vec<DownloadOutcome>
    where
        F: Fn(DownloadTask, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TransferReport, TaskError>> + Send + 'static,
    {
        let gate = Arc::new(Semaphore::new(self.max_concurrency));
        let job = Arc::new(job);

        debug!(
            tasks = tasks.len(),
            max_concurrency = self.max_concurrency,
            "Scheduling downloads"
        );

        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = task.id;
            let name = task.descriptor.name.clone();
            let handle = tokio::spawn(run_task(
                task,
                Arc::clone(&gate),
                Arc::clone(&job),
                Arc::clone(&self.progress),
                self.cancel.clone(),
            ));
            handles.push((id, name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(task = %id, file = %name, error = %e, "Download task aborted");
                    self.progress.finish(id, TaskState::Failed);
                    DownloadOutcome::failed(
                        id,
                        name,
                        ErrorKind::Internal,
                        format!("download task aborted: {}", e),
                    )
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn set_state(task: &mut DownloadTask, next: TaskState) {
    if let Err(e) = task.transition(next) {
        warn!(task = %task.id, error = %e, "Ignoring invalid state change");
    }
}

async fn run_task<F, Fut>(
    mut task: DownloadTask,
    gate: Arc<Semaphore>,
    job: Arc<F>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> DownloadOutcome
where
    F: Fn(DownloadTask, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TransferReport, TaskError>> + Send + 'static,
{
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = gate.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        set_state(&mut task, TaskState::Failed);
        return DownloadOutcome::failed(
            task.id,
            task.descriptor.name,
            ErrorKind::Cancelled,
            "cancelled before start",
        );
    };

    set_state(&mut task, TaskState::InProgress);
    progress.begin(task.id, &task.descriptor.name, task.descriptor.size_bytes);
    debug!(task = %task.id, file = %task.descriptor.name, "Download started");

    let result = job(task.clone(), cancel).await;

    let outcome = match result {
        Ok(report) if report.skipped => {
            set_state(&mut task, TaskState::Skipped);
            DownloadOutcome::skipped(task.id, task.descriptor.name.clone(), report.bytes_on_disk)
        }
        Ok(report) => {
            set_state(&mut task, TaskState::Completed);
            DownloadOutcome::completed(
                task.id,
                task.descriptor.name.clone(),
                report.bytes_on_disk,
                report.bytes_downloaded,
            )
        }
        Err(e) => {
            set_state(&mut task, TaskState::Failed);
            warn!(task = %task.id, file = %task.descriptor.name, error = %e, "Download failed");
            let on_disk = fs::metadata(&task.output_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            DownloadOutcome::failed(task.id, task.descriptor.name.clone(), e.kind(), e.to_string())
                .with_bytes_written(on_disk)
        }
    };

    progress.finish(task.id, outcome.state);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::error::TransferError;
    use crate::download::progress::ProgressAggregator;
    use crate::download::state::FileDescriptor;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn tasks(sizes: &[u64]) -> Vec<DownloadTask> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                DownloadTask::new(
                    TaskId(i),
                    FileDescriptor {
                        id: Uuid::nil(),
                        name: format!("file-{}.bin", i),
                        size_bytes: size,
                        format: None,
                        created_at: Utc::now(),
                    },
                    PathBuf::from(format!("/tmp/file-{}.bin", i)),
                )
            })
            .collect()
    }

    fn report(size: u64) -> TransferReport {
        TransferReport {
            bytes_on_disk: size,
            bytes_downloaded: size,
            resumed_from: 0,
            skipped: false,
        }
    }

    #[test]
    fn test_concurrency_bounds_enforced() {
        assert!(Coordinator::new(0).is_err());
        assert!(Coordinator::new(11).is_err());
        assert_eq!(Coordinator::new(10).unwrap().max_concurrency(), 10);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        for k in 1..=4 {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let job = {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                move |task: DownloadTask, _cancel: CancellationToken| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(report(task.descriptor.size_bytes))
                    }
                }
            };

            let outcomes = Coordinator::new(k)
                .unwrap()
                .run(tasks(&[10; 12]), job)
                .await;

            assert_eq!(outcomes.len(), 12);
            assert!(peak.load(Ordering::SeqCst) <= k, "k={} peak={}", k, peak.load(Ordering::SeqCst));
            assert!(peak.load(Ordering::SeqCst) >= 1);
        }
    }

    #[tokio::test]
    async fn test_outcomes_follow_submission_order() {
        // Earlier tasks sleep longer, so they finish last.
        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            let delay = 30 - 10 * task.id.0 as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(report(task.descriptor.size_bytes))
        };

        let outcomes = Coordinator::new(3)
            .unwrap()
            .run(tasks(&[1, 2, 3]), job)
            .await;

        let ids: Vec<usize> = outcomes.iter().map(|o| o.task_id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        let sizes: Vec<u64> = outcomes.iter().map(|o| o.bytes_written).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_affect_siblings() {
        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            if task.id.0 == 1 {
                return Err(TaskError::Transfer(TransferError::Io {
                    path: task.output_path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "simulated"),
                }));
            }
            Ok(report(task.descriptor.size_bytes))
        };

        let outcomes = Coordinator::new(2)
            .unwrap()
            .run(tasks(&[10, 20, 30]), job)
            .await;

        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[2].success);
        assert_eq!(outcomes[1].error, Some(ErrorKind::Io));
        assert_eq!(outcomes.iter().filter(|o| !o.success).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_outcome_reports_partial_bytes_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut batch = tasks(&[1000]);
        batch[0].output_path = dir.path().join("partial.bin");

        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            tokio::fs::write(&task.output_path, vec![0u8; 700]).await.unwrap();
            Err(TaskError::Transfer(TransferError::SizeMismatch {
                expected: 1000,
                actual: 700,
            }))
        };

        let outcomes = Coordinator::new(1).unwrap().run(batch, job).await;

        assert_eq!(outcomes[0].error, Some(ErrorKind::SizeMismatch));
        assert_eq!(outcomes[0].bytes_written, 700);
        assert_eq!(outcomes[0].bytes_downloaded, 0);
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_failed_outcome() {
        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            if task.id.0 == 0 {
                panic!("job exploded");
            }
            Ok(report(task.descriptor.size_bytes))
        };

        let outcomes = Coordinator::new(1)
            .unwrap()
            .run(tasks(&[10, 20]), job)
            .await;

        assert_eq!(outcomes[0].error, Some(ErrorKind::Internal));
        // The permit held by the panicking task was released.
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn test_skipped_report_maps_to_skipped_state() {
        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            Ok(TransferReport {
                skipped: true,
                bytes_downloaded: 0,
                ..report(task.descriptor.size_bytes)
            })
        };

        let outcomes = Coordinator::new(1).unwrap().run(tasks(&[5]), job).await;
        assert_eq!(outcomes[0].state, TaskState::Skipped);
        assert!(outcomes[0].success);
    }

    #[tokio::test]
    async fn test_cancelled_batch_never_runs_jobs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let job = {
            let calls = Arc::clone(&calls);
            move |task: DownloadTask, _cancel: CancellationToken| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(report(task.descriptor.size_bytes)) }
            }
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = Coordinator::new(2)
            .unwrap()
            .with_cancellation(cancel)
            .run(tasks(&[1, 2, 3]), job)
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(outcomes
            .iter()
            .all(|o| o.error == Some(ErrorKind::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_rows_finished_for_every_task() {
        let agg = Arc::new(ProgressAggregator::new(30, false));
        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            Ok(report(task.descriptor.size_bytes))
        };

        Coordinator::new(2)
            .unwrap()
            .with_progress(agg.clone())
            .run(tasks(&[10, 20]), job)
            .await;

        assert_eq!(agg.transferred(TaskId(0)), Some(0));
        assert_eq!(agg.transferred(TaskId(1)), Some(0));
        assert!(agg.stop());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let job = |task: DownloadTask, _cancel: CancellationToken| async move {
            Ok(report(task.descriptor.size_bytes))
        };
        let outcomes = Coordinator::new(3).unwrap().run(Vec::new(), job).await;
        assert!(outcomes.is_empty());
    }
}
