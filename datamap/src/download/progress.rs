//! Progress reporting for concurrent downloads.
//!
//! Each task owns a row keyed by its [`TaskId`]. Updates are fire-and-forget
//! atomic stores plus an `indicatif` redraw request; no lock is held while a
//! transfer performs I/O.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::state::{TaskId, TaskState, TransferProgress};

const ROW_TEMPLATE: &str = "{spinner:.blue} {prefix:>24.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

const TOTAL_TEMPLATE: &str =
    "{prefix:>26.bold} [{elapsed_precise}] {wide_bar:.green/white} {bytes}/{total_bytes} ({bytes_per_sec})";

const BAR_CHARS: &str = "█▓▒░  ";

/// Longest file name shown in a row prefix.
const MAX_PREFIX_CHARS: usize = 24;

/// Receives progress from running tasks.
pub trait ProgressSink: Send + Sync {
    /// A task was admitted and is about to transfer `total_bytes`.
    fn begin(&self, task: TaskId, name: &str, total_bytes: u64);

    /// Absolute progress for a task. Must be cheap and non-blocking.
    fn advance(&self, progress: TransferProgress);

    /// A task reached a terminal state.
    fn finish(&self, task: TaskId, state: TaskState);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _task: TaskId, _name: &str, _total_bytes: u64) {}
    fn advance(&self, _progress: TransferProgress) {}
    fn finish(&self, _task: TaskId, _state: TaskState) {}
}

struct Row {
    bar: ProgressBar,
    transferred: AtomicU64,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|s| s.progress_chars(BAR_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn short_name(name: &str) -> String {
    if name.chars().count() <= MAX_PREFIX_CHARS {
        return name.to_string();
    }
    let tail: String = name
        .chars()
        .rev()
        .take(MAX_PREFIX_CHARS - 1)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{}", tail)
}

/// Live per-task and overall progress.
pub struct ProgressAggregator {
    multi: MultiProgress,
    total: ProgressBar,
    rows: DashMap<TaskId, Row>,
    stopped: AtomicBool,
}

impl ProgressAggregator {
    /// Create an aggregator for a batch of `total_bytes`.
    ///
    /// With `visible == false` nothing is drawn but all counters are kept,
    /// which is what quiet mode and tests use.
    pub fn new(total_bytes: u64, visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let total = multi.add(ProgressBar::new(total_bytes));
        total.set_style(style(TOTAL_TEMPLATE));
        total.set_prefix("Total");

        Self {
            multi,
            total,
            rows: DashMap::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Bytes reported for `task`, if it has a row.
    pub fn transferred(&self, task: TaskId) -> Option<u64> {
        self.rows
            .get(&task)
            .map(|row| row.transferred.load(Ordering::Acquire))
    }

    /// Sum of bytes reported across all rows.
    pub fn total_transferred(&self) -> u64 {
        self.total.position()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Tear down all rows.
    ///
    /// Only the first call has any effect; it returns `true`.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        for row in self.rows.iter() {
            if !row.bar.is_finished() {
                row.bar.abandon();
            }
        }
        self.total.finish();
        // Clearing fails only when the draw target is gone.
        let _ = self.multi.clear();
        true
    }
}

impl ProgressSink for ProgressAggregator {
    fn begin(&self, task: TaskId, name: &str, total_bytes: u64) {
        if self.is_stopped() {
            return;
        }
        self.rows.entry(task).or_insert_with(|| {
            let bar = self
                .multi
                .insert_before(&self.total, ProgressBar::new(total_bytes));
            bar.set_style(style(ROW_TEMPLATE));
            bar.set_prefix(short_name(name));
            Row {
                bar,
                transferred: AtomicU64::new(0),
            }
        });
    }

    fn advance(&self, progress: TransferProgress) {
        if let Some(row) = self.rows.get(&progress.task_id) {
            let previous = row
                .transferred
                .fetch_max(progress.bytes_transferred, Ordering::AcqRel);
            if progress.bytes_transferred > previous {
                row.bar.set_position(progress.bytes_transferred);
                self.total.inc(progress.bytes_transferred - previous);
            }
        }
    }

    fn finish(&self, task: TaskId, state: TaskState) {
        if let Some(row) = self.rows.get(&task) {
            match state {
                TaskState::Completed => row.bar.finish_with_message("done"),
                TaskState::Skipped => row.bar.finish_with_message("already complete"),
                _ => row.bar.abandon_with_message("failed"),
            }
        }
    }
}

impl Drop for ProgressAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}
