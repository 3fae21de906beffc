//! Batch download summaries.

use std::fmt;
use std::time::Duration;

use super::state::{DownloadOutcome, TaskState};
use crate::format::{format_size, format_speed};

/// Totals for a finished batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSummary {
    pub outcomes: Vec<DownloadOutcome>,
    pub total_files: usize,
    /// Completed plus skipped.
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// Sum of expected sizes for the batch.
    pub bytes_requested: u64,
    /// Size on disk of every successful file.
    pub total_bytes: u64,
    /// Bytes actually received during this run.
    pub bytes_downloaded: u64,
    /// Measured wall-clock time of the transfers.
    pub elapsed: Duration,
}

impl DownloadSummary {
    /// Tally `outcomes`.
    pub fn from_outcomes(
        outcomes: Vec<DownloadOutcome>,
        bytes_requested: u64,
        elapsed: Duration,
    ) -> Self {
        let mut summary = Self {
            total_files: outcomes.len(),
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            bytes_requested,
            total_bytes: 0,
            bytes_downloaded: 0,
            elapsed,
            outcomes: Vec::new(),
        };

        for outcome in &outcomes {
            if outcome.success {
                summary.success_count += 1;
                summary.total_bytes += outcome.bytes_written;
            } else {
                summary.failure_count += 1;
            }
            if outcome.state == TaskState::Skipped {
                summary.skipped_count += 1;
            }
            summary.bytes_downloaded += outcome.bytes_downloaded;
        }
        summary.outcomes = outcomes;
        summary
    }

    /// Summary of a batch with nothing to do.
    pub fn empty() -> Self {
        Self::from_outcomes(Vec::new(), 0, Duration::ZERO)
    }

    /// Average download rate in bytes per second; zero if no time elapsed.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.bytes_downloaded as f64 / secs
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// Process exit status for this batch.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download Summary")?;
        writeln!(f, "================")?;
        write!(
            f,
            "Files:   {}/{} completed",
            self.success_count, self.total_files
        )?;
        if self.skipped_count > 0 {
            write!(f, " ({} already complete)", self.skipped_count)?;
        }
        writeln!(f)?;
        writeln!(f, "Size:    {}", format_size(self.total_bytes))?;
        writeln!(f, "Time:    {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Speed:   {}", format_speed(self.throughput()))?;
        writeln!(f, "Success: {}", self.success_count)?;
        write!(f, "Errors:  {}", self.failure_count)?;

        if self.failure_count > 0 {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Failed files:")?;
            for outcome in self.failures() {
                writeln!(f)?;
                write!(
                    f,
                    "  - {} [{}]: {}",
                    outcome.file_name,
                    outcome
                        .error
                        .map(|k| k.as_str())
                        .unwrap_or("unknown"),
                    outcome.message.as_deref().unwrap_or("no details")
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::error::ErrorKind;
    use crate::download::state::TaskId;

    fn three_completed() -> Vec<DownloadOutcome> {
        vec![
            DownloadOutcome::completed(TaskId(0), "a.bin", 1024, 1024),
            DownloadOutcome::completed(TaskId(1), "b.bin", 2048, 2048),
            DownloadOutcome::completed(TaskId(2), "c.bin", 4096, 4096),
        ]
    }

    #[test]
    fn test_tally_all_successful() {
        let summary =
            DownloadSummary::from_outcomes(three_completed(), 7168, Duration::from_secs(2));

        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failure_count, 0);
        assert_eq!(summary.total_bytes, 7168);
        assert_eq!(summary.throughput(), 3584.0);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_zero_elapsed_gives_zero_throughput() {
        let summary = DownloadSummary::from_outcomes(three_completed(), 7168, Duration::ZERO);
        assert_eq!(summary.throughput(), 0.0);
    }

    #[test]
    fn test_failures_counted_and_listed() {
        let outcomes = vec![
            DownloadOutcome::completed(TaskId(0), "a.bin", 10, 10),
            DownloadOutcome::failed(TaskId(1), "b.bin", ErrorKind::SizeMismatch, "expected 20"),
            DownloadOutcome::skipped(TaskId(2), "c.bin", 30),
        ];
        let summary = DownloadSummary::from_outcomes(outcomes, 60, Duration::from_secs(1));

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.total_bytes, 40);
        assert_eq!(summary.bytes_downloaded, 10);
        assert_eq!(summary.exit_code(), 1);

        let report = summary.to_string();
        assert!(report.contains("Files:   2/3 completed (1 already complete)"));
        assert!(report.contains("  - b.bin [size_mismatch]: expected 20"));
    }

    #[test]
    fn test_empty_summary_is_success() {
        let summary = DownloadSummary::empty();
        assert_eq!(summary.total_files, 0);
        assert!(summary.is_success());
        assert!(!summary.to_string().contains("Failed files"));
    }
}
