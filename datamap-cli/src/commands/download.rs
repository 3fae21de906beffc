//! Download commands.
//!
//! Metadata is fetched and shown first, then the user confirms (unless
//! `--yes` is given or stdin is not a terminal) before any bytes move.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use datamap::config::OutputFormat;
use datamap::download::{DownloadOptions, DownloadOutcome, DownloadSummary, Downloader, TaskState};
use datamap::format::{format_size, format_speed};
use dialoguer::Confirm;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::common::{parse_uuid, parse_version_name, Context};
use crate::error::CliError;
use crate::output::Output;

/// Download subcommands.
#[derive(Debug, Subcommand)]
pub enum DownloadCommands {
    /// Download a single file from a dataset version
    File {
        /// Dataset UUID
        #[arg(value_parser = parse_uuid)]
        uuid: Uuid,

        /// Version name (e.g. v1.0)
        #[arg(id = "version_name", value_name = "VERSION", value_parser = parse_version_name)]
        version: String,

        /// File UUID
        #[arg(value_parser = parse_uuid)]
        file_uuid: Uuid,

        /// Output file path (defaults to the file name in the current directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        #[command(flatten)]
        flags: TransferFlags,
    },

    /// Download every file of a dataset version
    Version {
        /// Dataset UUID
        #[arg(value_parser = parse_uuid)]
        uuid: Uuid,

        /// Version name (e.g. v1.0)
        #[arg(id = "version_name", value_name = "VERSION", value_parser = parse_version_name)]
        version: String,

        /// Output directory (defaults to the version name in the current directory)
        #[arg(short, long, value_name = "DIR", visible_alias = "output-dir")]
        output: Option<PathBuf>,

        /// Simultaneous downloads, 1 to 10 (defaults to download_concurrency)
        #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=10))]
        concurrency: Option<u8>,

        #[command(flatten)]
        flags: TransferFlags,
    },
}

/// Switches shared by both download commands.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct TransferFlags {
    /// Continue partial downloads and skip complete files
    #[arg(long)]
    pub resume: bool,

    /// Skip the final file size check
    #[arg(long)]
    pub no_verify: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl TransferFlags {
    fn options(&self, max_concurrency: usize) -> DownloadOptions {
        DownloadOptions::default()
            .with_concurrency(max_concurrency)
            .with_resume(self.resume)
            .with_verify(!self.no_verify)
    }
}

/// Run a download subcommand.
pub async fn run(ctx: &Context, command: DownloadCommands) -> Result<(), CliError> {
    match command {
        DownloadCommands::File {
            uuid,
            version,
            file_uuid,
            output,
            flags,
        } => run_file(ctx, uuid, &version, file_uuid, output, flags).await,
        DownloadCommands::Version {
            uuid,
            version,
            output,
            concurrency,
            flags,
        } => run_version(ctx, uuid, &version, output, concurrency, flags).await,
    }
}

fn downloader(ctx: &Context) -> Result<Downloader, CliError> {
    let settings = ctx.settings()?;
    let client = ctx.client()?;
    Ok(Downloader::from_settings(client, settings)?
        .with_progress(ctx.show_progress())
        .with_cancellation(ctx.cancel.clone()))
}

/// Ask before downloading. Returns `true` to proceed.
fn confirm(skip: bool, prompt: &str) -> Result<bool, CliError> {
    if skip || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?)
}

async fn run_file(
    ctx: &Context,
    uuid: Uuid,
    version_name: &str,
    file_id: Uuid,
    output: Option<PathBuf>,
    flags: TransferFlags,
) -> Result<(), CliError> {
    let out = ctx.output();
    let downloader = downloader(ctx)?;

    let plan = downloader
        .plan_file(uuid, version_name, file_id, output.as_deref())
        .await?;

    if out.format() == OutputFormat::Table {
        out.subheader("File Download");
        out.table(
            &["Property", "Value"],
            vec![
                vec!["File Name".to_string(), plan.file.name.clone()],
                vec!["File Size".to_string(), format_size(plan.file.size_bytes)],
                vec![
                    "Format".to_string(),
                    plan.file.format.clone().unwrap_or_else(|| "Unknown".to_string()),
                ],
                vec!["Output Path".to_string(), plan.output_path.display().to_string()],
            ],
        );
    }

    if !confirm(flags.yes, "Proceed with download?")? {
        out.warning("Download cancelled.");
        return Ok(());
    }

    let outcome = downloader.execute_file(&plan, &flags.options(1)).await?;
    info!(file = %outcome.file_name, success = outcome.success, "File download finished");

    match out.format() {
        OutputFormat::Json => out.json(&outcome_json(&outcome))?,
        OutputFormat::Table => match outcome.state {
            TaskState::Skipped => out.success(&format!(
                "File already complete: {}",
                plan.output_path.display()
            )),
            _ if outcome.success => out.success(&format!(
                "File downloaded successfully: {} ({})",
                plan.output_path.display(),
                format_size(outcome.bytes_written)
            )),
            _ => out.error(&format!(
                "{} [{}]: {}",
                outcome.file_name,
                outcome.error.map(|k| k.as_str()).unwrap_or("unknown"),
                outcome.message.as_deref().unwrap_or("download failed")
            )),
        },
    }

    if outcome.success {
        Ok(())
    } else {
        Err(CliError::DownloadsFailed {
            failed: 1,
            total: 1,
        })
    }
}

async fn run_version(
    ctx: &Context,
    uuid: Uuid,
    version_name: &str,
    output: Option<PathBuf>,
    concurrency: Option<u8>,
    flags: TransferFlags,
) -> Result<(), CliError> {
    let out = ctx.output();
    let settings = ctx.settings()?;
    let downloader = downloader(ctx)?;

    // CLI takes precedence, then config
    let max_concurrency = concurrency
        .map(usize::from)
        .unwrap_or(settings.download_concurrency);

    let plan = downloader
        .plan_version(uuid, version_name, output.as_deref())
        .await?;

    if plan.file_count() == 0 {
        if out.format() == OutputFormat::Json {
            out.json(&summary_json(&DownloadSummary::empty()))?;
        } else {
            out.warning(&format!("Version '{}' has no files.", plan.version.name));
        }
        return Ok(());
    }

    if out.format() == OutputFormat::Table {
        out.subheader("Version Download");
        out.table(
            &["Property", "Value"],
            vec![
                vec!["Version".to_string(), plan.version.name.clone()],
                vec!["Files".to_string(), plan.file_count().to_string()],
                vec!["Total Size".to_string(), format_size(plan.total_size())],
                vec!["Output Directory".to_string(), plan.output_dir.display().to_string()],
                vec!["Concurrency".to_string(), max_concurrency.to_string()],
            ],
        );
    }

    let prompt = format!(
        "Download {} files ({})?",
        plan.file_count(),
        format_size(plan.total_size())
    );
    if !confirm(flags.yes, &prompt)? {
        out.warning("Download cancelled.");
        return Ok(());
    }

    let summary = downloader
        .execute_version(&plan, &flags.options(max_concurrency))
        .await?;

    match out.format() {
        OutputFormat::Json => out.json(&summary_json(&summary))?,
        OutputFormat::Table => {
            out.newline();
            out.println(&summary.to_string());
            if summary.is_success() {
                out.newline();
                out.success(&format!(
                    "All files downloaded to {}",
                    plan.output_dir.display()
                ));
            }
        }
    }

    if summary.is_success() {
        Ok(())
    } else {
        Err(CliError::DownloadsFailed {
            failed: summary.failure_count,
            total: summary.total_files,
        })
    }
}

fn outcome_json(outcome: &DownloadOutcome) -> serde_json::Value {
    json!({
        "file_name": outcome.file_name,
        "state": format!("{:?}", outcome.state).to_lowercase(),
        "success": outcome.success,
        "bytes_written": outcome.bytes_written,
        "bytes_downloaded": outcome.bytes_downloaded,
        "error": outcome.error.map(|k| k.as_str()),
        "message": outcome.message,
    })
}

fn summary_json(summary: &DownloadSummary) -> serde_json::Value {
    json!({
        "total_files": summary.total_files,
        "success_count": summary.success_count,
        "failure_count": summary.failure_count,
        "skipped_count": summary.skipped_count,
        "total_bytes": summary.total_bytes,
        "bytes_downloaded": summary.bytes_downloaded,
        "elapsed_secs": summary.elapsed.as_secs_f64(),
        "throughput": format_speed(summary.throughput()),
        "files": summary.outcomes.iter().map(outcome_json).collect::<Vec<_>>(),
    })
}
