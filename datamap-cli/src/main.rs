//! DataMap CLI - Command-line interface
//!
//! This binary provides a command-line interface to the DataMap library:
//! dataset inspection, file and version downloads, and configuration checks.

use std::process::ExitCode;

use clap::Parser;
use datamap::config::Settings;
use datamap::logging::{self, LogSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

mod commands;
mod error;
mod output;

use commands::common::{Context, GlobalArgs};
use commands::Commands;
use error::CliError;
use output::Output;

/// Command-line client for the DataMap dataset platform.
#[derive(Debug, Parser)]
#[command(name = "datamap", version, about, long_about = None, propagate_version = true)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

fn log_settings(globals: &GlobalArgs, settings: Option<&Settings>) -> LogSettings {
    let settings = globals.apply(settings.cloned().unwrap_or_default());
    LogSettings::new(settings.log_level, settings.log_format).with_ansi(settings.color_output)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let loaded = cli.globals.loader().load();

    // Held until the end of `run` so buffered log lines are flushed.
    let _guard = match logging::init(&log_settings(&cli.globals, loaded.as_ref().ok())) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {}", e);
            None
        }
    };
    if let Ok(ref settings) = loaded {
        debug!(source = ?settings.source_file, "Settings resolved");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let cancel = CancellationToken::new();
    let ctx = Context::new(cli.globals, loaded, cancel.clone());

    runtime.block_on(async {
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping downloads");
                cancel.cancel();
            }
        });
        let result = commands::run(&ctx, cli.command).await;
        watcher.abort();
        result
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let fallback = output::ConsoleOutput::new(Default::default(), !cli.globals.no_color);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            fallback.error(&e.to_string());
            if let Some(hint) = e.hint() {
                eprintln!("{}", hint);
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
