//! CLI command tree and dispatch.

use clap::Subcommand;

pub mod common;
pub mod config;
pub mod dataset;
pub mod download;
pub mod file;
pub mod version;

use crate::error::CliError;
use common::Context;

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect datasets
    Dataset {
        #[command(subcommand)]
        command: dataset::DatasetCommands,
    },

    /// Inspect dataset versions
    Version {
        #[command(subcommand)]
        command: version::VersionCommands,
    },

    /// Inspect individual files
    File {
        #[command(subcommand)]
        command: file::FileCommands,
    },

    /// Download files or whole versions
    Download {
        #[command(subcommand)]
        command: download::DownloadCommands,
    },

    /// View and check configuration
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

/// Run a top-level command.
pub async fn run(ctx: &Context, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Dataset { command } => dataset::run(ctx, command).await,
        Commands::Version { command } => version::run(ctx, command).await,
        Commands::File { command } => file::run(ctx, command).await,
        Commands::Download { command } => download::run(ctx, command).await,
        Commands::Config { command } => config::run(ctx, command).await,
    }
}
