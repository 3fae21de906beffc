//! File inspection commands.

use clap::Subcommand;
use datamap::api::{DataFile, DatasetApi};
use datamap::download::DownloadError;
use datamap::format::{format_size, format_timestamp};
use uuid::Uuid;

use super::common::{parse_uuid, parse_version_name, Context};
use crate::error::CliError;
use crate::output::print_record;

/// File subcommands.
#[derive(Debug, Subcommand)]
pub enum FileCommands {
    /// Show details of a single file
    Info {
        /// Dataset UUID
        #[arg(value_parser = parse_uuid)]
        uuid: Uuid,

        /// Version name (e.g. v1.0)
        #[arg(id = "version_name", value_name = "VERSION", value_parser = parse_version_name)]
        version: String,

        /// File UUID
        #[arg(value_parser = parse_uuid)]
        file_uuid: Uuid,
    },
}

/// Run a file subcommand.
pub async fn run(ctx: &Context, command: FileCommands) -> Result<(), CliError> {
    match command {
        FileCommands::Info {
            uuid,
            version,
            file_uuid,
        } => run_info(ctx, uuid, &version, file_uuid).await,
    }
}

fn or_placeholder(value: &Option<String>, placeholder: &str) -> String {
    value.clone().unwrap_or_else(|| placeholder.to_string())
}

fn file_pairs(file: &DataFile) -> Vec<(&'static str, String)> {
    vec![
        ("File ID", file.id.to_string()),
        ("Name", file.name.clone()),
        ("Size", format_size(file.size_bytes)),
        ("Format", or_placeholder(&file.format, "Unknown")),
        ("Extension", or_placeholder(&file.extension, "None")),
        ("Created", format_timestamp(&file.created_at)),
        ("Updated", format_timestamp(&file.updated_at)),
        (
            "Created By",
            file.created_by
                .map(|id| id.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
        ),
        ("Storage File Name", or_placeholder(&file.storage_file_name, "None")),
        ("Storage Path", or_placeholder(&file.storage_path, "None")),
    ]
}

async fn run_info(
    ctx: &Context,
    uuid: Uuid,
    version_name: &str,
    file_id: Uuid,
) -> Result<(), CliError> {
    let client = ctx.client()?;
    let out = ctx.output();

    let version = client.get_version(uuid, version_name).await?;
    let file = version
        .file(file_id)
        .ok_or_else(|| DownloadError::FileNotInVersion {
            file_id,
            version: version.name.clone(),
        })?;

    print_record(&out, &format!("File: {}", file.name), file, file_pairs(file))
}
