//! Version inspection commands.

use clap::Subcommand;
use datamap::api::DatasetApi;
use datamap::config::OutputFormat;
use datamap::format::{format_size, format_timestamp};
use uuid::Uuid;

use super::common::{parse_uuid, parse_version_name, Context};
use crate::error::CliError;
use crate::output::Output;

/// Version subcommands.
#[derive(Debug, Subcommand)]
pub enum VersionCommands {
    /// List the files in a dataset version
    Files {
        /// Dataset UUID
        #[arg(value_parser = parse_uuid)]
        uuid: Uuid,

        /// Version name (e.g. v1.0)
        #[arg(id = "version_name", value_name = "VERSION", value_parser = parse_version_name)]
        version: String,
    },
}

/// Run a version subcommand.
pub async fn run(ctx: &Context, command: VersionCommands) -> Result<(), CliError> {
    match command {
        VersionCommands::Files { uuid, version } => run_files(ctx, uuid, &version).await,
    }
}

async fn run_files(ctx: &Context, uuid: Uuid, version_name: &str) -> Result<(), CliError> {
    let client = ctx.client()?;
    let out = ctx.output();

    let version = client.get_version(uuid, version_name).await?;

    if out.format() == OutputFormat::Json {
        return out.json(&serde_json::to_value(&version.files)?);
    }

    if version.files.is_empty() {
        out.warning(&format!("Version '{}' has no files.", version.name));
        return Ok(());
    }

    out.subheader(&format!(
        "Files in {} ({} files, {})",
        version.name,
        version.file_count(),
        format_size(version.total_size())
    ));
    out.table(
        &["File ID", "Name", "Size", "Format", "Created", "Updated"],
        version
            .files
            .iter()
            .map(|f| {
                vec![
                    f.id.to_string(),
                    f.name.clone(),
                    format_size(f.size_bytes),
                    f.format.clone().unwrap_or_else(|| "-".to_string()),
                    format_timestamp(&f.created_at),
                    format_timestamp(&f.updated_at),
                ]
            })
            .collect(),
    );
    Ok(())
}
