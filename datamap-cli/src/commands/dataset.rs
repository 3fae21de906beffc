//! Dataset inspection commands.

use clap::Subcommand;
use datamap::api::{DatasetApi, Version};
use datamap::config::OutputFormat;
use datamap::format::{format_size, format_timestamp};
use tracing::debug;
use uuid::Uuid;

use super::common::{parse_uuid, yes_no, Context};
use crate::error::CliError;
use crate::output::{print_record, Output};

/// Dataset subcommands.
#[derive(Debug, Subcommand)]
pub enum DatasetCommands {
    /// Show dataset details and a summary of its versions
    Info {
        /// Dataset UUID
        #[arg(value_parser = parse_uuid)]
        uuid: Uuid,
    },

    /// List all versions of a dataset
    Versions {
        /// Dataset UUID
        #[arg(value_parser = parse_uuid)]
        uuid: Uuid,
    },
}

/// Run a dataset subcommand.
pub async fn run(ctx: &Context, command: DatasetCommands) -> Result<(), CliError> {
    match command {
        DatasetCommands::Info { uuid } => run_info(ctx, uuid).await,
        DatasetCommands::Versions { uuid } => run_versions(ctx, uuid).await,
    }
}

fn version_row(version: &Version, detailed: bool) -> Vec<String> {
    let mut row = vec![version.name.clone()];
    if detailed {
        row.push(version.id.to_string());
    }
    row.extend([
        version.file_count().to_string(),
        format_size(version.total_size()),
        version.design_state.clone(),
        yes_no(version.is_enabled),
    ]);
    if detailed {
        row.push(format_timestamp(&version.created_at));
        row.push(format_timestamp(&version.updated_at));
    }
    row
}

async fn run_info(ctx: &Context, uuid: Uuid) -> Result<(), CliError> {
    let client = ctx.client()?;
    let out = ctx.output();

    debug!(dataset_id = %uuid, "Fetching dataset");
    let dataset = client.get_dataset(uuid).await?;

    let mut pairs = vec![
        ("UUID", dataset.id.to_string()),
        ("Name", dataset.name.clone()),
        ("Design State", dataset.design_state.clone()),
        ("Enabled", yes_no(dataset.is_enabled)),
        ("Tenancy", dataset.tenancy.clone()),
        ("Created", format_timestamp(&dataset.created_at)),
        ("Updated", format_timestamp(&dataset.updated_at)),
        ("Version Count", dataset.version_count().to_string()),
        ("Total Files", dataset.total_files().to_string()),
    ];
    if let Some(ref current) = dataset.current_version {
        pairs.push(("Current Version", current.name.clone()));
        pairs.push(("Current Version Files", current.file_count().to_string()));
        pairs.push(("Current Version Size", format_size(current.total_size())));
    }

    print_record(&out, &format!("Dataset: {}", dataset.name), &dataset, pairs)?;
    if out.format() == OutputFormat::Json {
        return Ok(());
    }

    if !dataset.data.is_empty() {
        out.newline();
        out.subheader("Dataset Data");
        out.println(&serde_json::to_string_pretty(&dataset.data)?);
    }

    if !dataset.versions.is_empty() {
        out.newline();
        out.subheader(&format!("Versions ({})", dataset.versions.len()));
        out.table(
            &["Name", "Files", "Size", "State", "Enabled"],
            dataset.versions.iter().map(|v| version_row(v, false)).collect(),
        );
    }
    Ok(())
}

async fn run_versions(ctx: &Context, uuid: Uuid) -> Result<(), CliError> {
    let client = ctx.client()?;
    let out = ctx.output();

    let dataset = client.get_dataset(uuid).await?;

    match out.format() {
        OutputFormat::Json => out.json(&serde_json::to_value(&dataset.versions)?),
        OutputFormat::Table if dataset.versions.is_empty() => {
            out.warning(&format!("Dataset '{}' has no versions.", dataset.name));
            Ok(())
        }
        OutputFormat::Table => {
            out.subheader(&format!("Versions of {}", dataset.name));
            out.table(
                &["Name", "UUID", "Files", "Size", "State", "Enabled", "Created", "Updated"],
                dataset.versions.iter().map(|v| version_row(v, true)).collect(),
            );
            Ok(())
        }
    }
}
