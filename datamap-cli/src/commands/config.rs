//! Configuration management CLI commands.
//!
//! Provides `config show`, `config path`, `config validate`, `config init`
//! and `config test` for inspecting settings from the command line.

use clap::Subcommand;
use datamap::api::DatasetApi;
use datamap::config::{default_config_path, write_template, ConfigError, OutputFormat};
use serde_json::{json, Map, Value};

use super::common::Context;
use crate::error::CliError;
use crate::output::Output;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the resolved settings
    Show {
        /// Print API credentials in full
        #[arg(long)]
        show_secrets: bool,
    },

    /// Show the configuration file path
    Path,

    /// Check the configuration for errors
    Validate,

    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check that the API is reachable with the configured credentials
    Test,
}

/// Run a config subcommand.
pub async fn run(ctx: &Context, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { show_secrets } => run_show(ctx, show_secrets),
        ConfigCommands::Path => run_path(ctx),
        ConfigCommands::Validate => run_validate(ctx),
        ConfigCommands::Init { force } => run_init(ctx, force),
        ConfigCommands::Test => run_test(ctx).await,
    }
}

/// Show the resolved settings.
fn run_show(ctx: &Context, show_secrets: bool) -> Result<(), CliError> {
    let settings = ctx.settings()?;
    let out = ctx.output();
    let entries = settings.display_entries(show_secrets);

    if out.format() == OutputFormat::Json {
        let map: Map<String, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v)))
            .collect();
        return out.json(&Value::Object(map));
    }

    out.header("Configuration Settings");
    match settings.source_file {
        Some(ref path) => out.println(&format!("Loaded from: {}", path.display())),
        None => out.println("Loaded from: defaults and environment"),
    }
    out.newline();
    out.table(
        &["Setting", "Value"],
        entries
            .into_iter()
            .map(|(k, v)| vec![k.to_string(), v])
            .collect(),
    );
    Ok(())
}

/// Show the configuration file path.
fn run_path(ctx: &Context) -> Result<(), CliError> {
    let loader = ctx.globals.loader();
    let path = loader
        .config_file()
        .ok_or_else(|| CliError::Config("no configuration directory on this system".into()))?;
    let out = ctx.output();
    out.println(&path.display().to_string());
    if !path.exists() {
        out.warning("File does not exist yet; create it with 'datamap config init'.");
    }
    Ok(())
}

/// Check the configuration for errors, including missing credentials.
fn run_validate(ctx: &Context) -> Result<(), CliError> {
    let out = ctx.output();
    let issues = match ctx.globals.loader().load() {
        Ok(settings) => settings.validate_for_api(),
        Err(ConfigError::Invalid(issues)) => issues,
        Err(e) => return Err(e.into()),
    };

    if out.format() == OutputFormat::Json {
        out.json(&json!({ "valid": issues.is_empty(), "issues": issues }))?;
    } else if issues.is_empty() {
        out.success("Configuration is valid.");
    } else {
        out.error("Configuration has problems:");
        for issue in &issues {
            out.indented(&format!("- {}", issue));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CliError::ConfigFile(ConfigError::Invalid(issues)))
    }
}

/// Write a starter configuration file.
fn run_init(ctx: &Context, force: bool) -> Result<(), CliError> {
    let path = match ctx.globals.config {
        Some(ref path) => path.clone(),
        None => default_config_path()
            .ok_or_else(|| CliError::Config("no configuration directory on this system".into()))?,
    };
    write_template(&path, force)?;

    let out = ctx.output();
    out.success(&format!("Wrote {}", path.display()));
    out.println("Edit api_key and api_secret before running other commands.");
    Ok(())
}

/// Call the health endpoint with the configured credentials.
async fn run_test(ctx: &Context) -> Result<(), CliError> {
    let client = ctx.client()?;
    let out = ctx.output();

    client.health_check().await?;

    if out.format() == OutputFormat::Json {
        out.json(&json!({ "ok": true, "api_base_url": client.base_url() }))
    } else {
        out.success(&format!("Connected to {}", client.base_url()));
        Ok(())
    }
}
