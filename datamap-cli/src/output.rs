//! Terminal output for CLI commands.
//!
//! Command handlers write through the [`Output`] trait so results render
//! consistently as styled tables or as JSON, depending on `--output-format`.

use console::style;
use datamap::config::OutputFormat;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::error::CliError;

/// Sink for command output.
pub trait Output {
    /// Selected rendering for structured results.
    fn format(&self) -> OutputFormat;

    /// Print a bold section title with an underline.
    fn header(&self, title: &str);

    /// Print a smaller section title.
    fn subheader(&self, title: &str);

    fn println(&self, line: &str);

    /// Print a line indented by two spaces.
    fn indented(&self, line: &str);

    fn newline(&self);

    /// Print without a trailing newline.
    fn print(&self, text: &str);

    fn success(&self, message: &str);

    fn warning(&self, message: &str);

    /// Print an error to stderr.
    fn error(&self, message: &str);

    /// Print rows under column headings.
    fn table(&self, headers: &[&str], rows: Vec<Vec<String>>);

    /// Print a value as pretty JSON.
    fn json(&self, value: &serde_json::Value) -> Result<(), CliError>;
}

/// [`Output`] writing to the process's stdout and stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleOutput {
    format: OutputFormat,
}

impl ConsoleOutput {
    /// Create an output for `format`.
    ///
    /// With `color == false` all styling is stripped, including on stderr.
    pub fn new(format: OutputFormat, color: bool) -> Self {
        console::set_colors_enabled(color);
        console::set_colors_enabled_stderr(color);
        Self { format }
    }
}

impl Output for ConsoleOutput {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn header(&self, title: &str) {
        println!("{}", style(title).bold());
        println!("{}", "=".repeat(title.chars().count()));
    }

    fn subheader(&self, title: &str) {
        println!("{}", style(title).bold().cyan());
    }

    fn println(&self, line: &str) {
        println!("{}", line);
    }

    fn indented(&self, line: &str) {
        println!("  {}", line);
    }

    fn newline(&self) {
        println!();
    }

    fn print(&self, text: &str) {
        print!("{}", text);
    }

    fn success(&self, message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", style("Error:").red().bold(), message);
    }

    fn table(&self, headers: &[&str], rows: Vec<Vec<String>>) {
        println!("{}", render_table(headers, rows));
    }

    fn json(&self, value: &serde_json::Value) -> Result<(), CliError> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Render rows as a rounded table.
pub fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut builder = Builder::default();
    builder.push_record(headers.iter().map(|h| h.to_string()));
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

/// Print `value` as JSON, or `pairs` as a property table.
pub fn print_record<T: Serialize>(
    out: &dyn Output,
    title: &str,
    value: &T,
    pairs: Vec<(&str, String)>,
) -> Result<(), CliError> {
    match out.format() {
        OutputFormat::Json => out.json(&serde_json::to_value(value)?),
        OutputFormat::Table => {
            out.subheader(title);
            out.table(
                &["Property", "Value"],
                pairs
                    .into_iter()
                    .map(|(k, v)| vec![k.to_string(), v])
                    .collect(),
            );
            Ok(())
        }
    }
}
