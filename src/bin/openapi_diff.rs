//! OpenAPI Diff CLI
//!
//! Compares two schema documents and reports every change with its severity.
//!
//! Usage:
//!   openapi-diff --old specs/2.4.0/p1.yaml --new specs/2.4.0/p5.yaml
//!   openapi-diff --old a.yaml --new b.yaml --schemas Host,Folder --format json

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use openapi_baselines::{SchemaDiffer, SchemaDocument};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "openapi-diff")]
#[command(about = "Classify the differences between two API schema documents")]
struct Cli {
    /// Older document (YAML or JSON)
    #[arg(long)]
    old: PathBuf,

    /// Newer document (YAML or JSON)
    #[arg(long)]
    new: PathBuf,

    /// Write the JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only compare these schemas (comma-separated); paths are always compared
    #[arg(long, value_delimiter = ',')]
    schemas: Vec<String>,

    /// Output format on stdout
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load(path: &Path) -> anyhow::Result<SchemaDocument> {
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    SchemaDocument::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let old = load(&cli.old)?;
    let new = load(&cli.new)?;

    let mut differ = SchemaDiffer::new();
    let schemas: Vec<String> = cli
        .schemas
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if !schemas.is_empty() {
        differ = differ.with_schema_filter(schemas);
    }

    let report = differ.diff(&old, &new);

    if let Some(output) = &cli.output {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
        eprintln!("Diff report written to: {}", output.display());
    }

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => println!("{}", report.render_summary()),
    }

    Ok(())
}
