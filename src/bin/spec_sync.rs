//! Spec Sync CLI
//!
//! Keeps the snapshot tree and the version manifest up to date.
//!
//! Usage:
//!   spec-sync bootstrap            # build manifest from snapshots on disk
//!   spec-sync sync --series 2.4    # fetch releases the manifest lacks
//!   spec-sync cleanup --dry-run    # list non-baseline snapshots
//!   spec-sync --help

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use openapi_baselines::config::SyncConfig;
use openapi_baselines::sync::{self, RunOptions, RunSummary};
use openapi_baselines::upstream::docker::CLEANUP_GRACE;
use openapi_baselines::upstream::{DockerHubVersionSource, DockerSnapshotFetcher};
use openapi_baselines::{FsSnapshotStore, Manifest, SeriesFilter};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spec-sync")]
#[command(about = "Track REST API schema baselines across patch releases")]
struct Cli {
    /// Snapshot directory (overrides config)
    #[arg(long, global = true)]
    specs: Option<PathBuf>,

    /// Manifest file (overrides config)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Extra config file layered over the default locations
    #[arg(long, global = true)]
    config: Option<String>,

    /// Show what would happen without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only process releases matching this prefix (e.g. 2.4 or 2.4.0)
    #[arg(long, global = true)]
    series: Option<String>,

    /// Re-evaluate releases already in the manifest
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the manifest from snapshots already on disk
    Bootstrap,

    /// Fetch new releases and extend the manifest
    Sync,

    /// Delete stored snapshots of releases that are not baselines
    Cleanup,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SyncConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    let specs_dir = cli.specs.unwrap_or_else(|| config.storage.specs_dir.clone());
    let manifest_path = cli
        .manifest
        .unwrap_or_else(|| config.storage.manifest_path.clone());
    let series = cli
        .series
        .as_deref()
        .map(SeriesFilter::parse)
        .transpose()
        .context("parsing --series")?;

    let options = RunOptions {
        dry_run: cli.dry_run,
        force: cli.force,
        series,
        max_concurrent_series: config.sync.max_concurrent_series,
        fetch_timeout: config.upstream.fetch_timeout() + CLEANUP_GRACE,
    };

    let store = Arc::new(FsSnapshotStore::new(&specs_dir));
    let mut manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;

    match cli.command {
        Commands::Bootstrap => {
            info!("Bootstrapping from {}", specs_dir.display());
            let summary = sync::bootstrap(&mut manifest, store.as_ref(), &options)?;
            info!("Done: {}", summary.render());
            sync::finish(&mut manifest, &manifest_path, options.dry_run)?;
            println!("{}", manifest.summary().render());
        }

        Commands::Sync => {
            let source = DockerHubVersionSource::new(&config.upstream)?;
            let fetcher = Arc::new(DockerSnapshotFetcher::new(&config.upstream));
            let summary = sync::sync(&mut manifest, &source, fetcher, store, &options).await?;
            info!("Done: {}", summary.render());

            if summary == RunSummary::default() {
                return Ok(());
            }
            if summary.pending.is_empty() {
                sync::finish(&mut manifest, &manifest_path, options.dry_run)?;
                println!("{}", manifest.summary().render());
            }
            if summary.failed > 0 || summary.aborted_series > 0 {
                anyhow::bail!(
                    "{} releases failed, {} series aborted",
                    summary.failed,
                    summary.aborted_series
                );
            }
        }

        Commands::Cleanup => {
            let report = sync::cleanup(&manifest, store.as_ref(), &options)?;
            let verb = if options.dry_run { "Would delete" } else { "Deleted" };
            println!(
                "{} {} snapshots, kept {} baselines",
                verb,
                report.removed.len(),
                report.kept
            );
            if report.failed > 0 {
                anyhow::bail!("{} snapshots could not be deleted", report.failed);
            }
        }
    }

    Ok(())
}
