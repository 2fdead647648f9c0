use anyhow::{bail, Result};
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod pipeline;
mod sqlite_persistence;
mod staging;
mod star;
mod warehouse;

use config::{CliConfig, EtlConfig, FileConfig};
use pipeline::{run_pipeline, StageOutcome};
use staging::FsStagingSource;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite warehouse database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Source location for the event-log records (file or directory of
    /// newline-delimited JSON).
    #[clap(long)]
    pub event_data: Option<String>,

    /// Source location for the song-catalog records.
    #[clap(long)]
    pub catalog_data: Option<String>,

    /// Path to a jsonpaths file mapping event fields to staging columns.
    #[clap(long, value_parser = parse_path)]
    pub field_mapping: Option<PathBuf>,

    /// Opaque credential reference to assume while reading the sources.
    #[clap(long)]
    pub credential_ref: Option<String>,

    /// Clear the fact and dimension tables before transforming instead
    /// of appending to them.
    #[clap(long)]
    pub reload: bool,

    /// Fail a copy once it has dropped more than this many records.
    #[clap(long)]
    pub reject_limit: Option<u64>,

    /// Optional TOML config file; its values override the CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        event_data: cli_args.event_data,
        catalog_data: cli_args.catalog_data,
        field_mapping: cli_args.field_mapping,
        credential_ref: cli_args.credential_ref,
        reload: cli_args.reload,
        reject_limit: cli_args.reject_limit,
    };
    let config = EtlConfig::resolve(&cli_config, file_config)?;

    info!("Opening warehouse database at {:?}...", config.db_path);
    let mut conn = Connection::open(&config.db_path)?;

    let result = run_pipeline(&mut conn, &FsStagingSource, &config);
    for report in &result.stages {
        match &report.outcome {
            StageOutcome::Completed { rows, rejected } => {
                let rows = rows.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
                let rejected = rejected
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                info!("{:<20} ok (rows: {}, rejected: {})", report.stage, rows, rejected);
            }
            StageOutcome::Failed(err) => {
                error!("{:<20} FAILED: {}", report.stage, err);
            }
        }
    }

    if let Some(failed) = result.failure() {
        bail!("Pipeline halted at stage {}", failed.stage);
    }
    info!("Pipeline run complete");
    Ok(())
}
