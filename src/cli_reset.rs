//! Standalone schema reset: drop and recreate all warehouse tables.
//!
//! Destroys previously loaded fact and dimension rows, so this is a
//! provisioning tool, not part of the regular run sequence.

use anyhow::Result;
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod sqlite_persistence;
mod warehouse;

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
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,
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

    info!("Resetting warehouse schema at {:?}", cli_args.db_path);
    let conn = Connection::open(&cli_args.db_path)?;
    warehouse::drop_all(&conn)?;
    warehouse::create_all(&conn)?;
    for table in warehouse::STAGING_TABLES.iter().chain(warehouse::TARGET_TABLES) {
        table.validate(&conn)?;
    }
    info!("All tables recreated");
    Ok(())
}
