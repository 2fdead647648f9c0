//! Pipeline sequencing and the orchestrator-facing result contract.
//!
//! The caller owns the warehouse connection and the configuration; the
//! pipeline runs the fixed stage sequence synchronously and reports one
//! outcome per attempted stage. A fatal stage halts the sequence — there
//! is no retry here, that policy belongs to the orchestrator.

use crate::config::EtlConfig;
use crate::error::EtlError;
use crate::staging::{self, StagingSource};
use crate::star;
use crate::warehouse::{self, TARGET_TABLES};
use rusqlite::Connection;
use std::fmt;
use tracing::info;

/// What happens to previously loaded target rows on this run. Staging is
/// always rebuilt from scratch; the target tables default to appending,
/// which duplicates output across runs — `Reload` clears them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    #[default]
    Append,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DropTables,
    CreateTables,
    CopyEvents,
    CopyCatalog,
    ValidateStaging,
    ClearTargets,
    TransformSongplays,
    TransformUsers,
    TransformSongs,
    TransformArtists,
    TransformTime,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DropTables => "drop-tables",
            Stage::CreateTables => "create-tables",
            Stage::CopyEvents => "copy-events",
            Stage::CopyCatalog => "copy-catalog",
            Stage::ValidateStaging => "validate-staging",
            Stage::ClearTargets => "clear-targets",
            Stage::TransformSongplays => "transform-songplays",
            Stage::TransformUsers => "transform-users",
            Stage::TransformSongs => "transform-songs",
            Stage::TransformArtists => "transform-artists",
            Stage::TransformTime => "transform-time",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub enum StageOutcome {
    Completed {
        /// Rows written by this stage, where the stage writes rows.
        rows: Option<u64>,
        /// Records dropped by a copy stage.
        rejected: Option<u64>,
    },
    Failed(EtlError),
}

#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

/// Per-stage outcomes of one pipeline run, in execution order. Stages
/// after a failure are absent: they were never attempted.
#[derive(Debug, Default)]
pub struct PipelineResult {
    pub stages: Vec<StageReport>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }

    pub fn failure(&self) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|report| matches!(report.outcome, StageOutcome::Failed(_)))
    }

    fn complete(&mut self, stage: Stage, rows: Option<u64>, rejected: Option<u64>) {
        self.stages.push(StageReport {
            stage,
            outcome: StageOutcome::Completed { rows, rejected },
        });
    }

    fn fail(mut self, stage: Stage, error: EtlError) -> PipelineResult {
        self.stages.push(StageReport {
            stage,
            outcome: StageOutcome::Failed(error),
        });
        self
    }
}

fn clear_targets(conn: &Connection) -> Result<u64, EtlError> {
    let mut total: u64 = 0;
    for table in TARGET_TABLES {
        total += conn.execute(&format!("DELETE FROM {}", table.name), [])? as u64;
    }
    Ok(total)
}

/// Run the full staging-then-transform sequence against `conn`. Each
/// stage blocks until its effects are visible; the first fatal error
/// halts the run and is reported in the result.
pub fn run_pipeline(
    conn: &mut Connection,
    source: &dyn StagingSource,
    config: &EtlConfig,
) -> PipelineResult {
    let mut result = PipelineResult::default();

    info!("Starting pipeline run with {:?} load policy", config.load_policy);

    // Drop/create is the truncation mechanism for staging. Target tables
    // are only created when absent: their contents carry across runs and
    // the append/reload decision is made after staging is validated.
    if let Err(e) = warehouse::drop_staging(conn) {
        return result.fail(Stage::DropTables, e);
    }
    result.complete(Stage::DropTables, None, None);

    if let Err(e) = warehouse::create_staging(conn).and_then(|_| warehouse::ensure_targets(conn)) {
        return result.fail(Stage::CreateTables, e);
    }
    result.complete(Stage::CreateTables, None, None);

    match staging::copy_events(
        conn,
        source,
        &config.event_data,
        &config.field_mapping,
        &config.access_policy,
        config.reject_limit,
    ) {
        Ok(report) => result.complete(Stage::CopyEvents, Some(report.loaded), Some(report.rejected)),
        Err(e) => return result.fail(Stage::CopyEvents, e),
    }

    match staging::copy_catalog(
        conn,
        source,
        &config.catalog_data,
        &config.access_policy,
        config.reject_limit,
    ) {
        Ok(report) => {
            result.complete(Stage::CopyCatalog, Some(report.loaded), Some(report.rejected))
        }
        Err(e) => return result.fail(Stage::CopyCatalog, e),
    }

    if let Err(e) = warehouse::validate_staging(conn) {
        return result.fail(Stage::ValidateStaging, e);
    }
    result.complete(Stage::ValidateStaging, None, None);

    if config.load_policy == LoadPolicy::Reload {
        match clear_targets(conn) {
            Ok(rows) => result.complete(Stage::ClearTargets, Some(rows), None),
            Err(e) => return result.fail(Stage::ClearTargets, e),
        }
    }

    match star::populate_songplays(conn) {
        Ok(rows) => result.complete(Stage::TransformSongplays, Some(rows), None),
        Err(e) => return result.fail(Stage::TransformSongplays, e),
    }
    match star::populate_users(conn) {
        Ok(rows) => result.complete(Stage::TransformUsers, Some(rows), None),
        Err(e) => return result.fail(Stage::TransformUsers, e),
    }
    match star::populate_songs(conn) {
        Ok(rows) => result.complete(Stage::TransformSongs, Some(rows), None),
        Err(e) => return result.fail(Stage::TransformSongs, e),
    }
    match star::populate_artists(conn) {
        Ok(rows) => result.complete(Stage::TransformArtists, Some(rows), None),
        Err(e) => return result.fail(Stage::TransformArtists, e),
    }
    match star::populate_time(conn) {
        Ok(rows) => result.complete(Stage::TransformTime, Some(rows), None),
        Err(e) => return result.fail(Stage::TransformTime, e),
    }

    info!("Pipeline run finished: {} stages completed", result.stages.len());
    result
}
