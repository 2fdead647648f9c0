//! Bulk NDJSON copies into the staging tables.
//!
//! A copy is set-oriented: the caller names a location and gets back the
//! load totals or a load-level failure. Each copy runs in one
//! transaction, so staged rows become visible to the transforms all at
//! once. Record-level problems (malformed line, NOT NULL violation,
//! type coercion failure) drop that record and the batch continues;
//! an optional reject limit turns runaway rejection into a failure.

use super::mapping::FieldMapping;
use super::source::{AccessPolicy, StagingSource};
use crate::error::EtlError;
use crate::sqlite_persistence::{Column, SqlType, Table};
use crate::warehouse::{STG_EVENTS, STG_SONGS};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

/// Totals for one bulk copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    pub loaded: u64,
    pub rejected: u64,
}

/// How undecodable bytes in a source line are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTolerance {
    /// An invalid line is a record-level reject.
    Strict,
    /// Invalid sequences are replaced and the record is kept.
    ReplaceInvalid,
}

/// Where a record's column values come from.
enum FieldResolution<'a> {
    /// JSON keys match staging column names.
    ByColumnName,
    /// Positional field paths, one per staging column.
    Mapped(&'a FieldMapping),
}

/// Load every event-log record under `source_uri` into `stg_events`,
/// mapping JSON fields to columns through `mapping`.
pub fn copy_events(
    conn: &mut Connection,
    source: &dyn StagingSource,
    source_uri: &str,
    mapping: &FieldMapping,
    policy: &AccessPolicy,
    reject_limit: Option<u64>,
) -> Result<CopyReport, EtlError> {
    let expected = STG_EVENTS.insert_columns().count();
    if mapping.len() != expected {
        return Err(EtlError::FieldMappingMismatch {
            table: STG_EVENTS.name.to_string(),
            got: mapping.len(),
            expected,
        });
    }
    copy_ndjson(
        conn,
        source,
        source_uri,
        &STG_EVENTS,
        FieldResolution::Mapped(mapping),
        TextTolerance::Strict,
        policy,
        reject_limit,
    )
}

/// Load every catalog record under `source_uri` into `stg_songs`. Field
/// names are inferred (JSON keys match column names) and invalid byte
/// sequences in text are replaced rather than failing the load.
pub fn copy_catalog(
    conn: &mut Connection,
    source: &dyn StagingSource,
    source_uri: &str,
    policy: &AccessPolicy,
    reject_limit: Option<u64>,
) -> Result<CopyReport, EtlError> {
    copy_ndjson(
        conn,
        source,
        source_uri,
        &STG_SONGS,
        FieldResolution::ByColumnName,
        TextTolerance::ReplaceInvalid,
        policy,
        reject_limit,
    )
}

#[allow(clippy::too_many_arguments)]
fn copy_ndjson(
    conn: &mut Connection,
    source: &dyn StagingSource,
    source_uri: &str,
    table: &Table,
    resolution: FieldResolution<'_>,
    tolerance: TextTolerance,
    policy: &AccessPolicy,
    reject_limit: Option<u64>,
) -> Result<CopyReport, EtlError> {
    let objects = source.fetch(source_uri, policy)?;

    let mut loaded: u64 = 0;
    let mut rejected: u64 = 0;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&table.insert_sql())?;
        for object in &objects {
            for (line_no, raw_line) in split_lines(&object.bytes).enumerate() {
                let line = match decode_line(raw_line, tolerance) {
                    Some(line) => line,
                    None => {
                        rejected += 1;
                        debug!(
                            "Rejected {}:{}: invalid byte sequence",
                            object.key,
                            line_no + 1
                        );
                        check_reject_limit(table, rejected, reject_limit)?;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match stage_record(&mut stmt, table, &resolution, &line) {
                    Ok(()) => loaded += 1,
                    Err(reason) => {
                        rejected += 1;
                        debug!("Rejected {}:{}: {}", object.key, line_no + 1, reason);
                        check_reject_limit(table, rejected, reject_limit)?;
                    }
                }
            }
        }
    }
    tx.commit()?;

    info!(
        "Copied {} records into {} from {} ({} rejected)",
        loaded, table.name, source_uri, rejected
    );
    Ok(CopyReport { loaded, rejected })
}

fn check_reject_limit(
    table: &Table,
    rejected: u64,
    reject_limit: Option<u64>,
) -> Result<(), EtlError> {
    match reject_limit {
        Some(limit) if rejected > limit => Err(EtlError::RejectLimitExceeded {
            table: table.name.to_string(),
            rejected,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Parse, coerce and insert one record. Any `Err` is a record-level
/// reject; database failures beyond constraint checks are not expected
/// here because nullability is enforced during coercion.
fn stage_record(
    stmt: &mut rusqlite::Statement<'_>,
    table: &Table,
    resolution: &FieldResolution<'_>,
    line: &str,
) -> Result<(), String> {
    let record: serde_json::Value =
        serde_json::from_str(line).map_err(|e| format!("malformed JSON: {}", e))?;
    if !record.is_object() {
        return Err("record is not a JSON object".to_string());
    }

    let mut values = Vec::with_capacity(table.insert_columns().count());
    for (index, column) in table.insert_columns().enumerate() {
        let raw = match resolution {
            FieldResolution::ByColumnName => record.get(column.name),
            FieldResolution::Mapped(mapping) => mapping.lookup(index, &record),
        };
        values.push(coerce(column, raw)?);
    }

    stmt.execute(params_from_iter(values))
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn split_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

fn decode_line(line: &[u8], tolerance: TextTolerance) -> Option<String> {
    match tolerance {
        TextTolerance::Strict => std::str::from_utf8(line).ok().map(str::to_string),
        TextTolerance::ReplaceInvalid => Some(String::from_utf8_lossy(line).into_owned()),
    }
}

/// Coerce a JSON value into a column value, or explain why the record
/// must be dropped. Empty strings in numeric fields are treated as null,
/// matching how the event logs encode absent user ids.
fn coerce(column: &Column, raw: Option<&serde_json::Value>) -> Result<Value, String> {
    use serde_json::Value as Json;

    let value = match raw {
        None | Some(Json::Null) => Value::Null,
        Some(json) => match column.sql_type {
            SqlType::Text => match json {
                Json::String(s) => Value::Text(s.clone()),
                other => {
                    return Err(format!(
                        "column {} expects text, got {}",
                        column.name, other
                    ))
                }
            },
            SqlType::Integer => match json {
                Json::Number(n) => n
                    .as_i64()
                    .map(Value::Integer)
                    .ok_or_else(|| format!("column {} expects an integer, got {}", column.name, n))?,
                Json::String(s) if s.trim().is_empty() => Value::Null,
                Json::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| format!("column {} expects an integer, got {:?}", column.name, s))?,
                other => {
                    return Err(format!(
                        "column {} expects an integer, got {}",
                        column.name, other
                    ))
                }
            },
            SqlType::Real => match json {
                Json::Number(n) => n
                    .as_f64()
                    .map(Value::Real)
                    .ok_or_else(|| format!("column {} expects a number, got {}", column.name, n))?,
                Json::String(s) if s.trim().is_empty() => Value::Null,
                Json::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Real)
                    .map_err(|_| format!("column {} expects a number, got {:?}", column.name, s))?,
                other => {
                    return Err(format!(
                        "column {} expects a number, got {}",
                        column.name, other
                    ))
                }
            },
        },
    };

    if value == Value::Null && column.non_null {
        return Err(format!("column {} must not be null", column.name));
    }
    Ok(value)
}
