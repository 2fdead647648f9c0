//! Error taxonomy for the ETL core.
//!
//! Schema and load errors are fatal for the stage that raised them and
//! propagate to the orchestrator as typed values. Record-level problems
//! (malformed JSON line, null in a NOT NULL column, bad type coercion)
//! never surface here — they are absorbed by the loader and counted in
//! its `CopyReport`.

use thiserror::Error;

/// Errors that abort a pipeline stage.
#[derive(Debug, Error)]
pub enum EtlError {
    /// A table referenced by a DDL/DML statement does not exist.
    #[error("table {0} does not exist")]
    MissingTable(String),

    /// A table exists but its structure does not match the contract.
    #[error("table {table} does not match its declared schema: {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// The source location could not be read at all.
    #[error("source location {uri} is unreachable: {reason}")]
    SourceUnreachable { uri: String, reason: String },

    /// The access policy was not sufficient to read the source location.
    #[error("access denied to source location {uri}")]
    AccessDenied { uri: String },

    /// The field-path mapping does not line up with the destination
    /// table's columns.
    #[error("field mapping has {got} paths, table {table} expects {expected}")]
    FieldMappingMismatch {
        table: String,
        got: usize,
        expected: usize,
    },

    /// More records were rejected than the configured tolerance allows.
    #[error("copy into {table} rejected {rejected} records, over the limit of {limit}")]
    RejectLimitExceeded {
        table: String,
        rejected: u64,
        limit: u64,
    },

    /// An event timestamp that chrono cannot represent.
    #[error("event timestamp {0} ms is outside the representable range")]
    TimestampOutOfRange(i64),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}
