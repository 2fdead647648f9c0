//! Source location access for bulk copies.
//!
//! The pipeline core never resolves credentials or storage endpoints; the
//! caller hands it a location URI plus an opaque access policy, and reads
//! go through the `StagingSource` seam. The filesystem implementation
//! serves local object-store layouts: a location is a file or a directory
//! tree of newline-delimited JSON objects.

use crate::error::EtlError;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Opaque reference to the credentials the warehouse should assume while
/// reading a source location. Constructed by the caller; the filesystem
/// source only records it.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub credential_ref: Option<String>,
}

impl AccessPolicy {
    pub fn anonymous() -> Self {
        AccessPolicy::default()
    }

    pub fn with_credential_ref<S: Into<String>>(credential_ref: S) -> Self {
        AccessPolicy {
            credential_ref: Some(credential_ref.into()),
        }
    }
}

/// One object fetched from a source location.
#[derive(Debug)]
pub struct StagedObject {
    /// Source-relative identifier, used in reject diagnostics.
    pub key: String,
    pub bytes: Vec<u8>,
}

/// Read access to a bulk source location.
pub trait StagingSource {
    /// Fetch every data object under `uri`. Returns a load-level error if
    /// the location cannot be read at all; individual record problems are
    /// the loader's business.
    fn fetch(&self, uri: &str, policy: &AccessPolicy) -> Result<Vec<StagedObject>, EtlError>;
}

/// Filesystem-backed source. Directories are walked recursively and every
/// `.json`/`.jsonl` file is treated as one object; files are returned in
/// path order so arrival order is deterministic.
pub struct FsStagingSource;

impl FsStagingSource {
    fn read_object(path: &Path, uri: &str) -> Result<StagedObject, EtlError> {
        let bytes = std::fs::read(path).map_err(|e| io_error(uri, e))?;
        Ok(StagedObject {
            key: path.display().to_string(),
            bytes,
        })
    }
}

impl StagingSource for FsStagingSource {
    fn fetch(&self, uri: &str, policy: &AccessPolicy) -> Result<Vec<StagedObject>, EtlError> {
        debug!(
            "Fetching {} (credential ref: {})",
            uri,
            policy.credential_ref.as_deref().unwrap_or("none")
        );
        let root = Path::new(uri);
        if root.is_file() {
            return Ok(vec![Self::read_object(root, uri)?]);
        }
        if !root.is_dir() {
            return Err(EtlError::SourceUnreachable {
                uri: uri.to_string(),
                reason: "no such file or directory".to_string(),
            });
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| EtlError::SourceUnreachable {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_ndjson = entry
                .path()
                .extension()
                .map(|ext| ext == "json" || ext == "jsonl")
                .unwrap_or(false);
            if is_ndjson {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        paths
            .iter()
            .map(|path| Self::read_object(path, uri))
            .collect()
    }
}

fn io_error(uri: &str, error: std::io::Error) -> EtlError {
    if error.kind() == ErrorKind::PermissionDenied {
        EtlError::AccessDenied {
            uri: uri.to_string(),
        }
    } else {
        EtlError::SourceUnreachable {
            uri: uri.to_string(),
            reason: error.to_string(),
        }
    }
}
