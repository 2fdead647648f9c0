mod file_config;

pub use file_config::FileConfig;

use crate::pipeline::LoadPolicy;
use crate::staging::{AccessPolicy, FieldMapping};
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution. This struct
/// mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub event_data: Option<String>,
    pub catalog_data: Option<String>,
    pub field_mapping: Option<PathBuf>,
    pub credential_ref: Option<String>,
    pub reload: bool,
    pub reject_limit: Option<u64>,
}

/// Everything one pipeline run needs, constructed by the caller and
/// passed in explicitly — never read from ambient process state.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub db_path: PathBuf,
    /// Source location for event-log records.
    pub event_data: String,
    /// Source location for song-catalog records.
    pub catalog_data: String,
    pub field_mapping: FieldMapping,
    pub access_policy: AccessPolicy,
    pub load_policy: LoadPolicy,
    pub reject_limit: Option<u64>,
}

impl EtlConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let event_data = match file.event_data.or_else(|| cli.event_data.clone()) {
            Some(uri) => uri,
            None => bail!("event_data must be specified via --event-data or in config file"),
        };
        let catalog_data = match file.catalog_data.or_else(|| cli.catalog_data.clone()) {
            Some(uri) => uri,
            None => bail!("catalog_data must be specified via --catalog-data or in config file"),
        };

        let field_mapping = match file
            .field_mapping
            .map(PathBuf::from)
            .or_else(|| cli.field_mapping.clone())
        {
            Some(path) => FieldMapping::from_file(&path)?,
            None => FieldMapping::event_log_default(),
        };

        let load_policy = match file.load_policy.as_deref() {
            Some("append") => LoadPolicy::Append,
            Some("reload") => LoadPolicy::Reload,
            Some(other) => bail!("Unknown load_policy {:?}, expected append or reload", other),
            None if cli.reload => LoadPolicy::Reload,
            None => LoadPolicy::Append,
        };

        let access_policy = match file.credential_ref.or_else(|| cli.credential_ref.clone()) {
            Some(credential_ref) => AccessPolicy::with_credential_ref(credential_ref),
            None => AccessPolicy::anonymous(),
        };

        let reject_limit = file.reject_limit.or(cli.reject_limit);

        Ok(Self {
            db_path,
            event_data,
            catalog_data,
            field_mapping,
            access_policy,
            load_policy,
            reject_limit,
        })
    }
}
