//! Field-path mapping for the event-log copy.
//!
//! Event-log records carry their fields under source-side names
//! (`firstName`, `itemInSession`, ...) that do not match the staging
//! columns, so the copy takes an ordered list of JSON paths, one per
//! staging column in declaration order. The mapping can be loaded from a
//! JSON file of the form `{"jsonpaths": ["$.artist", "$['auth']", ...]}`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Source JSON field names for the event-log layout, one per
/// `stg_events` column in declaration order.
const EVENT_LOG_FIELDS: &[&str] = &[
    "artist",
    "auth",
    "firstName",
    "gender",
    "itemInSession",
    "lastName",
    "length",
    "level",
    "location",
    "method",
    "page",
    "registration",
    "sessionId",
    "song",
    "status",
    "ts",
    "userAgent",
    "userId",
];

#[derive(Debug, Deserialize)]
struct JsonPathsFile {
    jsonpaths: Vec<String>,
}

/// Ordered JSON paths, positionally aligned with the destination
/// table's columns.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    paths: Vec<Vec<String>>,
}

impl FieldMapping {
    /// The built-in mapping for the event-log record layout.
    pub fn event_log_default() -> Self {
        FieldMapping {
            paths: EVENT_LOG_FIELDS
                .iter()
                .map(|field| vec![field.to_string()])
                .collect(),
        }
    }

    /// Load a mapping from a jsonpaths file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read field mapping file: {:?}", path))?;
        let parsed: JsonPathsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse field mapping file: {:?}", path))?;
        let paths = parsed
            .jsonpaths
            .iter()
            .map(|p| parse_json_path(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(FieldMapping { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve the value for the column at `index` within a record.
    pub fn lookup<'a>(
        &self,
        index: usize,
        record: &'a serde_json::Value,
    ) -> Option<&'a serde_json::Value> {
        let mut current = record;
        for segment in self.paths.get(index)? {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

/// Parse a jsonpath of the `$.a.b` / `$['a']` forms into key segments.
fn parse_json_path(path: &str) -> Result<Vec<String>> {
    let mut rest = path
        .strip_prefix('$')
        .with_context(|| format!("Json path must start with '$': {}", path))?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot
                .find(['.', '['])
                .unwrap_or(after_dot.len());
            if end == 0 {
                bail!("Empty segment in json path: {}", path);
            }
            segments.push(after_dot[..end].to_string());
            rest = &after_dot[end..];
        } else if rest.starts_with("['") || rest.starts_with("[\"") {
            let quote = &rest[1..2];
            let inner = &rest[2..];
            let end = inner
                .find(&format!("{}]", quote))
                .with_context(|| format!("Unterminated bracket segment in json path: {}", path))?;
            segments.push(inner[..end].to_string());
            rest = &inner[end + 2..];
        } else {
            bail!("Unsupported json path syntax: {}", path);
        }
    }
    if segments.is_empty() {
        bail!("Json path selects nothing: {}", path);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_mapping_covers_every_event_column() {
        let mapping = FieldMapping::event_log_default();
        assert_eq!(
            mapping.len(),
            crate::warehouse::STG_EVENTS.insert_columns().count()
        );
    }

    #[test]
    fn lookup_resolves_source_field_names() {
        let mapping = FieldMapping::event_log_default();
        let record = json!({"artist": "Dua Lipa", "firstName": "Lily"});
        assert_eq!(mapping.lookup(0, &record), Some(&json!("Dua Lipa")));
        assert_eq!(mapping.lookup(2, &record), Some(&json!("Lily")));
        assert_eq!(mapping.lookup(3, &record), None);
    }

    #[test]
    fn parse_dotted_and_bracketed_paths() {
        assert_eq!(parse_json_path("$.artist").unwrap(), vec!["artist"]);
        assert_eq!(parse_json_path("$['userAgent']").unwrap(), vec!["userAgent"]);
        assert_eq!(
            parse_json_path("$.payload.ts").unwrap(),
            vec!["payload", "ts"]
        );
        assert!(parse_json_path("artist").is_err());
        assert!(parse_json_path("$").is_err());
        assert!(parse_json_path("$['artist'").is_err());
    }

    #[test]
    fn from_file_reads_jsonpaths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paths.json");
        std::fs::write(&path, r#"{"jsonpaths": ["$.a", "$['b']"]}"#).unwrap();
        let mapping = FieldMapping::from_file(&path).unwrap();
        assert_eq!(mapping.len(), 2);
        let record = json!({"a": 1, "b": "x"});
        assert_eq!(mapping.lookup(1, &record), Some(&json!("x")));
    }
}
