//! Scene importer and extraction-map resolver.
//!
//! The importer reads the JSON written by a pipeline run and creates one
//! scene per row on a stash-box server. Rows are processed sequentially;
//! a failing row is reported and counted, and the run moves on. Ctrl-C stops
//! the run after the current row.
//!
//! The resolver fills the `null` entries of an `extractmap` output with ids
//! looked up by name, ready for `mapvalues`.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::logs::{log_error, log_info, log_success, log_warning};
use crate::parser;
use crate::record::{FieldValue, Record};
use crate::stashbox::{EntityKind, SceneApi};

/// Field names the importer reads from each row.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const DETAILS: &str = "details";
    pub const DATE: &str = "date";
    pub const DURATION: &str = "duration";
    pub const DIRECTOR: &str = "director";
    pub const URL: &str = "url";
    pub const STUDIO: &str = "studio";
    pub const TAGS: &str = "tags";
    pub const PERFORMERS: &str = "performers";
    pub const IMAGE: &str = "image";
}

/// URL type attached to imported scenes
const URL_TYPE: &str = "STUDIO";

/// Import counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Stopped early by Ctrl-C
    pub interrupted: bool,
}

impl ImportSummary {
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} created, {} skipped, {} failed",
            self.created, self.skipped, self.failed
        );
        if self.interrupted {
            line.push_str(" (interrupted)");
        }
        line
    }
}

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowOutcome {
    Created(String),
    Skipped(String),
}

/// Build a `SceneCreateInput` from a row. Absent and `null` fields are left
/// out; `fingerprints` is always an empty list.
pub fn make_scene_create_input(row: &Record) -> ClientResult<Value> {
    let mut input = Map::new();

    for field in [fields::TITLE, fields::DETAILS, fields::DATE, fields::DIRECTOR] {
        if let Some(value) = present(row, field) {
            input.insert(field.to_string(), value.to_json());
        }
    }

    if let Some(value) = present(row, fields::DURATION) {
        input.insert("duration".to_string(), json!(duration(value)?));
    }

    if let Some(value) = present(row, fields::URL) {
        let url = text(fields::URL, value)?;
        input.insert("urls".to_string(), json!([{ "url": url, "type": URL_TYPE }]));
    }

    if let Some(value) = present(row, fields::STUDIO) {
        input.insert("studio_id".to_string(), json!(text(fields::STUDIO, value)?));
    }

    if let Some(value) = present(row, fields::TAGS) {
        input.insert("tag_ids".to_string(), json!(strings(fields::TAGS, value)?));
    }

    if let Some(value) = present(row, fields::PERFORMERS) {
        let performers: Vec<Value> = strings(fields::PERFORMERS, value)?
            .into_iter()
            .map(|id| json!({ "performer_id": id }))
            .collect();
        input.insert("performers".to_string(), Value::Array(performers));
    }

    input.insert("fingerprints".to_string(), json!([]));
    Ok(Value::Object(input))
}

/// Import every row, stopping early once `stop` is set.
pub async fn import_records<A: SceneApi>(
    api: &A,
    rows: &[Record],
    stop: &AtomicBool,
) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for (index, row) in rows.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            log_warning(format!("Interrupted, {} rows left unprocessed", rows.len() - index));
            summary.interrupted = true;
            break;
        }

        match import_row(api, row).await {
            Ok(RowOutcome::Created(id)) => {
                summary.created += 1;
                log_success(format!("Row {}: created scene {}", index, id));
            }
            Ok(RowOutcome::Skipped(reason)) => {
                summary.skipped += 1;
                log_info(format!("Row {}: skipping {}", index, reason));
            }
            Err(e) => {
                summary.failed += 1;
                log_error(format!("Row {}: {}", index, e));
            }
        }
    }

    summary
}

/// Import a pipeline output file. Ctrl-C stops after the current row.
pub async fn import_file<A: SceneApi>(api: &A, path: &Path) -> ClientResult<ImportSummary> {
    let content = tokio::fs::read_to_string(path).await?;
    let rows = parser::parse_json_records(&content)
        .map_err(|e| ClientError::InvalidRow(format!("{}: {}", path.display(), e)))?;
    log_info(format!("📖 Importing {} rows from {}", rows.len(), path.display()));

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log_warning("Received Ctrl+C, stopping after the current row");
                stop.store(true, Ordering::SeqCst);
            }
        })
    };

    let summary = import_records(api, &rows, &stop).await;
    watcher.abort();
    Ok(summary)
}

async fn import_row<A: SceneApi>(api: &A, row: &Record) -> ClientResult<RowOutcome> {
    let url = match present(row, fields::URL) {
        None => return Ok(RowOutcome::Skipped("row without URL".to_string())),
        Some(value) => text(fields::URL, value)?,
    };

    if api.scene_exists(url).await? {
        return Ok(RowOutcome::Skipped(format!("existing scene with URL {}", url)));
    }

    let mut input = make_scene_create_input(row)?;

    if let Some(value) = present(row, fields::IMAGE) {
        let path = Path::new(text(fields::IMAGE, value)?);
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let image_id = api.create_image(bytes, &filename).await?;
        input["image_ids"] = json!([image_id]);
    }

    let id = api.create_scene(&input).await?;
    Ok(RowOutcome::Created(id))
}

// ============================================================================
// Extraction map resolver
// ============================================================================

/// Resolver counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveSummary {
    pub resolved: usize,
    pub unresolved: usize,
    /// Entries that already had a value
    pub kept: usize,
}

/// Look up every `null` entry of an extraction map by name and write the
/// found ids back to the same file.
pub async fn resolve_map<A: SceneApi>(
    api: &A,
    kind: EntityKind,
    path: &Path,
) -> ClientResult<ResolveSummary> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut map: Map<String, Value> = serde_json::from_str(&content)?;
    let mut summary = ResolveSummary::default();

    for (name, value) in map.iter_mut() {
        if !value.is_null() {
            summary.kept += 1;
            continue;
        }

        match api.find_id_by_name(kind, name).await? {
            Some(id) => {
                *value = Value::String(id);
                summary.resolved += 1;
            }
            None => {
                log_warning(format!("No {} named '{}'", kind, name));
                summary.unresolved += 1;
            }
        }
    }

    let mut json = serde_json::to_string_pretty(&map)?;
    json.push('\n');
    tokio::fs::write(path, json).await?;
    Ok(summary)
}

// ============================================================================
// Field helpers
// ============================================================================

fn present<'r>(row: &'r Record, field: &str) -> Option<&'r FieldValue> {
    row.get(field).filter(|value| !value.is_null())
}

fn text<'v>(field: &str, value: &'v FieldValue) -> ClientResult<&'v str> {
    value.as_text().ok_or_else(|| {
        ClientError::InvalidRow(format!("'{}' holds {}, expected a string", field, value.kind()))
    })
}

fn strings(field: &str, value: &FieldValue) -> ClientResult<Vec<String>> {
    match value {
        FieldValue::Text(s) => Ok(vec![s.clone()]),
        FieldValue::List(items) => Ok(items.clone()),
        other => Err(ClientError::InvalidRow(format!(
            "'{}' holds {}, expected a list of ids",
            field,
            other.kind()
        ))),
    }
}

fn duration(value: &FieldValue) -> ClientResult<i64> {
    let invalid = || {
        ClientError::InvalidRow(format!(
            "duration {} is not a whole number of seconds",
            value.to_json()
        ))
    };

    match value {
        FieldValue::Integer(n) => Ok(*n),
        FieldValue::Text(s) => s.trim().parse().map_err(|_| invalid()),
        FieldValue::Json(v) => v.as_i64().ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
