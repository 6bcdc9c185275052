// ── Import / export pipeline ──
//
// Batch ingestion of uploaded code lists, and the matching export
// serialization. Files are strictly a boundary format: once a batch is
// imported the store is the only source of truth. Partial-failure
// semantics throughout -- one bad row never aborts the rest.

use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, info};

use keydrop_store::KvStore;

use crate::error::CoreError;
use crate::model::{Category, Code};
use crate::repo::CodeRepository;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Txt,
    Json,
}

impl ImportFormat {
    /// Map a file extension hint (case-insensitive) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "txt" => Some(Self::Txt),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Outcome of an import batch. Skipped counts duplicates and records
/// that failed validation; neither is fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Parse and ingest one uploaded batch.
///
/// Every candidate runs through the validator, then an atomic
/// create-if-absent. Re-importing the same batch is a no-op that shows
/// up entirely in `skipped`.
pub async fn import_codes<S: KvStore>(
    repo: &CodeRepository<S>,
    raw: &str,
    format: ImportFormat,
) -> Result<ImportReport, CoreError> {
    let mut report = ImportReport::default();

    for candidate in parse_candidates(raw, format)? {
        match Code::from_str(&candidate) {
            Ok(code) => {
                if repo.insert_if_absent(&code).await? {
                    report.inserted += 1;
                } else {
                    report.skipped += 1;
                }
            }
            Err(e) => {
                debug!(raw = %candidate, error = %e, "skipping invalid import record");
                report.skipped += 1;
            }
        }
    }

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "import batch finished"
    );
    Ok(report)
}

/// Extract raw candidate strings from the payload.
///
/// CSV/TXT are line-oriented with the first comma-separated column
/// taken per line. JSON accepts an array of strings or an object whose
/// values are strings; a payload of any other shape is a parse error.
fn parse_candidates(raw: &str, format: ImportFormat) -> Result<Vec<String>, CoreError> {
    match format {
        ImportFormat::Csv | ImportFormat::Txt => Ok(raw
            .lines()
            .map(|line| line.split(',').next().unwrap_or(line))
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .map(str::to_owned)
            .collect()),
        ImportFormat::Json => {
            let value: Value =
                serde_json::from_str(raw).map_err(|e| CoreError::UploadParse {
                    message: e.to_string(),
                })?;
            let items: Vec<Value> = match value {
                Value::Array(items) => items,
                Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                other => {
                    return Err(CoreError::UploadParse {
                        message: format!("expected array or object, got {other}"),
                    });
                }
            };
            // Non-string elements are kept as their JSON rendering; they
            // fail validation downstream and land in the skip count.
            Ok(items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect())
        }
    }
}

// ── Export ──────────────────────────────────────────────────────────

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `code,state` lines; re-importable (first column per line).
    Csv,
    /// JSON object mapping code -> state tag.
    Json,
}

/// Serialize current entries for one category, or all of them.
///
/// Purely a boundary format -- the store remains the source of truth.
pub async fn export_codes<S: KvStore>(
    repo: &CodeRepository<S>,
    category: Option<Category>,
    format: ExportFormat,
) -> Result<String, CoreError> {
    let categories: Vec<Category> = match category {
        Some(c) => vec![c],
        None => Category::ALL.to_vec(),
    };

    let mut entries = Vec::new();
    for category in categories {
        let mut cursor = 0;
        loop {
            let page = repo.list_page(category, cursor).await?;
            let done = page.is_last();
            cursor = page.cursor;
            entries.extend(page.entries);
            if done {
                break;
            }
        }
    }

    match format {
        ExportFormat::Csv => {
            let mut out = String::new();
            for entry in &entries {
                out.push_str(&format!("{},{}\n", entry.code, entry.state));
            }
            Ok(out)
        }
        ExportFormat::Json => {
            let map: serde_json::Map<String, Value> = entries
                .iter()
                .map(|e| (e.code.to_string(), Value::String(e.state.to_string())))
                .collect();
            serde_json::to_string_pretty(&Value::Object(map))
                .map_err(|e| CoreError::Internal(format!("export serialization failed: {e}")))
        }
    }
}
