//! Source discovery, file fingerprints, and the watermark row filter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::newtype_string::define_newtype_string;
use crate::state::WatermarkState;
use crate::table::{Column, ColumnType, Table, Value};

define_newtype_string! {
    /// Fingerprint of a source extract: `name:size:mtime_secs`.
    pub struct FileId;
}

impl FileId {
    /// Fingerprint from its parts
    pub fn from_parts(name: &str, size: u64, mtime_secs: i64) -> Self {
        Self::new(format!("{name}:{size}:{mtime_secs}"))
    }

    /// Split a fingerprint back into name, size and modification time.
    ///
    /// Size and time are split from the right so names containing `:`
    /// still parse. Returns `None` for ids not in fingerprint form.
    pub fn parts(&self) -> Option<(&str, u64, i64)> {
        let mut pieces = self.as_str().rsplitn(3, ':');
        let mtime = pieces.next()?.parse().ok()?;
        let size = pieces.next()?.parse().ok()?;
        let name = pieces.next()?;
        Some((name, size, mtime))
    }
}

/// Column carrying the originating file name
pub const SOURCE_FILE_COLUMN: &str = "source_file";

/// Column carrying the originating file fingerprint
pub const SOURCE_FILE_ID_COLUMN: &str = "source_file_id";

/// A discovered source extract with its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mtime_secs: i64,
    pub id: FileId,
}

impl SourceFile {
    /// Stat a file and derive its fingerprint
    pub fn fingerprint(path: &Path) -> CoreResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| CoreError::Fingerprint {
            path: path.display().to_string(),
            source: e,
        })?;
        let modified = metadata.modified().map_err(|e| CoreError::Fingerprint {
            path: path.display().to_string(),
            source: e,
        })?;
        let mtime_secs = match modified.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before_epoch) => -(before_epoch.duration().as_secs() as i64),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let size = metadata.len();
        let id = FileId::from_parts(&name, size, mtime_secs);
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
            mtime_secs,
            id,
        })
    }
}

/// Enumerate source extracts: every `*.csv` in a directory (sorted by
/// path), or the single file itself.
pub fn discover_sources(input: &Path) -> CoreResult<Vec<SourceFile>> {
    if !input.exists() {
        return Err(CoreError::InputNotFound {
            path: input.display().to_string(),
        });
    }
    if !input.is_dir() {
        return Ok(vec![SourceFile::fingerprint(input)?]);
    }

    let pattern = input.join("*.csv").display().to_string();
    let entries = glob::glob(&pattern).map_err(|e| CoreError::InvalidPattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(CoreError::NoInputFiles {
            path: input.display().to_string(),
        });
    }
    paths.iter().map(|p| SourceFile::fingerprint(p)).collect()
}

/// Split sources into those to read and those already in the ledger.
///
/// Nothing is skipped unless `track_files` is set.
pub fn skip_processed(
    sources: Vec<SourceFile>,
    state: &WatermarkState,
    track_files: bool,
) -> (Vec<SourceFile>, Vec<SourceFile>) {
    if !track_files {
        return (sources, Vec::new());
    }
    let (skipped, pending): (Vec<_>, Vec<_>) = sources
        .into_iter()
        .partition(|source| state.contains(&source.id));
    for source in &skipped {
        log::info!("Skipping already processed file: {}", source.id);
    }
    (pending, skipped)
}

/// Lowercase snake-case header: runs of non-alphanumerics become a single
/// `_`, leading and trailing separators are stripped.
pub fn normalize_column(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.push(ch);
        } else {
            pending_separator = true;
        }
    }
    normalized
}

/// Normalise headers, apply the rename map, and tag rows with their source.
pub fn prepare_extract(
    table: &mut Table,
    source: &SourceFile,
    rename_map: &BTreeMap<String, String>,
) {
    let normalized: BTreeMap<String, String> = table
        .column_names()
        .into_iter()
        .map(|name| (name.to_string(), normalize_column(name)))
        .collect();
    table.rename_columns(&normalized);
    table.rename_columns(rename_map);
    table.add_column(
        Column::new(SOURCE_FILE_COLUMN, ColumnType::Text),
        Value::Text(source.name.clone()),
    );
    table.add_column(
        Column::new(SOURCE_FILE_ID_COLUMN, ColumnType::Text),
        Value::Text(source.id.to_string()),
    );
}

/// Add every missing required column as all-null; returns the gaps.
pub fn ensure_required_columns(table: &mut Table, required: &[String]) -> Vec<String> {
    let mut missing = Vec::new();
    for name in required {
        if !table.has_column(name) {
            log::warn!("Required column '{}' is missing; treating it as empty", name);
            table.add_column(Column::new(name.clone(), ColumnType::Text), Value::Null);
            missing.push(name.clone());
        }
    }
    missing
}

/// Result of applying the watermark to one run's rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkFilter {
    /// Rows dropped, per source file fingerprint
    pub dropped_by_file: BTreeMap<String, usize>,

    /// Highest watermark value among the retained rows
    pub max_value: Option<i64>,
}

impl WatermarkFilter {
    pub fn dropped_rows(&self) -> usize {
        self.dropped_by_file.values().sum()
    }

    /// Whether any row of the given file fell below the watermark
    pub fn dropped_from(&self, file: &FileId) -> bool {
        self.dropped_by_file.get(file.as_str()).is_some_and(|n| *n > 0)
    }
}

/// Drop rows whose `key` value is below `last_value` unless backfill is
/// allowed. Rows with a missing or unparsable value are always kept.
pub fn apply_watermark(
    table: &mut Table,
    key: &str,
    last_value: Option<i64>,
    allow_backfill: bool,
) -> WatermarkFilter {
    let mut outcome = WatermarkFilter::default();
    let threshold = if allow_backfill { None } else { last_value };

    table.retain_rows(|row| {
        let value = row.int(key);
        let keep = match (value, threshold) {
            (Some(v), Some(last)) => v >= last,
            _ => true,
        };
        if keep {
            if let Some(v) = value {
                outcome.max_value = Some(outcome.max_value.map_or(v, |m| m.max(v)));
            }
        } else {
            let file = row.text(SOURCE_FILE_ID_COLUMN).unwrap_or_default();
            *outcome.dropped_by_file.entry(file).or_insert(0) += 1;
        }
        keep
    });

    if outcome.dropped_rows() > 0 {
        log::info!(
            "Watermark {} on '{}' dropped {} row(s)",
            last_value.unwrap_or_default(),
            key,
            outcome.dropped_rows()
        );
    }
    outcome
}

/// Modification time of a fingerprint as a timestamp
pub fn mtime_timestamp(mtime_secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(mtime_secs, 0)
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
