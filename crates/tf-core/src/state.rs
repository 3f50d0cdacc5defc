//! Watermark and processed-file ledger persisted between runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::ingest::{mtime_timestamp, FileId};
use crate::table::{Column, ColumnType, RowView, TableRecord, Value};

/// Ledger state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatermarkState {
    /// Highest watermark value processed so far
    #[serde(default, alias = "last_assessment_year")]
    pub last_watermark_value: Option<i64>,

    /// Fingerprints of every extract recorded as processed
    #[serde(default)]
    pub processed_files: BTreeSet<String>,

    /// When this state was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WatermarkState {
    /// Load state from a file path; a missing file is an empty ledger
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io_at(path, e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let state: WatermarkState = serde_json::from_str(&content)?;
        Ok(state)
    }

    /// Save state to a file path atomically
    ///
    /// Writes to a PID-suffixed temp file, then renames over the target.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io_at(parent, e))?;
        }

        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, &json).map_err(|e| CoreError::io_at(&temp_path, e))?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::io_at(path, e)
        })?;
        Ok(())
    }

    /// Whether a fingerprint is already recorded
    pub fn contains(&self, file: &FileId) -> bool {
        self.processed_files.contains(file.as_str())
    }

    /// State after a successful run.
    ///
    /// The watermark never decreases; processed files are the union of the
    /// recorded set and `new_files`.
    pub fn advance<'a, I>(&self, run_max: Option<i64>, new_files: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a FileId>,
    {
        let last_watermark_value = match (self.last_watermark_value, run_max) {
            (Some(prev), Some(current)) => Some(prev.max(current)),
            (prev, current) => prev.or(current),
        };
        let mut processed_files = self.processed_files.clone();
        processed_files.extend(new_files.into_iter().map(|f| f.to_string()));
        Self {
            last_watermark_value,
            processed_files,
            updated_at: Some(now),
        }
    }

    /// Listing of every recorded file, flagging those recorded this run
    pub fn ledger_entries(
        &self,
        new_files: &BTreeSet<String>,
        processed_at: DateTime<Utc>,
    ) -> Vec<LedgerEntry> {
        self.processed_files
            .iter()
            .map(|id| LedgerEntry::new(id, new_files.contains(id), processed_at))
            .collect()
    }
}

/// One row of the processed-files listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub file_id: String,
    pub file_name: String,
    pub file_size: Option<u64>,
    pub file_mtime: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub is_new: bool,
}

impl LedgerEntry {
    fn new(file_id: &str, is_new: bool, processed_at: DateTime<Utc>) -> Self {
        let parsed = FileId::try_new(file_id);
        let parts = parsed.as_ref().and_then(FileId::parts);
        match parts {
            Some((name, size, mtime)) => Self {
                file_id: file_id.to_string(),
                file_name: name.to_string(),
                file_size: Some(size),
                file_mtime: mtime_timestamp(mtime),
                processed_at: Some(processed_at),
                is_new,
            },
            None => Self {
                file_id: file_id.to_string(),
                file_name: file_id.to_string(),
                file_size: None,
                file_mtime: None,
                processed_at: Some(processed_at),
                is_new,
            },
        }
    }
}

impl TableRecord for LedgerEntry {
    fn schema() -> Vec<Column> {
        vec![
            Column::new("file_id", ColumnType::Text),
            Column::new("file_name", ColumnType::Text),
            Column::new("file_size", ColumnType::UInt),
            Column::new("file_mtime", ColumnType::Timestamp),
            Column::new("processed_at", ColumnType::Timestamp),
            Column::new("is_new", ColumnType::Bool),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.file_id.clone()),
            Value::Text(self.file_name.clone()),
            Value::from(self.file_size),
            Value::from(self.file_mtime),
            Value::from(self.processed_at),
            Value::Bool(self.is_new),
        ]
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            file_id: row.text("file_id").unwrap_or_default(),
            file_name: row.text("file_name").unwrap_or_default(),
            file_size: row.uint("file_size"),
            file_mtime: row.timestamp("file_mtime"),
            processed_at: row.timestamp("processed_at"),
            is_new: row.bool("is_new").unwrap_or(false),
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
