//! Shared helpers for CLI commands

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tf_core::{PipelineConfig, RunContext, RunId};

use crate::cli::GlobalArgs;

/// Non-zero exit requested by a command.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; nothing to show on stderr.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Load the pipeline config from `--config` or the project directory.
///
/// Relative paths inside the config resolve against the project directory.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<PipelineConfig> {
    let project_dir = Path::new(&global.project_dir);
    let mut config = match &global.config {
        Some(path) => {
            PipelineConfig::load(Path::new(path)).context("Failed to load configuration file")?
        }
        None => PipelineConfig::load_from_dir(project_dir)
            .context("Failed to load project configuration")?,
    };
    config.resolve_paths(project_dir);

    if global.verbose {
        eprintln!(
            "[verbose] Source '{}': input {} -> output {}",
            config.source_name, config.input_path, config.output_dir
        );
    }
    Ok(config)
}

/// Run identity, honouring `--run-id` and `--run-timestamp` overrides
pub(crate) fn run_context(run_id: Option<&str>, run_timestamp: Option<&str>) -> Result<RunContext> {
    let timestamp = run_timestamp.map(parse_run_timestamp).transpose()?;
    let run_id = match run_id {
        Some(id) => match RunId::try_new(id.trim()) {
            Some(id) => Some(id),
            None => bail!("--run-id cannot be empty"),
        },
        None => None,
    };
    Ok(match (run_id, timestamp) {
        (Some(id), Some(ts)) => RunContext::with_id(id, ts),
        (Some(id), None) => RunContext::with_id(id, Utc::now()),
        (None, Some(ts)) => RunContext::at(ts),
        (None, None) => RunContext::start(),
    })
}

fn parse_run_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Invalid --run-timestamp '{}': expected RFC 3339", value))
}

/// Times one pipeline stage and prints its completion line
pub(crate) struct StageTimer {
    name: &'static str,
    started: Instant,
}

impl StageTimer {
    pub(crate) fn start(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
        }
    }

    pub(crate) fn done(self, detail: impl fmt::Display) {
        println!(
            "  ✓ {:<10} {} [{}ms]",
            self.name,
            detail,
            self.started.elapsed().as_millis()
        );
    }
}

/// Write pretty JSON to a PID-suffixed temp file, then rename over `path`
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    std::fs::write(&temp_path, json)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to write {}", path.display())
    })
}

/// Copy a file into `dir`, keeping its name
pub(crate) fn copy_into(file: &Path, dir: &Path) -> Result<()> {
    let target = dir.join(file_name(file)?);
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::copy(file, &target)
        .with_context(|| format!("Failed to copy {} to {}", file.display(), target.display()))?;
    Ok(())
}

/// Move a file into `dir`; falls back to copy and delete across filesystems
pub(crate) fn move_into(file: &Path, dir: &Path) -> Result<()> {
    let target = dir.join(file_name(file)?);
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    if std::fs::rename(file, &target).is_ok() {
        return Ok(());
    }
    std::fs::copy(file, &target)
        .with_context(|| format!("Failed to move {} to {}", file.display(), target.display()))?;
    std::fs::remove_file(file).with_context(|| format!("Failed to remove {}", file.display()))
}

fn file_name(file: &Path) -> Result<&std::ffi::OsStr> {
    file.file_name()
        .with_context(|| format!("Not a file path: {}", file.display()))
}

/// Widest cell per column, headers included
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Print a left-aligned table with a dashed separator under the header.
/// Columns are separated by two spaces.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_run_context_overrides() {
        let run = run_context(Some("run_fixed"), Some("2024-04-01T08:00:00+08:00")).unwrap();
        assert_eq!(run.run_id.as_str(), "run_fixed");
        assert_eq!(
            run.run_timestamp,
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_generated_run_id_uses_timestamp() {
        let run = run_context(None, Some("2024-04-01T00:00:00Z")).unwrap();
        assert!(run.run_id.starts_with("run_20240401T000000+0000_"));
    }

    #[test]
    fn test_bad_overrides_are_rejected() {
        assert!(run_context(Some("  "), None).is_err());
        let err = run_context(None, Some("yesterday")).unwrap_err();
        assert!(err.to_string().contains("--run-timestamp"));
    }

    #[test]
    fn test_column_widths_cover_headers_and_cells() {
        let rows = vec![vec!["a.csv".to_string(), "12".to_string()]];
        assert_eq!(calculate_column_widths(&["FILE", "SIZE"], &rows), vec![5, 4]);
    }

    #[test]
    fn test_exit_code_renders_empty() {
        assert_eq!(ExitCode(3).to_string(), "");
    }

    #[test]
    fn test_copy_and_move_into() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.csv");
        std::fs::write(&file, "x\n").unwrap();

        copy_into(&file, &dir.path().join("landing/2024")).unwrap();
        assert!(dir.path().join("landing/2024/a.csv").exists());
        assert!(file.exists());

        move_into(&file, &dir.path().join("archive")).unwrap();
        assert!(dir.path().join("archive/a.csv").exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_write_json_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/summary.json");
        write_json_atomic(&path, &serde_json::json!({"rows": 3})).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["rows"], 3);
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
