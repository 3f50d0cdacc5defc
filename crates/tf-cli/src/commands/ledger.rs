//! Ledger command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use tf_core::{LedgerEntry, WatermarkState};

use super::common::{load_config, print_table};
use crate::cli::{GlobalArgs, LedgerArgs, LedgerOutput};

/// Ledger contents as printed by `--output json`
#[derive(Debug, Serialize)]
struct LedgerReport {
    enabled: bool,
    watermark_key: String,
    last_watermark_value: Option<i64>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    files: Vec<LedgerEntry>,
}

/// Execute the ledger command
pub async fn execute(args: &LedgerArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let path = config.state_path();
    let state = WatermarkState::load(&path)
        .with_context(|| format!("Failed to load ledger state {}", path.display()))?;
    if global.verbose {
        eprintln!("[verbose] Ledger state: {}", path.display());
    }

    let report = build_report(&state, config.incremental.enabled, &config.incremental.key);
    match args.output {
        LedgerOutput::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        LedgerOutput::Table => print_report(&report),
    }
    Ok(())
}

fn build_report(state: &WatermarkState, enabled: bool, key: &str) -> LedgerReport {
    let files = match state.updated_at {
        Some(at) => state.ledger_entries(&BTreeSet::new(), at),
        None => Vec::new(),
    };
    LedgerReport {
        enabled,
        watermark_key: key.to_string(),
        last_watermark_value: state.last_watermark_value,
        updated_at: state.updated_at,
        files,
    }
}

fn print_report(report: &LedgerReport) {
    if !report.enabled {
        println!("Incremental loading is disabled; runs do not update the ledger.\n");
    }
    let watermark = report
        .last_watermark_value
        .map_or_else(|| "(none)".to_string(), |v| v.to_string());
    println!("Watermark {}: {}", report.watermark_key, watermark);
    match report.updated_at {
        Some(at) => println!("Last updated: {}", at.to_rfc3339()),
        None => println!("Last updated: never"),
    }
    println!();

    if report.files.is_empty() {
        println!("No processed files recorded.");
        return;
    }
    let rows: Vec<Vec<String>> = report
        .files
        .iter()
        .map(|f| {
            vec![
                f.file_name.clone(),
                f.file_size.map(|s| s.to_string()).unwrap_or_default(),
                f.file_mtime.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["FILE", "SIZE", "MODIFIED"], &rows);
    println!("\n{} file(s) recorded", report.files.len());
}
