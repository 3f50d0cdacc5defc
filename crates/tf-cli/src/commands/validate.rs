//! Validate command implementation
//!
//! Reads and checks pending extracts exactly as `run` would, then reports.
//! Nothing is written: no layer outputs, no ledger state, no archive moves.

use anyhow::{Context, Result};
use tf_db::DuckDbBackend;
use tf_quality::{QualityEngine, QuarantineReport, RunSummary};

use super::common::{load_config, run_context, ExitCode};
use super::extract::extract;
use crate::cli::{GlobalArgs, ReportOutput, ValidateArgs};

/// Execute the validate command
pub async fn execute(args: &ValidateArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let run = run_context(None, None)?;
    let allow_backfill = args.allow_backfill || config.incremental.allow_backfill;
    let db = DuckDbBackend::in_memory().context("Failed to open storage")?;

    let mut extract = extract(&config, &db, allow_backfill, global.verbose)
        .await
        .context("ingest stage failed")?;

    let engine = QualityEngine::new(&config.quality);
    let validation = engine.validate(std::mem::take(&mut extract.rows));
    let quarantine = QuarantineReport::build(validation.quarantined(), config.quality.sample_size);
    let summary = RunSummary::build(&validation, &quarantine, &run);

    match args.output {
        ReportOutput::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ReportOutput::Text => {
            if extract.is_empty() {
                println!("No new files to process");
            } else {
                println!(
                    "Checked {} file(s), {} skipped, {} row(s) held back by watermark\n",
                    extract.sources.len(),
                    extract.skipped.len(),
                    extract.watermark.dropped_rows()
                );
                print_quality(&summary);
            }
        }
    }

    if args.strict && summary.quarantined_rows > 0 {
        if args.output == ReportOutput::Text {
            eprintln!(
                "\n{} row(s) quarantined; failing because of --strict",
                summary.quarantined_rows
            );
        }
        return Err(ExitCode(1).into());
    }
    Ok(())
}

/// Human-readable quality block shared with `run`
pub(crate) fn print_quality(summary: &RunSummary) {
    println!(
        "Quality: {} of {} row(s) valid, {} quarantined",
        summary.valid_rows, summary.total_rows, summary.quarantined_rows
    );
    for score in &summary.domain_scores {
        println!(
            "  {:<13} {:>6.2}%  ({}/{})",
            score.domain, score.score_pct, score.passing_rows, score.total_rows
        );
    }

    let failing: Vec<_> = summary
        .quarantine_breakdown
        .iter()
        .filter(|b| b.invalid_count > 0)
        .collect();
    if failing.is_empty() {
        return;
    }
    println!("\nQuarantine breakdown:");
    for rule in failing {
        println!("  {:<36} {}", rule.rule, rule.invalid_count);
    }
}
