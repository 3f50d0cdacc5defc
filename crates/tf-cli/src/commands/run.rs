//! Run command implementation
//!
//! Stages run in order: ingest, validate, transform, write, state, then the
//! optional archive move. Outputs are written before the ledger state, so a
//! failed run leaves the ledger untouched and the next run re-reads the same
//! extracts; the SCD2 merge absorbs the repeat. A single writer per output
//! location is assumed.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tf_core::{Column, ColumnType, PipelineConfig, RunContext, Table, Value};
use tf_db::{DatamartSources, DuckDbBackend, TableStore};
use tf_quality::{
    domain_metrics_table, quality_results_table, QualityEngine, QuarantineReport, RunSummary,
    Validation,
};
use tf_warehouse::{CuratedTables, DimensionalBatch, DIM_GEO, DIM_TAXPAYER, FACT_TAX_RETURNS};

use super::common::{copy_into, load_config, move_into, run_context, write_json_atomic, StageTimer};
use super::extract::{extract, Extract};
use super::layout::OutputLayout;
use super::validate::print_quality;
use crate::cli::{GlobalArgs, RunArgs};

const DATA_QUALITY_RESULTS: &str = "data_quality_results";
const DOMAIN_METRICS: &str = "agg_data_quality_metrics";

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let run = run_context(args.run_id.as_deref(), args.run_timestamp.as_deref())?;
    let allow_backfill = args.allow_backfill || config.incremental.allow_backfill;
    let db = DuckDbBackend::in_memory().context("Failed to open storage")?;
    let layout = OutputLayout::new(&config, &run);

    println!("Run {} at {}\n", run.run_id, run.run_timestamp.to_rfc3339());

    let timer = StageTimer::start("ingest");
    let mut extract = extract(&config, &db, allow_backfill, global.verbose)
        .await
        .context("ingest stage failed")?;
    timer.done(format!(
        "{} file(s) read, {} skipped, {} row(s) admitted, {} held back by watermark",
        extract.sources.len(),
        extract.skipped.len(),
        extract.rows.len(),
        extract.watermark.dropped_rows()
    ));
    if !extract.missing_columns.is_empty() {
        println!(
            "    missing columns treated as empty: {}",
            extract.missing_columns.join(", ")
        );
    }
    if extract.is_empty() {
        println!("\nNo new files to process");
        return Ok(());
    }

    let timer = StageTimer::start("validate");
    let engine = QualityEngine::new(&config.quality);
    let validation = engine.validate(std::mem::take(&mut extract.rows));
    let quarantine = QuarantineReport::build(validation.quarantined(), config.quality.sample_size);
    let summary = RunSummary::build(&validation, &quarantine, &run);
    timer.done(format!(
        "{} valid, {} quarantined",
        summary.valid_rows, summary.quarantined_rows
    ));

    let timer = StageTimer::start("transform");
    let batch = DimensionalBatch::build(validation.valid().map(|r| &r.row), &run);
    let curated = load_curated(&db, &layout)
        .await
        .context("transform stage failed")?
        .apply(&batch, &run);
    timer.done(format!(
        "{} geo, {} taxpayer, {} tax return row(s) merged",
        batch.geo.len(),
        batch.taxpayers.len(),
        batch.returns.len()
    ));

    let timer = StageTimer::start("write");
    let outputs = RunOutputs {
        extract: &extract,
        validation: &validation,
        quarantine: &quarantine,
        summary: &summary,
        curated: &curated,
    };
    let mart_rows = write_outputs(&db, &layout, &outputs, &run)
        .await
        .context("write stage failed")?;
    timer.done(format!("datamart holds {} current return(s)", mart_rows));

    if config.incremental.enabled {
        let timer = StageTimer::start("state");
        let recorded = record_ledger(&db, &config, &layout, &extract, &run)
            .await
            .context("state stage failed")?;
        timer.done(format!("{} file(s) newly recorded", recorded));
    }

    if let Some(dir) = layout.archive_dir() {
        let timer = StageTimer::start("archive");
        let completed = extract.completed_sources();
        for source in &completed {
            move_into(&source.path, &dir).context("archive stage failed")?;
        }
        timer.done(format!("{} file(s) moved to {}", completed.len(), dir.display()));
    }

    println!();
    print_quality(&summary);
    Ok(())
}

/// Everything a run persists besides the ledger
struct RunOutputs<'a> {
    extract: &'a Extract,
    validation: &'a Validation,
    quarantine: &'a QuarantineReport,
    summary: &'a RunSummary,
    curated: &'a CuratedTables,
}

/// Prior history of every curated table; missing files are empty tables
async fn load_curated(db: &dyn TableStore, layout: &OutputLayout) -> Result<CuratedTables> {
    let mut tables = Vec::with_capacity(3);
    for name in [DIM_GEO, DIM_TAXPAYER, FACT_TAX_RETURNS] {
        let path = layout.curated_table(name);
        let table = db
            .read_table(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tables.push(table);
    }
    Ok(CuratedTables::from_tables(
        tables[0].as_ref(),
        tables[1].as_ref(),
        tables[2].as_ref(),
    ))
}

/// Write layer partitions, curated tables, quality outputs, and the
/// datamart, in that order. Returns the datamart row count.
async fn write_outputs(
    db: &dyn TableStore,
    layout: &OutputLayout,
    outputs: &RunOutputs<'_>,
    run: &RunContext,
) -> Result<usize> {
    let landing = layout.landing_dir();
    for source in &outputs.extract.sources {
        copy_into(&source.path, &landing)?;
    }

    let mut raw = outputs.extract.raw.clone();
    stamp_lineage(&mut raw, run);
    write(db, &raw, &layout.raw_file()).await?;

    let mut staging = Table::from_records(outputs.validation.valid());
    stamp_lineage(&mut staging, run);
    write(db, &staging, &layout.staging_file()).await?;

    let mut quarantined = Table::from_records(outputs.validation.quarantined());
    stamp_lineage(&mut quarantined, run);
    write(db, &quarantined, &layout.quarantine_file("quarantine")).await?;
    write(
        db,
        &Table::from_records(&outputs.quarantine.breakdown),
        &layout.quarantine_file("quarantine_breakdown"),
    )
    .await?;
    write(
        db,
        &Table::from_records(&outputs.quarantine.samples),
        &layout.quarantine_file("quarantine_samples"),
    )
    .await?;

    for (name, table) in outputs.curated.to_tables() {
        write(db, &table, &layout.curated_table(name)).await?;
    }

    write(
        db,
        &quality_results_table(outputs.validation, run),
        &layout.curated_table(DATA_QUALITY_RESULTS),
    )
    .await?;
    write(
        db,
        &domain_metrics_table(&outputs.validation.scores, run),
        &layout.curated_table(DOMAIN_METRICS),
    )
    .await?;
    write_json_atomic(&layout.summary_report(), outputs.summary)?;

    let returns = layout.curated_table(FACT_TAX_RETURNS);
    let taxpayers = layout.curated_table(DIM_TAXPAYER);
    let geo = layout.curated_table(DIM_GEO);
    let sources = DatamartSources {
        returns: &returns,
        taxpayers: &taxpayers,
        geo: &geo,
    };
    let mart_path = layout.datamart();
    db.build_datamart(sources, &mart_path)
        .await
        .with_context(|| format!("Failed to build {}", mart_path.display()))
}

async fn write(db: &dyn TableStore, table: &Table, path: &std::path::Path) -> Result<()> {
    let rows = db
        .write_table(table, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {} row(s) to {}", rows, path.display());
    Ok(())
}

/// Lineage columns carried by every layer partition
fn stamp_lineage(table: &mut Table, run: &RunContext) {
    let run_id = Value::Text(run.run_id.to_string());
    table.add_column(Column::new("created_run_id", ColumnType::Text), run_id.clone());
    table.add_column(Column::new("last_seen_run_id", ColumnType::Text), run_id);
    table.add_column(
        Column::new("ingested_at", ColumnType::Timestamp),
        Value::Timestamp(run.run_timestamp),
    );
}

/// Advance the watermark, record completed files, write the listing, and
/// save the state file last. Returns the number of newly recorded files.
async fn record_ledger(
    db: &dyn TableStore,
    config: &PipelineConfig,
    layout: &OutputLayout,
    extract: &Extract,
    run: &RunContext,
) -> Result<usize> {
    let completed = extract.completed_files();
    let held_back = extract.sources.len() - completed.len();
    if held_back > 0 {
        log::info!(
            "{} file(s) had rows below the watermark and stay eligible for backfill",
            held_back
        );
    }

    let next = extract.state.advance(
        extract.watermark.max_value,
        completed.iter().copied(),
        run.run_timestamp,
    );
    let new_files: BTreeSet<String> = completed
        .iter()
        .filter(|id| !extract.state.contains(id))
        .map(|id| id.to_string())
        .collect();

    let listing = Table::from_records(&next.ledger_entries(&new_files, run.run_timestamp));
    let listing_path = layout.ledger_listing();
    db.write_csv(&listing, &listing_path)
        .await
        .with_context(|| format!("Failed to write {}", listing_path.display()))?;

    let state_path = config.state_path();
    next.save(&state_path)
        .with_context(|| format!("Failed to save ledger state {}", state_path.display()))?;
    Ok(new_files.len())
}
