//! Ingest stage shared by `run` and `validate`

use anyhow::{Context, Result};
use std::path::Path;
use tf_core::ingest::{
    apply_watermark, discover_sources, ensure_required_columns, prepare_extract, skip_processed,
};
use tf_core::{FileId, PipelineConfig, SourceFile, Table, TaxRow, WatermarkFilter, WatermarkState};
use tf_db::TableStore;

/// Rows admitted into one run, plus the ledger context they came from
#[derive(Debug)]
pub(crate) struct Extract {
    /// Ledger state as loaded before the run
    pub state: WatermarkState,
    /// Files read this run
    pub sources: Vec<SourceFile>,
    /// Files skipped because the ledger already holds them
    pub skipped: Vec<SourceFile>,
    /// Normalised extract rows, all text, tagged with their source file
    pub raw: Table,
    pub rows: Vec<TaxRow>,
    pub watermark: WatermarkFilter,
    pub missing_columns: Vec<String>,
}

impl Extract {
    pub(crate) fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Files read this run with no row held back by the watermark
    pub(crate) fn completed_sources(&self) -> Vec<&SourceFile> {
        self.sources
            .iter()
            .filter(|s| !self.watermark.dropped_from(&s.id))
            .collect()
    }

    /// Fingerprints safe to record as processed
    pub(crate) fn completed_files(&self) -> Vec<&FileId> {
        self.completed_sources().into_iter().map(|s| &s.id).collect()
    }
}

/// Discover extracts, skip those already in the ledger, read and normalise
/// the rest, and apply the watermark.
pub(crate) async fn extract(
    config: &PipelineConfig,
    db: &dyn TableStore,
    allow_backfill: bool,
    verbose: bool,
) -> Result<Extract> {
    let incremental = &config.incremental;
    let state = if incremental.enabled {
        let path = config.state_path();
        WatermarkState::load(&path)
            .with_context(|| format!("Failed to load ledger state {}", path.display()))?
    } else {
        WatermarkState::default()
    };

    let discovered = discover_sources(Path::new(&config.input_path))?;
    let (sources, skipped) =
        skip_processed(discovered, &state, incremental.enabled && incremental.track_files);

    let rename_map = config.rename_map();
    let mut raw = Table::default();
    for source in &sources {
        let mut table = db
            .read_delimited(&source.path)
            .await
            .with_context(|| format!("Failed to read {}", source.path.display()))?;
        if verbose {
            eprintln!(
                "[verbose] Read {} row(s) from {} ({})",
                table.len(),
                source.name,
                source.id
            );
        }
        prepare_extract(&mut table, source, &rename_map);
        raw.concat(table);
    }

    let missing_columns = if sources.is_empty() {
        Vec::new()
    } else {
        ensure_required_columns(&mut raw, &config.required_columns)
    };

    let watermark = if incremental.enabled {
        apply_watermark(
            &mut raw,
            &incremental.key,
            state.last_watermark_value,
            allow_backfill,
        )
    } else {
        WatermarkFilter::default()
    };

    let rows = TaxRow::from_table(&raw);
    Ok(Extract {
        state,
        sources,
        skipped,
        raw,
        rows,
        watermark,
        missing_columns,
    })
}
