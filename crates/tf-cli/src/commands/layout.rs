//! Output locations of one run's artifacts

use std::path::PathBuf;
use tf_core::{Layer, PipelineConfig, RunContext};

/// Every path a run writes to, derived from the config and the run identity
#[derive(Debug, Clone)]
pub(crate) struct OutputLayout {
    landing: PathBuf,
    raw: PathBuf,
    staging: PathBuf,
    quarantine: PathBuf,
    curated: PathBuf,
    datamart: PathBuf,
    metadata: PathBuf,
    archive: Option<PathBuf>,
    source_name: String,
    run_id: String,
    ingest_date: String,
    date_path: String,
}

impl OutputLayout {
    pub(crate) fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        Self {
            landing: config.layer_dir(Layer::Landing),
            raw: config.layer_dir(Layer::Raw),
            staging: config.layer_dir(Layer::Staging),
            quarantine: config.quarantine_dir(),
            curated: config.layer_dir(Layer::Curated),
            datamart: config.layer_dir(Layer::Datamart),
            metadata: config.metadata_dir(),
            archive: config.archive_dir.as_ref().map(PathBuf::from),
            source_name: config.source_name.clone(),
            run_id: run.run_id.to_string(),
            ingest_date: run.ingest_date(),
            date_path: run.date_path(),
        }
    }

    /// `landing/<source>/<YYYY/MM/DD>/<run_id>`
    pub(crate) fn landing_dir(&self) -> PathBuf {
        self.landing
            .join(&self.source_name)
            .join(&self.date_path)
            .join(&self.run_id)
    }

    /// `<archive>/<source>/<YYYY/MM/DD>/<run_id>`, when archiving is on
    pub(crate) fn archive_dir(&self) -> Option<PathBuf> {
        self.archive.as_ref().map(|root| {
            root.join(&self.source_name)
                .join(&self.date_path)
                .join(&self.run_id)
        })
    }

    fn partition(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.source_name)
            .join(format!("ingest_date={}", self.ingest_date))
    }

    pub(crate) fn raw_file(&self) -> PathBuf {
        self.partition(&self.raw)
            .join(format!("raw_{}.parquet", self.run_id))
    }

    pub(crate) fn staging_file(&self) -> PathBuf {
        self.partition(&self.staging)
            .join(format!("staging_{}.parquet", self.run_id))
    }

    /// Quarantine artifact, e.g. `quarantine_breakdown_<run_id>.parquet`
    pub(crate) fn quarantine_file(&self, kind: &str) -> PathBuf {
        self.partition(&self.quarantine)
            .join(format!("{}_{}.parquet", kind, self.run_id))
    }

    pub(crate) fn curated_table(&self, name: &str) -> PathBuf {
        self.curated.join(format!("{}.parquet", name))
    }

    pub(crate) fn summary_report(&self) -> PathBuf {
        self.curated.join("summary_report.json")
    }

    pub(crate) fn datamart(&self) -> PathBuf {
        self.datamart.join("datamart_tax_returns.parquet")
    }

    pub(crate) fn ledger_listing(&self) -> PathBuf {
        self.metadata.join("processed_files.csv")
    }
}
