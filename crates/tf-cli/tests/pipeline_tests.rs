//! End-to-end tests for the `tf` binary
//!
//! Each test builds a throwaway project directory with a `taxflow.yml` and
//! CSV extracts, runs the CLI against it, then inspects the written tables.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tf_core::{Table, WatermarkState};
use tf_db::{DuckDbBackend, TableStore};

const HEADER: &str = "NRIC,Full Name,Filing Status,Residential Status,Number of Dependents,\
Occupation,Postal Code,Housing Type,Assessment Year,Filing Date,Annual Income,Total Reliefs,\
Chargeable Income,CPF Contribution,Foreign Income,Tax Payable,Tax Paid";

const TAN: &str = "S1234567A,Tan Ah Kow,Single,Resident,0,Engineer,018956,HDB,2023,2024-03-01,\
85000,10000,75000,12000,0,3350,3350";
const LIM: &str = "T7654321B,Lim Mei Ling,Married,Non-resident,2,Analyst,640123,Condo,2023,\
2024-04-02,120000,20000,100000,0,5000,11500,11500";
const BAD_NRIC: &str = "X0000000Z,Nobody,Single,Resident,0,Clerk,123456,HDB,2023,2024-03-15,\
40000,5000,35000,6000,0,550,550";

/// Path to the compiled tf binary
fn tf_bin() -> String {
    env!("CARGO_BIN_EXE_tf").to_string()
}

/// Run a `tf` command inside `project` and return (stdout, stderr, success).
fn run_tf(project: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(tf_bin())
        .arg("--project-dir")
        .arg(project)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to execute tf with args {:?}: {}", args, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn run_at(project: &Path, run_id: &str, day: u32, extra: &[&str]) -> String {
    let timestamp = format!("2024-06-{:02}T12:00:00Z", day);
    let mut args = vec!["run", "--run-id", run_id, "--run-timestamp", timestamp.as_str()];
    args.extend_from_slice(extra);
    let (stdout, stderr, ok) = run_tf(project, &args);
    assert!(ok, "tf run failed\nstdout:\n{}\nstderr:\n{}", stdout, stderr);
    stdout
}

struct Project {
    dir: TempDir,
}

impl Project {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("input")).unwrap();
        std::fs::write(dir.path().join("taxflow.yml"), config).unwrap();
        Self { dir }
    }

    fn incremental(track_files: bool) -> Self {
        Self::new(&format!(
            "input_path: input\n\
             output_dir: out\n\
             source_name: returns\n\
             incremental:\n  enabled: true\n  key: assessment_year\n  track_files: {}\n",
            track_files
        ))
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self, rel: &str) -> PathBuf {
        self.path().join("out").join(rel)
    }

    fn write_extract(&self, name: &str, rows: &[&str]) {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        content.push('\n');
        std::fs::write(self.path().join("input").join(name), content).unwrap();
    }

    fn state(&self) -> WatermarkState {
        WatermarkState::load(&self.out("metadata/state.json")).unwrap()
    }
}

async fn read(path: &Path) -> Table {
    let db = DuckDbBackend::in_memory().unwrap();
    db.read_table(path)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{} was not written", path.display()))
}

fn summary(project: &Project) -> serde_json::Value {
    let content = std::fs::read_to_string(project.out("curated/summary_report.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_run_writes_every_layer() {
    let project = Project::incremental(true);
    project.write_extract("returns.csv", &[TAN, LIM, BAD_NRIC]);

    let stdout = run_at(project.path(), "run_1", 1, &[]);
    assert!(stdout.contains("2 of 3 row(s) valid"), "stdout:\n{}", stdout);

    for rel in [
        "landing/returns/2024/06/01/run_1/returns.csv",
        "raw/returns/ingest_date=2024-06-01/raw_run_1.parquet",
        "staging/returns/ingest_date=2024-06-01/staging_run_1.parquet",
        "staging/quarantine/returns/ingest_date=2024-06-01/quarantine_run_1.parquet",
        "staging/quarantine/returns/ingest_date=2024-06-01/quarantine_breakdown_run_1.parquet",
        "curated/dim_geo.parquet",
        "curated/dim_taxpayer.parquet",
        "curated/fact_tax_returns.parquet",
        "curated/data_quality_results.parquet",
        "curated/agg_data_quality_metrics.parquet",
        "datamart/datamart_tax_returns.parquet",
        "metadata/processed_files.csv",
        "metadata/state.json",
    ] {
        assert!(project.out(rel).exists(), "missing output {}", rel);
    }

    let report = summary(&project);
    assert_eq!(report["total_rows"], 3);
    assert_eq!(report["valid_rows"], 2);
    assert_eq!(report["quarantined_rows"], 1);
    assert_eq!(report["invalid_nric_count"], 1);

    let raw = read(&project.out("raw/returns/ingest_date=2024-06-01/raw_run_1.parquet")).await;
    assert_eq!(raw.len(), 3);
    assert!(raw.has_column("created_run_id"));

    let facts = read(&project.out("curated/fact_tax_returns.parquet")).await;
    assert_eq!(facts.len(), 2);
    assert!(facts.views().all(|r| r.bool("is_current") == Some(true)));
    assert!(facts.views().all(|r| r.int("version") == Some(1)));

    let mart = read(&project.out("datamart/datamart_tax_returns.parquet")).await;
    assert_eq!(mart.len(), 2);
    let regions: Vec<_> = mart.views().filter_map(|r| r.text("region")).collect();
    assert_eq!(regions.len(), 2);

    let state = project.state();
    assert_eq!(state.last_watermark_value, Some(2023));
    assert_eq!(state.processed_files.len(), 1);
    let listing = std::fs::read_to_string(project.out("metadata/processed_files.csv")).unwrap();
    assert!(listing.starts_with("file_id,file_name,"));
    assert!(listing.contains("returns.csv"));
}

#[tokio::test]
async fn test_rerun_skips_processed_files() {
    let project = Project::incremental(true);
    project.write_extract("returns.csv", &[TAN, LIM]);

    run_at(project.path(), "run_1", 1, &[]);
    let stdout = run_at(project.path(), "run_2", 2, &[]);
    assert!(stdout.contains("No new files to process"), "stdout:\n{}", stdout);

    let facts = read(&project.out("curated/fact_tax_returns.parquet")).await;
    assert_eq!(facts.len(), 2);
    assert!(facts
        .views()
        .all(|r| r.text("last_seen_run_id").as_deref() == Some("run_1")));
    assert_eq!(project.state().processed_files.len(), 1);
}

#[tokio::test]
async fn test_rerun_without_file_tracking_refreshes_last_seen() {
    let project = Project::incremental(false);
    project.write_extract("returns.csv", &[TAN, LIM]);

    run_at(project.path(), "run_1", 1, &[]);
    run_at(project.path(), "run_2", 2, &[]);

    let facts = read(&project.out("curated/fact_tax_returns.parquet")).await;
    assert_eq!(facts.len(), 2);
    for row in facts.views() {
        assert_eq!(row.text("created_run_id").as_deref(), Some("run_1"));
        assert_eq!(row.text("last_seen_run_id").as_deref(), Some("run_2"));
        assert_eq!(row.bool("is_current"), Some(true));
    }

    let taxpayers = read(&project.out("curated/dim_taxpayer.parquet")).await;
    assert_eq!(taxpayers.len(), 2);
}

#[tokio::test]
async fn test_changed_return_is_versioned() {
    let project = Project::new("input_path: input\noutput_dir: out\nsource_name: returns\n");
    project.write_extract("returns.csv", &[TAN]);
    run_at(project.path(), "run_1", 1, &[]);

    let amended = TAN
        .replace("2024-03-01", "2024-04-15")
        .replace("3350,3350", "3600,3350");
    project.write_extract("returns.csv", &[&amended]);
    run_at(project.path(), "run_2", 2, &[]);

    let facts = read(&project.out("curated/fact_tax_returns.parquet")).await;
    let mut rows: Vec<_> = facts.views().collect();
    rows.sort_by_key(|r| r.int("version"));
    assert_eq!(rows.len(), 2);

    let amended_at = tf_core::parse::parse_timestamp("2024-04-15").unwrap();
    assert_eq!(rows[0].int("version"), Some(1));
    assert_eq!(rows[0].bool("is_current"), Some(false));
    assert_eq!(rows[0].timestamp("effective_end"), Some(amended_at));
    assert_eq!(rows[1].int("version"), Some(2));
    assert_eq!(rows[1].bool("is_current"), Some(true));
    assert_eq!(rows[1].float("tax_payable"), Some(3600.0));
    assert_eq!(rows[1].timestamp("effective_start"), Some(amended_at));

    let mart = read(&project.out("datamart/datamart_tax_returns.parquet")).await;
    assert_eq!(mart.len(), 1);
    assert_eq!(mart.views().next().unwrap().float("tax_payable"), Some(3600.0));
}

#[tokio::test]
async fn test_watermark_holds_back_older_extracts_until_backfill() {
    let project = Project::incremental(true);
    project.write_extract("a_2023.csv", &[TAN]);
    run_at(project.path(), "run_1", 1, &[]);

    let late = LIM
        .replace(",2023,", ",2022,")
        .replace("2024-04-02", "2023-04-02");
    project.write_extract("b_2022.csv", &[&late]);
    let stdout = run_at(project.path(), "run_2", 2, &[]);
    assert!(stdout.contains("1 held back by watermark"), "stdout:\n{}", stdout);

    let state = project.state();
    assert_eq!(state.processed_files.len(), 1);
    assert_eq!(state.last_watermark_value, Some(2023));
    let facts = read(&project.out("curated/fact_tax_returns.parquet")).await;
    assert_eq!(facts.len(), 1);

    run_at(project.path(), "run_3", 3, &["--allow-backfill"]);
    let state = project.state();
    assert_eq!(state.processed_files.len(), 2);
    assert_eq!(state.last_watermark_value, Some(2023));
    let facts = read(&project.out("curated/fact_tax_returns.parquet")).await;
    assert_eq!(facts.len(), 2);
}

#[test]
fn test_archive_moves_completed_extracts() {
    let project = Project::new(
        "input_path: input\noutput_dir: out\nsource_name: returns\narchive_dir: archive\n",
    );
    project.write_extract("returns.csv", &[TAN]);
    run_at(project.path(), "run_1", 1, &[]);

    assert!(!project.path().join("input/returns.csv").exists());
    assert!(project
        .path()
        .join("archive/returns/2024/06/01/run_1/returns.csv")
        .exists());
}

#[test]
fn test_validate_writes_nothing() {
    let project = Project::incremental(true);
    project.write_extract("returns.csv", &[TAN, BAD_NRIC]);

    let (stdout, stderr, ok) = run_tf(project.path(), &["validate", "--output", "json"]);
    assert!(ok, "validate failed: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["total_rows"], 2);
    assert_eq!(report["quarantined_rows"], 1);
    assert!(!project.path().join("out").exists());
}

#[test]
fn test_validate_strict_fails_on_quarantine() {
    let project = Project::incremental(false);
    project.write_extract("returns.csv", &[TAN, BAD_NRIC]);
    let (_, _, ok) = run_tf(project.path(), &["validate", "--strict"]);
    assert!(!ok);

    project.write_extract("returns.csv", &[TAN]);
    let (stdout, _, ok) = run_tf(project.path(), &["validate", "--strict"]);
    assert!(ok, "stdout:\n{}", stdout);
}

#[test]
fn test_ledger_json_lists_recorded_files() {
    let project = Project::incremental(true);
    project.write_extract("returns.csv", &[TAN]);
    run_at(project.path(), "run_1", 1, &[]);

    let (stdout, stderr, ok) = run_tf(project.path(), &["ledger", "--output", "json"]);
    assert!(ok, "ledger failed: {}", stderr);
    let ledger: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(ledger["enabled"], true);
    assert_eq!(ledger["last_watermark_value"], 2023);
    assert_eq!(ledger["files"][0]["file_name"], "returns.csv");
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, ok) = run_tf(dir.path(), &["run"]);
    assert!(!ok);
    assert!(stderr.contains("Error:"), "stderr:\n{}", stderr);
}
