//! Quality reporting: quarantine breakdown and samples, run summary, and
//! the tables persisted alongside the curated layer.
//!
//! Everything here is a pure aggregation over a [`Validation`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tf_core::table::{Column, ColumnType, RowView, Table, TableRecord, Value};
use tf_core::RunContext;

use crate::engine::{DomainScore, ValidatedRow, Validation};
use crate::rules::{Domain, Rule};

/// Failing-row count for one rule within the quarantine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleBreakdown {
    pub rule: String,
    pub invalid_count: u64,
}

/// A quarantined row kept for triage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarantineSample {
    pub rule: String,
    pub sample_row_id: u64,
    pub nric: Option<String>,
    pub postal_code: Option<String>,
    pub filing_date: Option<DateTime<Utc>>,
}

/// Per-rule breakdown and samples of the quarantined rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuarantineReport {
    /// Sorted by `invalid_count`, highest first
    pub breakdown: Vec<RuleBreakdown>,
    pub samples: Vec<QuarantineSample>,
}

impl QuarantineReport {
    /// Count failures per rule and keep up to `sample_size` rows for each.
    ///
    /// An empty quarantine yields an empty report.
    pub fn build<'a, I>(quarantined: I, sample_size: usize) -> Self
    where
        I: IntoIterator<Item = &'a ValidatedRow>,
    {
        let quarantined: Vec<&ValidatedRow> = quarantined.into_iter().collect();
        if quarantined.is_empty() {
            return Self::default();
        }

        let mut breakdown = Vec::with_capacity(Rule::COUNT);
        let mut samples = Vec::new();
        for rule in Rule::ALL {
            let failing: Vec<&&ValidatedRow> = quarantined
                .iter()
                .filter(|r| !r.outcomes.passed(rule))
                .collect();
            breakdown.push(RuleBreakdown {
                rule: rule.name().to_string(),
                invalid_count: failing.len() as u64,
            });
            samples.extend(failing.iter().take(sample_size).map(|r| QuarantineSample {
                rule: rule.name().to_string(),
                sample_row_id: r.row_id,
                nric: r.row.nric.clone(),
                postal_code: r.row.postal_code.clone(),
                filing_date: r.row.filing_date,
            }));
        }
        breakdown.sort_by(|a, b| b.invalid_count.cmp(&a.invalid_count));

        Self { breakdown, samples }
    }
}

impl TableRecord for RuleBreakdown {
    fn schema() -> Vec<Column> {
        vec![
            Column::new("rule", ColumnType::Text),
            Column::new("invalid_count", ColumnType::UInt),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.rule.clone()), Value::UInt(self.invalid_count)]
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            rule: row.text("rule").unwrap_or_default(),
            invalid_count: row.uint("invalid_count").unwrap_or_default(),
        }
    }
}

impl TableRecord for QuarantineSample {
    fn schema() -> Vec<Column> {
        vec![
            Column::new("rule", ColumnType::Text),
            Column::new("sample_row_id", ColumnType::UInt),
            Column::new("nric", ColumnType::Text),
            Column::new("postal_code", ColumnType::Text),
            Column::new("filing_date", ColumnType::Timestamp),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.rule.clone()),
            Value::UInt(self.sample_row_id),
            Value::from(self.nric.clone()),
            Value::from(self.postal_code.clone()),
            Value::from(self.filing_date),
        ]
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            rule: row.text("rule").unwrap_or_default(),
            sample_row_id: row.uint("sample_row_id").unwrap_or_default(),
            nric: row.text("nric"),
            postal_code: row.text("postal_code"),
            filing_date: row.timestamp("filing_date"),
        }
    }
}

/// Flat summary of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_timestamp: DateTime<Utc>,
    pub total_rows: u64,
    pub valid_rows: u64,
    pub quarantined_rows: u64,
    pub invalid_nric_count: u64,
    pub invalid_postal_count: u64,
    pub invalid_filing_date_count: u64,
    pub invalid_chargeable_income_count: u64,
    pub invalid_cpf_residency_count: u64,
    pub annual_income_total: f64,
    pub reliefs_total: f64,
    pub chargeable_income_total: f64,
    pub tax_payable_total: f64,
    pub tax_paid_total: f64,
    pub domain_scores: Vec<DomainScore>,
    pub quarantine_breakdown: Vec<RuleBreakdown>,
    pub quarantine_samples: Vec<QuarantineSample>,
}

impl RunSummary {
    /// Summarise a validated batch; monetary totals skip missing values
    pub fn build(validation: &Validation, quarantine: &QuarantineReport, run: &RunContext) -> Self {
        let rows = &validation.rows;
        let invalid = |rule: Rule| rows.iter().filter(|r| !r.outcomes.passed(rule)).count() as u64;
        let total = |field: fn(&ValidatedRow) -> Option<f64>| -> f64 {
            rows.iter().filter_map(field).sum()
        };

        Self {
            run_id: run.run_id.to_string(),
            run_timestamp: run.run_timestamp,
            total_rows: rows.len() as u64,
            valid_rows: validation.valid_count() as u64,
            quarantined_rows: validation.quarantined_count() as u64,
            invalid_nric_count: invalid(Rule::NricFormat),
            invalid_postal_count: invalid(Rule::PostalCode),
            invalid_filing_date_count: invalid(Rule::FilingAfterAssessment),
            invalid_chargeable_income_count: invalid(Rule::ChargeableIncome),
            invalid_cpf_residency_count: invalid(Rule::CpfResidency),
            annual_income_total: total(|r| r.row.annual_income),
            reliefs_total: total(|r| r.row.total_reliefs),
            chargeable_income_total: total(|r| r.row.chargeable_income),
            tax_payable_total: total(|r| r.row.tax_payable),
            tax_paid_total: total(|r| r.row.tax_paid),
            domain_scores: validation.scores.clone(),
            quarantine_breakdown: quarantine.breakdown.clone(),
            quarantine_samples: quarantine.samples.clone(),
        }
    }
}

fn lineage_columns() -> [Column; 3] {
    [
        Column::new("created_run_id", ColumnType::Text),
        Column::new("last_seen_run_id", ColumnType::Text),
        Column::new("run_timestamp", ColumnType::Timestamp),
    ]
}

fn lineage_values(run: &RunContext) -> [Value; 3] {
    [
        Value::Text(run.run_id.to_string()),
        Value::Text(run.run_id.to_string()),
        Value::Timestamp(run.run_timestamp),
    ]
}

/// Per-row rule outcomes stamped with the run
pub fn quality_results_table(validation: &Validation, run: &RunContext) -> Table {
    let mut columns = vec![Column::new("row_id", ColumnType::UInt)];
    columns.extend(Rule::ALL.iter().map(|r| Column::new(r.name(), ColumnType::Bool)));
    columns.extend(
        Domain::ALL
            .iter()
            .map(|d| Column::new(d.pass_column(), ColumnType::Bool)),
    );
    columns.extend(lineage_columns());

    let mut table = Table::new(columns);
    for row in &validation.rows {
        let mut values = vec![Value::UInt(row.row_id)];
        values.extend(Rule::ALL.iter().map(|r| Value::Bool(row.outcomes.passed(*r))));
        values.extend(
            Domain::ALL
                .iter()
                .map(|d| Value::Bool(row.outcomes.domain_passed(*d))),
        );
        values.extend(lineage_values(run));
        table.push_row(values);
    }
    table
}

/// Domain scores stamped with the run
pub fn domain_metrics_table(scores: &[DomainScore], run: &RunContext) -> Table {
    let mut columns = vec![
        Column::new("domain", ColumnType::Text),
        Column::new("passing_rows", ColumnType::UInt),
        Column::new("total_rows", ColumnType::UInt),
        Column::new("score_pct", ColumnType::Float),
    ];
    columns.extend(lineage_columns());

    let mut table = Table::new(columns);
    for score in scores {
        let mut values = vec![
            Value::Text(score.domain.to_string()),
            Value::UInt(score.passing_rows),
            Value::UInt(score.total_rows),
            Value::Float(score.score_pct),
        ];
        values.extend(lineage_values(run));
        table.push_row(values);
    }
    table
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;
