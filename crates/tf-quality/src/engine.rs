//! Applies the rule set to a batch and splits it into valid and quarantined rows.

use serde::Serialize;
use tf_core::table::{Column, ColumnType, RowView, TableRecord, Value};
use tf_core::{QualityConfig, TaxRow};

use crate::rules::{Domain, Rule, RuleSettings};

/// Per-rule outcomes for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuleOutcomes([bool; Rule::COUNT]);

impl RuleOutcomes {
    /// Evaluate every rule against `row`
    pub fn evaluate(row: &TaxRow, settings: &RuleSettings) -> Self {
        let mut passed = [false; Rule::COUNT];
        for rule in Rule::ALL {
            passed[rule.index()] = rule.evaluate(row, settings);
        }
        Self(passed)
    }

    pub fn passed(&self, rule: Rule) -> bool {
        self.0[rule.index()]
    }

    /// AND of the domain's rule outcomes
    pub fn domain_passed(&self, domain: Domain) -> bool {
        domain.rules().all(|rule| self.passed(rule))
    }

    /// AND of every domain
    pub fn all_passed(&self) -> bool {
        Domain::ALL.iter().all(|d| self.domain_passed(*d))
    }

    /// Rules that failed, in report order
    pub fn failed_rules(&self) -> impl Iterator<Item = Rule> + '_ {
        Rule::ALL.into_iter().filter(|rule| !self.passed(*rule))
    }
}

/// A cleaned row with its run-local id and rule outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    /// 1-based position in this run's batch; not a stable key
    pub row_id: u64,
    pub row: TaxRow,
    pub outcomes: RuleOutcomes,
}

impl ValidatedRow {
    pub fn is_valid(&self) -> bool {
        self.outcomes.all_passed()
    }
}

impl TableRecord for ValidatedRow {
    fn schema() -> Vec<Column> {
        let mut columns = vec![Column::new("row_id", ColumnType::UInt)];
        columns.extend(TaxRow::schema());
        columns.extend(Rule::ALL.iter().map(|r| Column::new(r.name(), ColumnType::Bool)));
        columns.extend(
            Domain::ALL
                .iter()
                .map(|d| Column::new(d.pass_column(), ColumnType::Bool)),
        );
        columns
    }

    fn to_values(&self) -> Vec<Value> {
        let mut values = vec![Value::UInt(self.row_id)];
        values.extend(self.row.to_values());
        values.extend(Rule::ALL.iter().map(|r| Value::Bool(self.outcomes.passed(*r))));
        values.extend(
            Domain::ALL
                .iter()
                .map(|d| Value::Bool(self.outcomes.domain_passed(*d))),
        );
        values
    }

    fn from_view(row: RowView<'_>) -> Self {
        let mut passed = [false; Rule::COUNT];
        for rule in Rule::ALL {
            passed[rule.index()] = row.bool(rule.name()).unwrap_or(false);
        }
        Self {
            row_id: row.uint("row_id").unwrap_or_default(),
            row: TaxRow::from_view(row),
            outcomes: RuleOutcomes(passed),
        }
    }
}

/// Pass rate of one domain over a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainScore {
    pub domain: Domain,
    pub passing_rows: u64,
    pub total_rows: u64,
    pub score_pct: f64,
}

impl DomainScore {
    fn compute(domain: Domain, rows: &[ValidatedRow]) -> Self {
        let total_rows = rows.len() as u64;
        let passing_rows = rows
            .iter()
            .filter(|r| r.outcomes.domain_passed(domain))
            .count() as u64;
        let score_pct = if total_rows == 0 {
            0.0
        } else {
            round2(passing_rows as f64 / total_rows as f64 * 100.0)
        };
        Self {
            domain,
            passing_rows,
            total_rows,
            score_pct,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Outcome of validating one batch
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub rows: Vec<ValidatedRow>,
    pub scores: Vec<DomainScore>,
}

impl Validation {
    /// Rows passing every rule
    pub fn valid(&self) -> impl Iterator<Item = &ValidatedRow> {
        self.rows.iter().filter(|r| r.is_valid())
    }

    /// Rows failing at least one rule
    pub fn quarantined(&self) -> impl Iterator<Item = &ValidatedRow> {
        self.rows.iter().filter(|r| !r.is_valid())
    }

    pub fn valid_count(&self) -> usize {
        self.valid().count()
    }

    pub fn quarantined_count(&self) -> usize {
        self.quarantined().count()
    }
}

/// Quality rule engine
#[derive(Debug, Clone, Default)]
pub struct QualityEngine {
    settings: RuleSettings,
}

impl QualityEngine {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            settings: RuleSettings::from(config),
        }
    }

    pub fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    /// Number the rows 1..N, evaluate every rule, and score each domain
    pub fn validate(&self, rows: Vec<TaxRow>) -> Validation {
        let rows: Vec<ValidatedRow> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let outcomes = RuleOutcomes::evaluate(&row, &self.settings);
                ValidatedRow {
                    row_id: i as u64 + 1,
                    row,
                    outcomes,
                }
            })
            .collect();
        let scores = Domain::ALL
            .iter()
            .map(|domain| DomainScore::compute(*domain, &rows))
            .collect();

        let validation = Validation { rows, scores };
        log::info!(
            "Validated {} row(s): {} valid, {} quarantined",
            validation.rows.len(),
            validation.valid_count(),
            validation.quarantined_count()
        );
        validation
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
