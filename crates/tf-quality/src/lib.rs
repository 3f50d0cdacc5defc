//! tf-quality - Quality rule engine for taxflow
//!
//! Evaluates the fixed rule set over cleaned rows, splits each batch into
//! valid and quarantined rows, scores the quality domains, and builds the
//! quarantine and run reports.

pub mod engine;
pub mod report;
pub mod rules;

pub use engine::{DomainScore, QualityEngine, RuleOutcomes, ValidatedRow, Validation};
pub use report::{
    domain_metrics_table, quality_results_table, QuarantineReport, QuarantineSample,
    RuleBreakdown, RunSummary,
};
pub use rules::{Domain, Rule, RuleSettings};
