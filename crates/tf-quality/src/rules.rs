//! Row-level quality rules grouped by data-quality domain.
//!
//! The rule set is fixed. Each rule is a pure predicate over one
//! [`TaxRow`]; a missing or unparsable input always fails the rule.

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tf_core::{QualityConfig, TaxRow};

/// Data-quality domain a rule contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Completeness,
    Validity,
    Accuracy,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Completeness, Domain::Validity, Domain::Accuracy];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Completeness => "completeness",
            Domain::Validity => "validity",
            Domain::Accuracy => "accuracy",
        }
    }

    /// Column holding the per-row domain verdict
    pub fn pass_column(self) -> &'static str {
        match self {
            Domain::Completeness => "dq_completeness_pass",
            Domain::Validity => "dq_validity_pass",
            Domain::Accuracy => "dq_accuracy_pass",
        }
    }

    /// Rules belonging to this domain
    pub fn rules(self) -> impl Iterator<Item = Rule> {
        Rule::ALL.into_iter().filter(move |rule| rule.domain() == self)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single quality rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Rule {
    /// NRIC is one of `S`, `T`, `F`, `G`, then 7 digits, then a letter
    NricFormat,
    /// Postal code is exactly 6 digits
    PostalCode,
    /// Filing date is later than midnight on 31 December of the assessment year
    FilingAfterAssessment,
    /// `annual_income - total_reliefs` matches `chargeable_income`
    ChargeableIncome,
    /// Residents contribute CPF; non-residents are unconstrained
    CpfResidency,
}

impl Rule {
    pub const COUNT: usize = 5;

    /// Every rule, in report order
    pub const ALL: [Rule; Rule::COUNT] = [
        Rule::NricFormat,
        Rule::PostalCode,
        Rule::FilingAfterAssessment,
        Rule::ChargeableIncome,
        Rule::CpfResidency,
    ];

    /// Position in [`Rule::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column and report name of the rule
    pub fn name(self) -> &'static str {
        match self {
            Rule::NricFormat => "rule_nric_format",
            Rule::PostalCode => "rule_postal_code",
            Rule::FilingAfterAssessment => "rule_filing_date_after_assessment",
            Rule::ChargeableIncome => "rule_chargeable_income",
            Rule::CpfResidency => "rule_cpf_residency",
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            Rule::NricFormat => Domain::Completeness,
            Rule::PostalCode => Domain::Validity,
            Rule::FilingAfterAssessment | Rule::ChargeableIncome | Rule::CpfResidency => {
                Domain::Accuracy
            }
        }
    }

    /// Evaluate the rule against one row
    pub fn evaluate(self, row: &TaxRow, settings: &RuleSettings) -> bool {
        match self {
            Rule::NricFormat => row.nric.as_deref().is_some_and(is_valid_nric),
            Rule::PostalCode => row.postal_code.as_deref().is_some_and(is_valid_postal_code),
            Rule::FilingAfterAssessment => filed_after_assessment(row),
            Rule::ChargeableIncome => chargeable_income_matches(row, settings.income_tolerance),
            Rule::CpfResidency => cpf_matches_residency(row),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables consumed by the rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleSettings {
    pub income_tolerance: f64,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self::from(&QualityConfig::default())
    }
}

impl From<&QualityConfig> for RuleSettings {
    fn from(config: &QualityConfig) -> Self {
        Self {
            income_tolerance: config.income_tolerance,
        }
    }
}

static NRIC_RE: OnceLock<Regex> = OnceLock::new();
static POSTAL_RE: OnceLock<Regex> = OnceLock::new();

fn nric_regex() -> &'static Regex {
    NRIC_RE.get_or_init(|| Regex::new(r"^[STFG]\d{7}[A-Z]$").expect("valid regex literal"))
}

fn postal_regex() -> &'static Regex {
    POSTAL_RE.get_or_init(|| Regex::new(r"^\d{6}$").expect("valid regex literal"))
}

pub fn is_valid_nric(value: &str) -> bool {
    nric_regex().is_match(value)
}

pub fn is_valid_postal_code(value: &str) -> bool {
    postal_regex().is_match(value)
}

fn filed_after_assessment(row: &TaxRow) -> bool {
    let (Some(filed), Some(year)) = (row.filing_date, row.assessment_year) else {
        return false;
    };
    let Some(cutoff) = i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, 12, 31))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return false;
    };
    filed > cutoff.and_utc()
}

fn chargeable_income_matches(row: &TaxRow, tolerance: f64) -> bool {
    match (row.annual_income, row.total_reliefs, row.chargeable_income) {
        (Some(income), Some(reliefs), Some(chargeable)) => {
            ((income - reliefs) - chargeable).abs() <= tolerance
        }
        _ => false,
    }
}

fn cpf_matches_residency(row: &TaxRow) -> bool {
    let Some(status) = row.residential_status.as_deref() else {
        return false;
    };
    match status.to_ascii_lowercase().as_str() {
        "resident" => row.cpf_contribution.unwrap_or(0.0) > 0.0,
        "non-resident" | "nonresident" => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "rules_test.rs"]
mod tests;
