//! Builds dimension and fact batches, with surrogate keys, from valid rows.

use std::collections::HashSet;

use tf_core::keys::{self, GEO_NAMESPACE, TAXPAYER_NAMESPACE};
use tf_core::{RunContext, TaxRow};

use crate::geo::{postal_region, Region};
use crate::model::{GeoRecord, TaxReturnRecord, TaxpayerRecord};
use crate::scd2::{DedupeKey, Mergeable, Stamped};

/// One run's new dimension and fact rows, stamped with the run's lineage
#[derive(Debug, Clone, Default)]
pub struct DimensionalBatch {
    pub geo: Vec<Stamped<GeoRecord>>,
    pub taxpayers: Vec<Stamped<TaxpayerRecord>>,
    pub returns: Vec<Stamped<TaxReturnRecord>>,
}

impl DimensionalBatch {
    /// Distinct geo and taxpayer states plus one fact per row
    pub fn build<'a, I>(rows: I, run: &RunContext) -> Self
    where
        I: IntoIterator<Item = &'a TaxRow>,
    {
        let mut geo = Distinct::default();
        let mut taxpayers = Distinct::default();
        let mut returns = Vec::new();

        for row in rows {
            geo.push(geo_record(row), run);
            taxpayers.push(taxpayer_record(row), run);
            returns.push(Stamped::new(tax_return_record(row), run));
        }

        let batch = Self {
            geo: geo.rows,
            taxpayers: taxpayers.rows,
            returns,
        };
        log::info!(
            "Built {} geo, {} taxpayer and {} tax return row(s)",
            batch.geo.len(),
            batch.taxpayers.len(),
            batch.returns.len()
        );
        batch
    }
}

/// First occurrence of each dedupe tuple, in input order
struct Distinct<T> {
    seen: HashSet<DedupeKey>,
    rows: Vec<Stamped<T>>,
}

impl<T> Default for Distinct<T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            rows: Vec::new(),
        }
    }
}

impl<T: Mergeable> Distinct<T> {
    fn push(&mut self, record: T, run: &RunContext) {
        if self.seen.insert(record.dedupe_key()) {
            self.rows.push(Stamped::new(record, run));
        }
    }
}

fn geo_id(postal_code: Option<&str>) -> Option<u64> {
    keys::stable_id(postal_code?, GEO_NAMESPACE)
}

fn taxpayer_id(nric: Option<&str>) -> Option<u64> {
    keys::stable_id(nric?, TAXPAYER_NAMESPACE)
}

pub fn geo_record(row: &TaxRow) -> GeoRecord {
    let postal_code = row.postal_code.as_deref();
    GeoRecord {
        geo_id: geo_id(postal_code),
        postal_code: row.postal_code.clone(),
        region: postal_code.map_or(Region::Unknown, postal_region),
    }
}

pub fn taxpayer_record(row: &TaxRow) -> TaxpayerRecord {
    TaxpayerRecord {
        taxpayer_id: taxpayer_id(row.nric.as_deref()),
        nric: row.nric.clone(),
        full_name: row.full_name.clone(),
        filing_status: row.filing_status.clone(),
        residential_status: row.residential_status.clone(),
        number_of_dependents: row.number_of_dependents,
        occupation: row.occupation.clone(),
        postal_code: row.postal_code.clone(),
        housing_type: row.housing_type.clone(),
        geo_id: geo_id(row.postal_code.as_deref()),
    }
}

pub fn tax_return_record(row: &TaxRow) -> TaxReturnRecord {
    let nric = row.nric.as_deref();
    TaxReturnRecord {
        return_key: nric.and_then(|n| keys::return_key(n, row.assessment_year)),
        taxpayer_id: taxpayer_id(nric),
        assessment_year: row.assessment_year,
        filing_date: row.filing_date,
        annual_income: row.annual_income,
        total_reliefs: row.total_reliefs,
        chargeable_income: row.chargeable_income,
        cpf_contribution: row.cpf_contribution,
        foreign_income: row.foreign_income,
        tax_payable: row.tax_payable,
        tax_paid: row.tax_paid,
    }
}
