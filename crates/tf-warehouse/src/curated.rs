//! The three curated tables, merged together as one unit.

use tf_core::{RunContext, Table};

use crate::model::{GeoRecord, TaxReturnRecord, TaxpayerRecord};
use crate::scd2::{merge, Versioned};
use crate::transform::DimensionalBatch;

pub const DIM_GEO: &str = "dim_geo";
pub const DIM_TAXPAYER: &str = "dim_taxpayer";
pub const FACT_TAX_RETURNS: &str = "fact_tax_returns";

/// Full history of every curated table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CuratedTables {
    pub geo: Vec<Versioned<GeoRecord>>,
    pub taxpayers: Vec<Versioned<TaxpayerRecord>>,
    pub returns: Vec<Versioned<TaxReturnRecord>>,
}

impl CuratedTables {
    /// Rebuild from stored tables; a missing table is an empty history
    pub fn from_tables(
        geo: Option<&Table>,
        taxpayers: Option<&Table>,
        returns: Option<&Table>,
    ) -> Self {
        Self {
            geo: geo.map(Table::to_records).unwrap_or_default(),
            taxpayers: taxpayers.map(Table::to_records).unwrap_or_default(),
            returns: returns.map(Table::to_records).unwrap_or_default(),
        }
    }

    /// Fold one run's batch into every table
    pub fn apply(&self, batch: &DimensionalBatch, run: &RunContext) -> Self {
        let merged = Self {
            geo: merge(&self.geo, &batch.geo, run),
            taxpayers: merge(&self.taxpayers, &batch.taxpayers, run),
            returns: merge(&self.returns, &batch.returns, run),
        };
        log::info!(
            "Curated tables now hold {} geo, {} taxpayer and {} tax return version(s)",
            merged.geo.len(),
            merged.taxpayers.len(),
            merged.returns.len()
        );
        merged
    }

    /// Named tables in write order
    pub fn to_tables(&self) -> Vec<(&'static str, Table)> {
        vec![
            (DIM_GEO, Table::from_records(&self.geo)),
            (DIM_TAXPAYER, Table::from_records(&self.taxpayers)),
            (FACT_TAX_RETURNS, Table::from_records(&self.returns)),
        ]
    }
}
