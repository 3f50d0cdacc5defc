//! tf-warehouse - Dimensional model and SCD2 history for taxflow
//!
//! Turns valid rows into geo and taxpayer dimensions plus tax return facts,
//! and merges each run's batch into the curated tables' versioned history.

pub mod curated;
pub mod geo;
pub mod model;
pub mod scd2;
pub mod transform;

pub use curated::{CuratedTables, DIM_GEO, DIM_TAXPAYER, FACT_TAX_RETURNS};
pub use geo::{postal_district, postal_region, Region};
pub use model::{GeoRecord, TaxReturnRecord, TaxpayerRecord};
pub use scd2::{merge, open_end, Lineage, Mergeable, Stamped, Timeline, Validity, Versioned};
pub use transform::DimensionalBatch;
