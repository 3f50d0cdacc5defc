//! Dimension and fact records of the curated layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tf_core::table::{Column, ColumnType, RowView, TableRecord, Value};

use crate::geo::Region;
use crate::scd2::{DedupeKey, DedupeValue, Mergeable, Timeline};

/// Row of `dim_geo`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoRecord {
    pub geo_id: Option<u64>,
    pub postal_code: Option<String>,
    pub region: Region,
}

impl TableRecord for GeoRecord {
    fn schema() -> Vec<Column> {
        vec![
            Column::new("geo_id", ColumnType::UInt),
            Column::new("postal_code", ColumnType::Text),
            Column::new("region", ColumnType::Text),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.geo_id),
            Value::from(self.postal_code.clone()),
            Value::Text(self.region.to_string()),
        ]
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            geo_id: row.uint("geo_id"),
            postal_code: row.text("postal_code"),
            region: row
                .text("region")
                .map_or(Region::Unknown, |r| Region::parse(&r)),
        }
    }
}

impl Mergeable for GeoRecord {
    const TIMELINE: Timeline = Timeline::Observed;

    fn business_key(&self) -> Option<u64> {
        self.geo_id
    }

    fn dedupe_key(&self) -> DedupeKey {
        vec![
            DedupeValue::from(self.geo_id),
            DedupeValue::from(self.postal_code.as_deref()),
            DedupeValue::from(Some(self.region.as_str())),
        ]
    }
}

/// Row of `dim_taxpayer`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxpayerRecord {
    pub taxpayer_id: Option<u64>,
    pub nric: Option<String>,
    pub full_name: Option<String>,
    pub filing_status: Option<String>,
    pub residential_status: Option<String>,
    pub number_of_dependents: Option<i64>,
    pub occupation: Option<String>,
    pub postal_code: Option<String>,
    pub housing_type: Option<String>,
    pub geo_id: Option<u64>,
}

impl TableRecord for TaxpayerRecord {
    fn schema() -> Vec<Column> {
        vec![
            Column::new("taxpayer_id", ColumnType::UInt),
            Column::new("nric", ColumnType::Text),
            Column::new("full_name", ColumnType::Text),
            Column::new("filing_status", ColumnType::Text),
            Column::new("residential_status", ColumnType::Text),
            Column::new("number_of_dependents", ColumnType::Int),
            Column::new("occupation", ColumnType::Text),
            Column::new("postal_code", ColumnType::Text),
            Column::new("housing_type", ColumnType::Text),
            Column::new("geo_id", ColumnType::UInt),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.taxpayer_id),
            Value::from(self.nric.clone()),
            Value::from(self.full_name.clone()),
            Value::from(self.filing_status.clone()),
            Value::from(self.residential_status.clone()),
            Value::from(self.number_of_dependents),
            Value::from(self.occupation.clone()),
            Value::from(self.postal_code.clone()),
            Value::from(self.housing_type.clone()),
            Value::from(self.geo_id),
        ]
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            taxpayer_id: row.uint("taxpayer_id"),
            nric: row.text("nric"),
            full_name: row.text("full_name"),
            filing_status: row.text("filing_status"),
            residential_status: row.text("residential_status"),
            number_of_dependents: row.int("number_of_dependents"),
            occupation: row.text("occupation"),
            postal_code: row.text("postal_code"),
            housing_type: row.text("housing_type"),
            geo_id: row.uint("geo_id"),
        }
    }
}

impl Mergeable for TaxpayerRecord {
    const TIMELINE: Timeline = Timeline::Observed;

    fn business_key(&self) -> Option<u64> {
        self.taxpayer_id
    }

    fn dedupe_key(&self) -> DedupeKey {
        vec![
            DedupeValue::from(self.nric.as_deref()),
            DedupeValue::from(self.full_name.as_deref()),
            DedupeValue::from(self.filing_status.as_deref()),
            DedupeValue::from(self.residential_status.as_deref()),
            DedupeValue::from(self.number_of_dependents),
            DedupeValue::from(self.occupation.as_deref()),
            DedupeValue::from(self.postal_code.as_deref()),
            DedupeValue::from(self.housing_type.as_deref()),
            DedupeValue::from(self.geo_id),
        ]
    }
}

/// Row of `fact_tax_returns`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxReturnRecord {
    pub return_key: Option<u64>,
    pub taxpayer_id: Option<u64>,
    pub assessment_year: Option<i64>,
    pub filing_date: Option<DateTime<Utc>>,
    pub annual_income: Option<f64>,
    pub total_reliefs: Option<f64>,
    pub chargeable_income: Option<f64>,
    pub cpf_contribution: Option<f64>,
    pub foreign_income: Option<f64>,
    pub tax_payable: Option<f64>,
    pub tax_paid: Option<f64>,
}

impl TableRecord for TaxReturnRecord {
    fn schema() -> Vec<Column> {
        vec![
            Column::new("return_key", ColumnType::UInt),
            Column::new("taxpayer_id", ColumnType::UInt),
            Column::new("assessment_year", ColumnType::Int),
            Column::new("filing_date", ColumnType::Timestamp),
            Column::new("annual_income", ColumnType::Float),
            Column::new("total_reliefs", ColumnType::Float),
            Column::new("chargeable_income", ColumnType::Float),
            Column::new("cpf_contribution", ColumnType::Float),
            Column::new("foreign_income", ColumnType::Float),
            Column::new("tax_payable", ColumnType::Float),
            Column::new("tax_paid", ColumnType::Float),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.return_key),
            Value::from(self.taxpayer_id),
            Value::from(self.assessment_year),
            Value::from(self.filing_date),
            Value::from(self.annual_income),
            Value::from(self.total_reliefs),
            Value::from(self.chargeable_income),
            Value::from(self.cpf_contribution),
            Value::from(self.foreign_income),
            Value::from(self.tax_payable),
            Value::from(self.tax_paid),
        ]
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            return_key: row.uint("return_key"),
            taxpayer_id: row.uint("taxpayer_id"),
            assessment_year: row.int("assessment_year"),
            filing_date: row.timestamp("filing_date"),
            annual_income: row.float("annual_income"),
            total_reliefs: row.float("total_reliefs"),
            chargeable_income: row.float("chargeable_income"),
            cpf_contribution: row.float("cpf_contribution"),
            foreign_income: row.float("foreign_income"),
            tax_payable: row.float("tax_payable"),
            tax_paid: row.float("tax_paid"),
        }
    }
}

impl Mergeable for TaxReturnRecord {
    const TIMELINE: Timeline = Timeline::EventTime;

    fn business_key(&self) -> Option<u64> {
        self.return_key
    }

    fn dedupe_key(&self) -> DedupeKey {
        vec![
            DedupeValue::from(self.return_key),
            DedupeValue::from(self.taxpayer_id),
            DedupeValue::from(self.assessment_year),
            DedupeValue::from(self.filing_date),
            DedupeValue::from(self.annual_income),
            DedupeValue::from(self.total_reliefs),
            DedupeValue::from(self.chargeable_income),
            DedupeValue::from(self.cpf_contribution),
            DedupeValue::from(self.foreign_income),
            DedupeValue::from(self.tax_payable),
            DedupeValue::from(self.tax_paid),
        ]
    }

    fn event_time(&self) -> Option<DateTime<Utc>> {
        self.filing_date
    }
}
