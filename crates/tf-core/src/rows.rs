//! Typed tax-return rows cleaned from raw extract tables.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::{SOURCE_FILE_COLUMN, SOURCE_FILE_ID_COLUMN};
use crate::parse::clean_text;
use crate::table::{Column, ColumnType, RowView, Table, TableRecord, Value};

/// One cleaned tax-return row.
///
/// Every field is optional: blank or unparsable cells become `None` and are
/// judged by the quality rules rather than rejected here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxRow {
    pub source_file: Option<String>,
    pub source_file_id: Option<String>,
    pub nric: Option<String>,
    pub full_name: Option<String>,
    pub filing_status: Option<String>,
    pub residential_status: Option<String>,
    pub number_of_dependents: Option<i64>,
    pub occupation: Option<String>,
    pub postal_code: Option<String>,
    pub housing_type: Option<String>,
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

impl TaxRow {
    /// Clean every row of a raw extract table
    pub fn from_table(table: &Table) -> Vec<TaxRow> {
        table.to_records()
    }
}

fn text(row: &RowView<'_>, name: &str) -> Option<String> {
    clean_text(row.text(name).as_deref())
}

impl TableRecord for TaxRow {
    fn schema() -> Vec<Column> {
        vec![
            Column::new(SOURCE_FILE_COLUMN, ColumnType::Text),
            Column::new(SOURCE_FILE_ID_COLUMN, ColumnType::Text),
            Column::new("nric", ColumnType::Text),
            Column::new("full_name", ColumnType::Text),
            Column::new("filing_status", ColumnType::Text),
            Column::new("residential_status", ColumnType::Text),
            Column::new("number_of_dependents", ColumnType::Int),
            Column::new("occupation", ColumnType::Text),
            Column::new("postal_code", ColumnType::Text),
            Column::new("housing_type", ColumnType::Text),
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
            Value::from(self.source_file.clone()),
            Value::from(self.source_file_id.clone()),
            Value::from(self.nric.clone()),
            Value::from(self.full_name.clone()),
            Value::from(self.filing_status.clone()),
            Value::from(self.residential_status.clone()),
            Value::from(self.number_of_dependents),
            Value::from(self.occupation.clone()),
            Value::from(self.postal_code.clone()),
            Value::from(self.housing_type.clone()),
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
            source_file: text(&row, SOURCE_FILE_COLUMN),
            source_file_id: text(&row, SOURCE_FILE_ID_COLUMN),
            nric: text(&row, "nric"),
            full_name: text(&row, "full_name"),
            filing_status: text(&row, "filing_status"),
            residential_status: text(&row, "residential_status"),
            number_of_dependents: row.int("number_of_dependents"),
            occupation: text(&row, "occupation"),
            postal_code: text(&row, "postal_code"),
            housing_type: text(&row, "housing_type"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cleaning_coerces_and_nulls() {
        let mut table = Table::new(vec![
            Column::new("nric", ColumnType::Text),
            Column::new("postal_code", ColumnType::Text),
            Column::new("annual_income", ColumnType::Text),
            Column::new("assessment_year", ColumnType::Text),
            Column::new("filing_date", ColumnType::Text),
        ]);
        table.push_row(vec![
            Value::from(Some(" S1234567A ")),
            Value::from(Some("012345")),
            Value::from(Some("abc")),
            Value::from(Some("2023")),
            Value::from(Some("2024-03-15")),
        ]);

        let rows = TaxRow::from_table(&table);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.nric.as_deref(), Some("S1234567A"));
        assert_eq!(row.postal_code.as_deref(), Some("012345"));
        assert_eq!(row.annual_income, None);
        assert_eq!(row.assessment_year, Some(2023));
        assert_eq!(
            row.filing_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(row.full_name, None);
    }

    #[test]
    fn test_typed_table_round_trip_keeps_types() {
        let row = TaxRow {
            nric: Some("S1234567A".into()),
            annual_income: Some(100.5),
            assessment_year: Some(2023),
            ..Default::default()
        };
        let table = Table::from_records([&row]);
        assert_eq!(table.to_records::<TaxRow>(), vec![row]);
    }
}
