use super::*;
use std::collections::BTreeMap;

fn sample() -> Table {
    let mut table = Table::new(vec![
        Column::new("nric", ColumnType::Text),
        Column::new("income", ColumnType::Text),
    ]);
    table.push_row(vec![Value::from(Some("S1234567A")), Value::from(Some("100"))]);
    table.push_row(vec![Value::from(Some("T7654321Z"))]);
    table
}

#[test]
fn test_push_row_pads_missing_values() {
    let table = sample();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows()[1][1], Value::Null);
}

#[test]
fn test_row_view_coerces_text() {
    let table = sample();
    let first = table.views().next().unwrap();
    assert_eq!(first.text("nric").as_deref(), Some("S1234567A"));
    assert_eq!(first.float("income"), Some(100.0));
    assert_eq!(first.int("income"), Some(100));
    assert_eq!(first.text("missing_column"), None);
}

#[test]
fn test_rename_columns() {
    let mut table = sample();
    let mut map = BTreeMap::new();
    map.insert("income".to_string(), "annual_income".to_string());
    table.rename_columns(&map);
    assert_eq!(table.column_names(), vec!["nric", "annual_income"]);
}

#[test]
fn test_add_column_fills_rows() {
    let mut table = sample();
    table.add_column(
        Column::new("source_file", ColumnType::Text),
        Value::Text("a.csv".to_string()),
    );
    assert!(table
        .views()
        .all(|row| row.text("source_file").as_deref() == Some("a.csv")));
}

#[test]
fn test_retain_rows() {
    let mut table = sample();
    table.retain_rows(|row| row.float("income").is_some());
    assert_eq!(table.len(), 1);
}

#[test]
fn test_concat_aligns_by_name() {
    let mut left = sample();
    let mut right = Table::new(vec![
        Column::new("income", ColumnType::Text),
        Column::new("extra", ColumnType::Text),
    ]);
    right.push_row(vec![Value::from(Some("5")), Value::from(Some("x"))]);

    left.concat(right);

    assert_eq!(left.column_names(), vec!["nric", "income", "extra"]);
    assert_eq!(left.len(), 3);
    let last = left.views().last().unwrap();
    assert_eq!(last.text("nric"), None);
    assert_eq!(last.text("income").as_deref(), Some("5"));
    assert_eq!(last.text("extra").as_deref(), Some("x"));
}

#[test]
fn test_column_type_from_sql() {
    assert_eq!(ColumnType::from_sql_type("UBIGINT"), ColumnType::UInt);
    assert_eq!(ColumnType::from_sql_type("timestamp with time zone"), ColumnType::Timestamp);
    assert_eq!(ColumnType::from_sql_type("DECIMAL(18,2)"), ColumnType::Float);
    assert_eq!(ColumnType::from_sql_type("VARCHAR"), ColumnType::Text);
}
