//! In-memory tables exchanged with the storage layer.
//!
//! A [`Table`] is a column schema plus rows of nullable [`Value`]s. Typed
//! records convert to and from tables through [`TableRecord`], so storage
//! never needs to know about the warehouse types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Logical column type, preserved across a storage round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Int,
    UInt,
    Float,
    Bool,
    Timestamp,
}

impl ColumnType {
    /// Storage type name used when materialising a table
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR",
            ColumnType::Int => "BIGINT",
            ColumnType::UInt => "UBIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Map a storage type name back to a logical column type
    pub fn from_sql_type(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "BIGINT" | "INTEGER" | "INT" | "SMALLINT" | "TINYINT" | "HUGEINT" => ColumnType::Int,
            "UBIGINT" | "UINTEGER" | "USMALLINT" | "UTINYINT" => ColumnType::UInt,
            "DOUBLE" | "FLOAT" | "REAL" => ColumnType::Float,
            "BOOLEAN" | "BOOL" => ColumnType::Bool,
            _ if upper.starts_with("DECIMAL") => ColumnType::Float,
            _ if upper.starts_with("TIMESTAMP") || upper == "DATE" => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }
}

/// A nullable cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map_or(Value::Null, Value::Text)
    }
}

impl From<Option<&str>> for Value {
    fn from(v: Option<&str>) -> Self {
        v.map_or(Value::Null, |s| Value::Text(s.to_string()))
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map_or(Value::Null, Value::Int)
    }
}

impl From<Option<u64>> for Value {
    fn from(v: Option<u64>) -> Self {
        v.map_or(Value::Null, Value::UInt)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Float)
    }
}

impl From<Option<bool>> for Value {
    fn from(v: Option<bool>) -> Self {
        v.map_or(Value::Null, Value::Bool)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map_or(Value::Null, Value::Timestamp)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Column name and logical type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A schema plus rows of values aligned with it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given schema
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from typed records
    pub fn from_records<'a, R, I>(records: I) -> Self
    where
        R: TableRecord + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut table = Table::new(R::schema());
        for record in records {
            table.rows.push(record.to_values());
        }
        table
    }

    /// Convert every row into a typed record
    pub fn to_records<R: TableRecord>(&self) -> Vec<R> {
        self.views().map(R::from_view).collect()
    }

    /// Append a row; short rows are padded with nulls, long rows truncated
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Append a column to every row, filled with `fill`
    pub fn add_column(&mut self, column: Column, fill: Value) {
        self.columns.push(column);
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }

    /// Rename columns through `map`, leaving unmapped columns as they are
    pub fn rename_columns(&mut self, map: &std::collections::BTreeMap<String, String>) {
        for column in &mut self.columns {
            if let Some(target) = map.get(&column.name) {
                column.name = target.clone();
            }
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows as name-addressable views
    pub fn views(&self) -> impl Iterator<Item = RowView<'_>> {
        let columns = self.columns.as_slice();
        self.rows.iter().map(move |values| RowView { columns, values })
    }

    /// Keep only rows for which `keep` returns true
    pub fn retain_rows<F: FnMut(RowView<'_>) -> bool>(&mut self, mut keep: F) {
        let columns = self.columns.as_slice();
        self.rows.retain(|values| keep(RowView { columns, values }));
    }

    /// Append all rows of `other`, aligning by column name.
    ///
    /// Columns missing from `self` are added; values missing from `other`
    /// are null.
    pub fn concat(&mut self, other: Table) {
        for column in &other.columns {
            if !self.has_column(&column.name) {
                self.add_column(column.clone(), Value::Null);
            }
        }
        let positions: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(&c.name))
            .collect();
        for row in other.rows {
            let aligned = positions
                .iter()
                .map(|pos| pos.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                .collect();
            self.rows.push(aligned);
        }
    }
}

/// Borrowed access to one row by column name
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    /// Raw value of a column; absent columns read as null
    pub fn value(&self, name: &str) -> &'a Value {
        const NULL: &Value = &Value::Null;
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.values.get(i))
            .unwrap_or(NULL)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.value(name) {
            Value::Text(s) => Some(s.clone()),
            Value::Null => None,
            Value::Int(v) => Some(v.to_string()),
            Value::UInt(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Bool(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.to_rfc3339()),
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.value(name) {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(s) => crate::parse::parse_int(s),
            _ => None,
        }
    }

    pub fn uint(&self, name: &str) -> Option<u64> {
        match self.value(name) {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.value(name) {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Text(s) => crate::parse::parse_number(s),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.value(name) {
            Value::Bool(v) => Some(*v),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(true),
                "false" | "f" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.value(name) {
            Value::Timestamp(v) => Some(*v),
            Value::Text(s) => crate::parse::parse_timestamp(s),
            _ => None,
        }
    }
}

/// A typed record with a fixed table schema
pub trait TableRecord: Sized {
    /// Column schema, in storage order
    fn schema() -> Vec<Column>;

    /// Values aligned with [`schema`](Self::schema)
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild a record from a stored row.
    ///
    /// Missing or mistyped columns read as null rather than failing.
    fn from_view(row: RowView<'_>) -> Self;
}

#[cfg(test)]
#[path = "table_test.rs"]
mod tests;
