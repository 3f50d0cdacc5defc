//! DuckDB storage backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{DatamartSources, TableStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::types::{TimeUnit, Value as DuckValue, ValueRef};
use duckdb::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tf_core::{Column, ColumnType, Table, Value};

/// Scratch table a [`Table`] is staged into before `COPY`
const STAGE_TABLE: &str = "tf_stage";

/// DuckDB storage backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Load the result of `SELECT * FROM <source>` into a [`Table`]
    fn query_table_sync(&self, source: &str) -> DbResult<Table> {
        let conn = self.lock()?;

        let mut describe = conn.prepare(&format!("DESCRIBE SELECT * FROM {}", source))?;
        let columns = describe
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let ty: String = row.get(1)?;
                Ok(Column::new(name, ColumnType::from_sql_type(&ty)))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = Table::new(columns);
        let width = table.columns().len();
        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", source))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_duck(row.get_ref(i)?));
            }
            table.push_row(values);
        }
        Ok(table)
    }

    /// Stage `table`, `COPY` it to a temp file, then rename over `path`
    fn copy_out_sync(&self, table: &Table, path: &Path, options: &str) -> DbResult<usize> {
        if table.columns().is_empty() {
            return Err(DbError::InvalidTable {
                path: path.display().to_string(),
                reason: "table has no columns".to_string(),
            });
        }
        ensure_parent(path)?;
        let tmp = temp_path(path);

        let mut conn = self.lock()?;
        stage_table(&mut conn, table)?;
        let copied = conn.execute_batch(&format!(
            "COPY {} TO {} ({})",
            STAGE_TABLE,
            quote_literal(&tmp.to_string_lossy()),
            options
        ));
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", STAGE_TABLE))?;
        drop(conn);

        finish_copy(copied, &tmp, path)?;
        Ok(table.len())
    }

    fn build_datamart_sync(&self, sources: DatamartSources<'_>, path: &Path) -> DbResult<usize> {
        for source in [sources.returns, sources.taxpayers, sources.geo] {
            if !source.exists() {
                return Err(DbError::TableNotFound(source.display().to_string()));
            }
        }
        ensure_parent(path)?;
        let tmp = temp_path(path);

        let select = format!(
            "SELECT f.* EXCLUDE (effective_end, is_current), \
                    t.nric, t.full_name, t.filing_status, t.residential_status, \
                    t.number_of_dependents, t.occupation, t.housing_type, t.postal_code, \
                    t.geo_id, g.region \
             FROM read_parquet({returns}) f \
             LEFT JOIN (SELECT * FROM read_parquet({taxpayers}) WHERE is_current) t \
               ON f.taxpayer_id = t.taxpayer_id \
             LEFT JOIN (SELECT * FROM read_parquet({geo}) WHERE is_current) g \
               ON t.geo_id = g.geo_id \
             WHERE f.is_current \
             ORDER BY f.return_key NULLS LAST",
            returns = quote_literal(&sources.returns.to_string_lossy()),
            taxpayers = quote_literal(&sources.taxpayers.to_string_lossy()),
            geo = quote_literal(&sources.geo.to_string_lossy()),
        );

        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE tf_datamart AS {}",
            select
        ))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tf_datamart", [], |row| row.get(0))?;
        let copied = conn.execute_batch(&format!(
            "COPY tf_datamart TO {} (FORMAT PARQUET)",
            quote_literal(&tmp.to_string_lossy())
        ));
        conn.execute_batch("DROP TABLE IF EXISTS tf_datamart")?;
        drop(conn);

        finish_copy(copied, &tmp, path)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl TableStore for DuckDbBackend {
    async fn read_delimited(&self, path: &Path) -> DbResult<Table> {
        let csv_error = |message: String| DbError::CsvError {
            path: path.display().to_string(),
            message,
        };
        if !path.is_file() {
            return Err(csv_error("file not found".to_string()));
        }
        let source = format!(
            "read_csv({}, header = true, all_varchar = true)",
            quote_literal(&path.to_string_lossy())
        );
        let table = self
            .query_table_sync(&source)
            .map_err(|e| csv_error(e.to_string()))?;
        log::debug!("Read {} row(s) from {}", table.len(), path.display());
        Ok(table)
    }

    async fn read_table(&self, path: &Path) -> DbResult<Option<Table>> {
        if !path.exists() {
            return Ok(None);
        }
        let source = format!("read_parquet({})", quote_literal(&path.to_string_lossy()));
        self.query_table_sync(&source).map(Some)
    }

    async fn write_table(&self, table: &Table, path: &Path) -> DbResult<usize> {
        let rows = self.copy_out_sync(table, path, "FORMAT PARQUET")?;
        log::debug!("Wrote {} row(s) to {}", rows, path.display());
        Ok(rows)
    }

    async fn write_csv(&self, table: &Table, path: &Path) -> DbResult<usize> {
        self.copy_out_sync(table, path, "FORMAT CSV, HEADER true")
    }

    async fn build_datamart(&self, sources: DatamartSources<'_>, path: &Path) -> DbResult<usize> {
        self.build_datamart_sync(sources, path)
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Recreate the stage table with `table`'s schema and rows
fn stage_table(conn: &mut Connection, table: &Table) -> DbResult<()> {
    let columns = table
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.ty.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {} ({})",
        STAGE_TABLE, columns
    ))?;
    if table.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; table.columns().len()].join(", ");
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            STAGE_TABLE, placeholders
        ))?;
        for row in table.rows() {
            insert.execute(params_from_iter(row.iter().map(to_duck)))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Rename a finished temp file into place, or clean it up on failure
fn finish_copy(copied: duckdb::Result<()>, tmp: &Path, path: &Path) -> DbResult<()> {
    if let Err(e) = copied {
        let _ = std::fs::remove_file(tmp);
        return Err(e.into());
    }
    std::fs::rename(tmp, path).map_err(|e| DbError::io_at(path, e))
}

fn ensure_parent(path: &Path) -> DbResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| DbError::io_at(parent, e))
        }
        _ => Ok(()),
    }
}

/// Sibling temp path, unique per process
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn to_duck(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Text(s) => DuckValue::Text(s.clone()),
        Value::Int(i) => DuckValue::BigInt(*i),
        Value::UInt(u) => DuckValue::UBigInt(*u),
        Value::Float(f) => DuckValue::Double(*f),
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Timestamp(ts) => DuckValue::Timestamp(TimeUnit::Microsecond, ts.timestamp_micros()),
    }
}

fn from_duck(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::Int(i64::from(i)),
        ValueRef::SmallInt(i) => Value::Int(i64::from(i)),
        ValueRef::Int(i) => Value::Int(i64::from(i)),
        ValueRef::BigInt(i) => Value::Int(i),
        ValueRef::HugeInt(i) => i64::try_from(i).map_or(Value::Null, Value::Int),
        ValueRef::UTinyInt(u) => Value::UInt(u64::from(u)),
        ValueRef::USmallInt(u) => Value::UInt(u64::from(u)),
        ValueRef::UInt(u) => Value::UInt(u64::from(u)),
        ValueRef::UBigInt(u) => Value::UInt(u),
        ValueRef::Float(f) => Value::Float(f64::from(f)),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Timestamp(unit, v) => DateTime::<Utc>::from_timestamp_micros(unit.to_micros(v))
            .map_or(Value::Null, Value::Timestamp),
        ValueRef::Date32(days) => DateTime::<Utc>::from_timestamp(i64::from(days) * 86_400, 0)
            .map_or(Value::Null, Value::Timestamp),
        other => Value::Text(format!("{:?}", other)),
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
