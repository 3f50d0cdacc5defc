//! Storage trait definition

use crate::error::DbResult;
use async_trait::async_trait;
use std::path::Path;
use tf_core::Table;

/// Curated parquet files joined into the datamart
#[derive(Debug, Clone, Copy)]
pub struct DatamartSources<'a> {
    pub returns: &'a Path,
    pub taxpayers: &'a Path,
    pub geo: &'a Path,
}

/// Table storage used by the pipeline
///
/// Implementations must be Send + Sync for async operation. Every write
/// lands in a temporary file first and is renamed into place.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Read a delimited extract with a header row; every cell is text
    async fn read_delimited(&self, path: &Path) -> DbResult<Table>;

    /// Read a parquet table; `None` when the file does not exist
    async fn read_table(&self, path: &Path) -> DbResult<Option<Table>>;

    /// Write a table as parquet, returning the row count
    async fn write_table(&self, table: &Table, path: &Path) -> DbResult<usize>;

    /// Write a table as CSV with a header row, returning the row count
    async fn write_csv(&self, table: &Table, path: &Path) -> DbResult<usize>;

    /// Join current facts to current taxpayer and geo rows into `path`
    async fn build_datamart(&self, sources: DatamartSources<'_>, path: &Path) -> DbResult<usize>;

    /// Backend identifier for logging
    fn db_type(&self) -> &'static str;
}
