//! tf-db - Storage layer for taxflow
//!
//! This crate provides the `TableStore` trait and its DuckDB implementation:
//! reading CSV extracts, reading and writing parquet tables, writing CSV
//! listings, and building the tax return datamart.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{DatamartSources, TableStore};
