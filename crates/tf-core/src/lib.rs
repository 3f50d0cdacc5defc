//! tf-core - Core library for taxflow
//!
//! This crate provides shared types, configuration parsing, surrogate keys,
//! typed extract rows, and the watermark/file ledger used across all taxflow
//! components.

pub mod config;
pub mod error;
pub mod ingest;
pub mod keys;
mod newtype_string;
pub mod parse;
pub mod rows;
pub mod run;
pub mod state;
pub mod table;

pub use config::{IncrementalConfig, Layer, PipelineConfig, QualityConfig};
pub use error::{CoreError, CoreResult};
pub use ingest::{FileId, SourceFile, WatermarkFilter};
pub use keys::{return_key, stable_id};
pub use rows::TaxRow;
pub use run::{RunContext, RunId};
pub use state::{LedgerEntry, WatermarkState};
pub use table::{Column, ColumnType, RowView, Table, TableRecord, Value};
