//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// taxflow - incremental tax return ETL with SCD2 history
#[derive(Parser, Debug)]
#[command(name = "tf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest new extracts, validate, merge into the warehouse, and record the ledger
    Run(RunArgs),

    /// Ingest and validate without writing anything
    Validate(ValidateArgs),

    /// Show the watermark and processed-file ledger
    Ledger(LedgerArgs),
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Keep rows older than the stored watermark
    #[arg(long)]
    pub allow_backfill: bool,

    /// Use this run id instead of a generated one
    #[arg(long)]
    pub run_id: Option<String>,

    /// Run timestamp (RFC 3339) instead of the current time
    #[arg(long)]
    pub run_timestamp: Option<String>,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Keep rows older than the stored watermark
    #[arg(long)]
    pub allow_backfill: bool,

    /// Exit with code 1 when any row is quarantined
    #[arg(long)]
    pub strict: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: ReportOutput,
}

/// Output formats for quality reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutput {
    /// Human-readable text
    Text,
    /// Run summary as JSON
    Json,
}

/// Arguments for the ledger command
#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: LedgerOutput,
}

/// Ledger output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutput {
    /// Table format
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
