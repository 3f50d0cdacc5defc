//! Error types for tf-core

use thiserror::Error;

/// Core error type for taxflow
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Input location missing
    #[error("[E004] Input path not found: {path}")]
    InputNotFound { path: String },

    /// E005: Input directory holds no extracts
    #[error("[E005] No CSV files found in {path}")]
    NoInputFiles { path: String },

    /// E006: Source file metadata could not be read for fingerprinting
    #[error("[E006] Cannot fingerprint '{path}': {source}")]
    Fingerprint {
        path: String,
        source: std::io::Error,
    },

    /// E007: Invalid glob pattern while enumerating extracts
    #[error("[E007] Invalid input pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to access '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E015: YAML parse error
    #[error("[E015] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub(crate) fn io_at(path: &std::path::Path, source: std::io::Error) -> Self {
        CoreError::IoWithPath {
            path: path.display().to_string(),
            source,
        }
    }
}
