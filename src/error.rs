//! Error types for the SFR network builder.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for SFR operations.
#[derive(Debug, Error)]
pub enum SfrError {
    #[error("could not read settings document {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse settings document {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("settings document is missing required setting '{key}'")]
    MissingSetting { key: &'static str },

    #[error("setting '{key}' has invalid value '{value}'")]
    InvalidSetting { key: &'static str, value: String },

    #[error("reach {comid} is not in the registry; the intersect table must be scanned first")]
    MissingReach { comid: i64 },

    #[error("boundary reach {comid} has no clipped counterpart")]
    UnmatchedReach { comid: i64 },

    #[error("reach {comid} has zero unclipped length, cannot interpolate elevations")]
    DegenerateGeometry { comid: i64 },

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("field '{field}' not present in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("field value is not a {expected}")]
    FieldType { expected: &'static str },

    #[error("backend: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for SFR operations.
pub type Result<T> = std::result::Result<T, SfrError>;
