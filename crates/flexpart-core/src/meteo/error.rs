//! Error types for the meteo module.

use std::path::PathBuf;

/// Errors produced while building the `AVAILABLE` index.
#[derive(Debug, thiserror::Error)]
pub enum MeteoError {
    #[error("no {prefix}* files found in {dir}", dir = .directory.display())]
    NoMatchingFiles { directory: PathBuf, prefix: String },

    #[error("unable to parse timestamps for AVAILABLE file from: {list}", list = .names.join(", "))]
    UnparseableNames { names: Vec<String> },

    #[error("failed to scan {dir}: {source}", dir = .directory.display())]
    Scan {
        directory: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for meteo operations.
pub type MeteoResult<T> = std::result::Result<T, MeteoError>;
