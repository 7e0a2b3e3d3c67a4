//! Error taxonomy for FLEXPART runs.

use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::docker::DockerError;
use crate::meteo::MeteoError;

/// Errors produced while validating a run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("end must be after start (start {start}, end {end})")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("height_top_m ({top}) must be greater or equal to height_bottom_m ({bottom})")]
    InvertedRelease { bottom: f64, top: f64 },

    #[error("{field} must be 0 or 1, got {value}")]
    InvalidSwitch { field: &'static str, value: u8 },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("invalid datetime `{input}`: expected YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS]")]
    InvalidDateTime { input: String },

    #[error("ERA5 extraction requested but use_era5 is disabled")]
    Era5Disabled,
}

/// FLEXPART orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum FlexpartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Meteo(#[from] MeteoError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error("credential file {} not found", .0.display())]
    CredentialMissing(PathBuf),

    #[error("no flex_extract credentials provided; set cdsapi_path or ecmwfapi_path")]
    NoCredentials,

    #[error(
        "flex_extract completed but produced no {prefix} files in {dir}",
        dir = .directory.display()
    )]
    NoExtractOutput { directory: PathBuf, prefix: String },

    #[error("pathnames not found at {}", .0.display())]
    MissingPathnames(PathBuf),

    #[error(
        "missing FLEXPART outputs in {dir}: {list}",
        dir = .directory.display(),
        list = .missing.join(", ")
    )]
    MissingOutputs {
        directory: PathBuf,
        missing: Vec<String>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for FLEXPART operations.
pub type Result<T> = std::result::Result<T, FlexpartError>;
