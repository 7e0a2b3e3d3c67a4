//! Presence checks for FLEXPART output files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FlexpartError, Result};

/// Files every successful NetCDF run leaves in the output directory.
pub const REQUIRED_OUTPUTS: [&str; 1] = ["totals.nc"];

/// What validation found.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub output_dir: PathBuf,
    pub required: Vec<String>,

    /// `grid_*.nc` files, sorted by name.
    pub grids: Vec<PathBuf>,
}

/// Ensures expected files exist after a FLEXPART run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultValidator;

impl ResultValidator {
    pub fn validate(&self, output_dir: &Path) -> Result<ValidationReport> {
        let missing: Vec<String> = REQUIRED_OUTPUTS
            .iter()
            .filter(|name| !output_dir.join(name).exists())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(FlexpartError::MissingOutputs {
                directory: output_dir.to_path_buf(),
                missing,
            });
        }

        let grids = gridded_outputs(output_dir)?;
        if grids.is_empty() {
            warn!("No grid_*.nc files found; ensure LNETCDFOUT=1 if gridded output needed");
        }
        info!(
            grids = grids.len(),
            "Validation complete. Files present: {}",
            REQUIRED_OUTPUTS.join(", ")
        );

        Ok(ValidationReport {
            output_dir: output_dir.to_path_buf(),
            required: REQUIRED_OUTPUTS.iter().map(|s| s.to_string()).collect(),
            grids,
        })
    }
}

fn gridded_outputs(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut grids = Vec::new();
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("grid_") && name.ends_with(".nc") {
            grids.push(entry.path());
        }
    }
    grids.sort();
    Ok(grids)
}
