//! Typed run configuration with validation.
//!
//! Every type here is serde-serializable so a run can be described by a JSON
//! document as well as by command-line flags. Constraints are checked by the
//! `validate()` methods; [`RuntimeConfig::validate`] checks the whole tree.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Simulation start/end timestamps (UTC).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    /// Simulation start.
    pub start: NaiveDateTime,

    /// Simulation end, strictly after `start`.
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Create a window, rejecting `end <= start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> std::result::Result<Self, ConfigError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.end <= self.start {
            return Err(ConfigError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Inclusive on both ends.
    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        *timestamp >= self.start && *timestamp <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Spatial description of the source term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseGeometry {
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default)]
    pub height_bottom_m: f64,

    #[serde(default = "default_height_top_m")]
    pub height_top_m: f64,

    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
}

fn default_height_top_m() -> f64 {
    100.0
}

fn default_duration_hours() -> f64 {
    6.0
}

impl ReleaseGeometry {
    /// Point release at the given coordinates with default heights and duration.
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            height_bottom_m: 0.0,
            height_top_m: default_height_top_m(),
            duration_hours: default_duration_hours(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_range("release.latitude", self.latitude, -90.0, 90.0)?;
        check_range("release.longitude", self.longitude, -180.0, 180.0)?;
        check_non_negative("release.height_bottom_m", self.height_bottom_m)?;
        check_non_negative("release.height_top_m", self.height_top_m)?;
        check_positive("release.duration_hours", self.duration_hours)?;
        if self.height_top_m < self.height_bottom_m {
            return Err(ConfigError::InvertedRelease {
                bottom: self.height_bottom_m,
                top: self.height_top_m,
            });
        }
        Ok(())
    }
}

/// FLEXPART species slot parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesDefinition {
    pub name: String,

    #[serde(default = "default_molecular_weight")]
    pub molecular_weight: f64,

    /// Radioactive decay half-life in days.
    #[serde(default)]
    pub half_life_days: Option<f64>,
}

fn default_molecular_weight() -> f64 {
    28.0
}

impl SpeciesDefinition {
    pub fn new(name: impl Into<String>, molecular_weight: f64) -> Self {
        Self {
            name: name.into(),
            molecular_weight,
            half_life_days: None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "species.name",
            });
        }
        check_positive("species.molecular_weight", self.molecular_weight)?;
        if let Some(half_life) = self.half_life_days {
            check_positive("species.half_life_days", half_life)?;
        }
        Ok(())
    }
}

/// Numerical controls for FLEXPART.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationNumerics {
    /// Number of computational particles.
    pub particles: u32,
    pub output_interval_sec: u32,
    pub sampling_interval_sec: u32,
    pub turbulence: u8,
    pub netcdf_output: u8,
}

impl Default for SimulationNumerics {
    fn default() -> Self {
        Self {
            particles: 20_000,
            output_interval_sec: 3600,
            sampling_interval_sec: 900,
            turbulence: 1,
            netcdf_output: 1,
        }
    }
}

impl SimulationNumerics {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_positive("numerics.particles", f64::from(self.particles))?;
        check_positive(
            "numerics.output_interval_sec",
            f64::from(self.output_interval_sec),
        )?;
        check_positive(
            "numerics.sampling_interval_sec",
            f64::from(self.sampling_interval_sec),
        )?;
        check_switch("numerics.turbulence", self.turbulence)?;
        check_switch("numerics.netcdf_output", self.netcdf_output)?;
        Ok(())
    }
}

/// Credential locations for flex_extract, mounted read-only into the container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredPaths {
    /// Path to a `.cdsapirc` file.
    #[serde(default)]
    pub cdsapi_path: Option<PathBuf>,

    /// Path to an `.ecmwfapirc` file for member-only datasets.
    #[serde(default)]
    pub ecmwfapi_path: Option<PathBuf>,
}

impl CredPaths {
    pub fn new(cdsapi_path: Option<PathBuf>, ecmwfapi_path: Option<PathBuf>) -> Self {
        Self {
            cdsapi_path: cdsapi_path.map(|p| expand_home(&p)),
            ecmwfapi_path: ecmwfapi_path.map(|p| expand_home(&p)),
        }
    }

    /// Expand a leading `~` in both paths.
    pub fn expanded(self) -> Self {
        Self::new(self.cdsapi_path, self.ecmwfapi_path)
    }
}

/// Filesystem layout for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// Root work directory.
    pub workspace: PathBuf,
}

impl PathsConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn meteo_dir(&self) -> PathBuf {
        self.workspace.join("meteo")
    }

    pub fn meteo_preprocessed_dir(&self) -> PathBuf {
        self.meteo_dir().join("preprocessed")
    }

    pub fn flex_extract_workspace(&self) -> PathBuf {
        self.meteo_dir().join("flex_extract_workspace")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.workspace.join("output")
    }

    pub fn species_dir(&self) -> PathBuf {
        self.workspace.join("SPECIES")
    }

    pub fn pathnames_file(&self) -> PathBuf {
        self.workspace.join("pathnames")
    }
}

/// Full set of knobs for a FLEXPART run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub window: TimeWindow,
    pub release: ReleaseGeometry,
    pub species: SpeciesDefinition,

    #[serde(default)]
    pub numerics: SimulationNumerics,

    #[serde(default = "default_release_mass_kg")]
    pub release_mass_kg: f64,

    #[serde(default = "default_true")]
    pub use_era5: bool,

    /// ERA5 target grid spacing in degrees.
    #[serde(default = "default_grid_deg")]
    pub grid_deg: f64,
}

fn default_release_mass_kg() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_grid_deg() -> f64 {
    0.5
}

impl SimulationConfig {
    /// Build a config with default numerics, 1 kg release mass, ERA5 enabled and 0.5° grid.
    pub fn new(window: TimeWindow, release: ReleaseGeometry, species: SpeciesDefinition) -> Self {
        Self {
            window,
            release,
            species,
            numerics: SimulationNumerics::default(),
            release_mass_kg: default_release_mass_kg(),
            use_era5: true,
            grid_deg: default_grid_deg(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.window.validate()?;
        self.release.validate()?;
        self.species.validate()?;
        self.numerics.validate()?;
        check_positive("release_mass_kg", self.release_mass_kg)?;
        if self.grid_deg.is_nan() || self.grid_deg <= 0.0 || self.grid_deg > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "grid_deg",
                value: self.grid_deg,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

/// Combined simulation configuration and container environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    pub simulation: SimulationConfig,
    pub paths: PathsConfig,

    #[serde(default)]
    pub credentials: CredPaths,

    #[serde(default = "default_flexpart_image")]
    pub flexpart_image: String,

    #[serde(default = "default_flex_extract_image")]
    pub flex_extract_image: String,

    #[serde(default = "default_docker_timeout_sec")]
    pub docker_timeout_sec: u64,
}

pub const DEFAULT_FLEXPART_IMAGE: &str = "flexpart-v10.4-arm64:latest";
pub const DEFAULT_FLEX_EXTRACT_IMAGE: &str = "convert2:latest";
pub const DEFAULT_DOCKER_TIMEOUT_SEC: u64 = 3600;

fn default_flexpart_image() -> String {
    DEFAULT_FLEXPART_IMAGE.to_string()
}

fn default_flex_extract_image() -> String {
    DEFAULT_FLEX_EXTRACT_IMAGE.to_string()
}

fn default_docker_timeout_sec() -> u64 {
    DEFAULT_DOCKER_TIMEOUT_SEC
}

impl RuntimeConfig {
    /// Runtime config with default images and timeout.
    pub fn new(simulation: SimulationConfig, paths: PathsConfig, credentials: CredPaths) -> Self {
        Self {
            simulation,
            paths,
            credentials,
            flexpart_image: default_flexpart_image(),
            flex_extract_image: default_flex_extract_image(),
            docker_timeout_sec: DEFAULT_DOCKER_TIMEOUT_SEC,
        }
    }

    /// Load a JSON run description, expand credential paths and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RuntimeConfig = serde_json::from_str(&content)?;
        config.credentials = config.credentials.expanded();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.simulation.validate()?;
        if self.flexpart_image.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "flexpart_image",
            });
        }
        if self.flex_extract_image.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "flex_extract_image",
            });
        }
        if self.docker_timeout_sec == 0 {
            return Err(ConfigError::NotPositive {
                field: "docker_timeout_sec",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Parse a command-line timestamp.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` and `YYYY-MM-DDTHH:MM:SS`; a space
/// may replace the `T`. Values are taken as UTC.
pub fn parse_cli_datetime(raw: &str) -> std::result::Result<NaiveDateTime, ConfigError> {
    let raw = raw.trim();
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigError::InvalidDateTime {
            input: raw.to_string(),
        })
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> std::result::Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if value.is_nan() || value < 0.0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::INFINITY,
        });
    }
    Ok(())
}

fn check_switch(field: &'static str, value: u8) -> std::result::Result<(), ConfigError> {
    if value > 1 {
        return Err(ConfigError::InvalidSwitch { field, value });
    }
    Ok(())
}
