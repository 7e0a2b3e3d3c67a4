//! ERA5 extraction through the flex_extract (`convert2`) container.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::{CredPaths, ReleaseGeometry, RuntimeConfig};
use crate::docker::{ContainerInvocation, ContainerRuntime, DockerError, VolumeMount};
use crate::error::{ConfigError, FlexpartError, Result};
use crate::input_builder::format_real;
use crate::meteo::{self, MeteoError, MeteoObserver, DEFAULT_PRODUCT_PREFIX};

/// Degrees added around the release point in every direction.
pub const AREA_MARGIN_DEG: f64 = 10.0;

const CONTAINER_INPUT_DIR: &str = "/workspace/input";
const CONTAINER_OUTPUT_DIR: &str = "/workspace/output";

/// Extraction domain as `north/west/south/east` in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractArea {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl ExtractArea {
    /// Release point ± [`AREA_MARGIN_DEG`], clamped to valid coordinates.
    pub fn around(release: &ReleaseGeometry) -> Self {
        Self {
            north: (release.latitude + AREA_MARGIN_DEG).min(90.0),
            south: (release.latitude - AREA_MARGIN_DEG).max(-90.0),
            east: (release.longitude + AREA_MARGIN_DEG).min(180.0),
            west: (release.longitude - AREA_MARGIN_DEG).max(-180.0),
        }
    }

    /// Value of the `--area=` flag.
    pub fn to_arg(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            format_real(self.north),
            format_real(self.west),
            format_real(self.south),
            format_real(self.east)
        )
    }
}

/// Result of a completed extraction.
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    /// Directory holding the `EC*` products and `AVAILABLE`.
    pub output_dir: PathBuf,

    /// Number of entries written to `AVAILABLE`.
    pub manifest_entries: usize,
}

/// Handles ERA5 downloads via the flex_extract container.
pub struct FlexExtractService {
    runtime: Arc<dyn ContainerRuntime>,
}

impl FlexExtractService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Download and convert ERA5 fields for the simulation window, then write
    /// `AVAILABLE` next to the products.
    pub async fn run(
        &self,
        cfg: &RuntimeConfig,
        observer: &dyn MeteoObserver,
    ) -> Result<ExtractOutcome> {
        if !cfg.simulation.use_era5 {
            return Err(ConfigError::Era5Disabled.into());
        }
        if !self.runtime.image_exists(&cfg.flex_extract_image).await? {
            return Err(DockerError::ImageMissing {
                image: cfg.flex_extract_image.clone(),
                dockerfile: "Dockerfile.convert2".to_string(),
            }
            .into());
        }

        let paths = &cfg.paths;
        let input_dir = paths.flex_extract_workspace().join("input");
        let output_dir = paths.meteo_preprocessed_dir();
        fs::create_dir_all(paths.meteo_dir())?;
        fs::create_dir_all(&input_dir)?;
        fs::create_dir_all(&output_dir)?;

        let invocation = build_invocation(cfg, &input_dir, &output_dir)?;

        info!(image = %cfg.flex_extract_image, "Running flex_extract container");
        self.runtime.run(&invocation).await?;

        match meteo::scan_products(&output_dir, DEFAULT_PRODUCT_PREFIX) {
            Err(MeteoError::NoMatchingFiles { directory, prefix }) => {
                return Err(FlexpartError::NoExtractOutput { directory, prefix });
            }
            Err(other) => return Err(other.into()),
            Ok(_) => {}
        }

        let window = &cfg.simulation.window;
        let manifest_entries = meteo::create_available_file(
            &output_dir,
            DEFAULT_PRODUCT_PREFIX,
            window,
            observer,
        )?;
        info!(entries = manifest_entries, "Generated AVAILABLE");

        Ok(ExtractOutcome {
            output_dir,
            manifest_entries,
        })
    }
}

/// Assemble the flex_extract `docker run` for `cfg`.
pub fn build_invocation(
    cfg: &RuntimeConfig,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<ContainerInvocation> {
    let sim = &cfg.simulation;
    let window = &sim.window;
    let area = ExtractArea::around(&sim.release);

    let mut invocation = ContainerInvocation::new(&cfg.flex_extract_image)
        .volume(VolumeMount::read_write(input_dir, CONTAINER_INPUT_DIR))
        .volume(VolumeMount::read_write(output_dir, CONTAINER_OUTPUT_DIR));

    for credential in credential_mounts(&cfg.credentials)? {
        invocation = invocation
            .volume(VolumeMount::read_only(
                credential.host,
                credential.container_path,
            ))
            .env(credential.env_name, credential.container_path);
    }

    Ok(invocation.args([
        format!("--start-date={}", window.start.format("%Y%m%d")),
        format!("--end-date={}", window.end.format("%Y%m%d")),
        format!("--area={}", area.to_arg()),
        format!("--grid={}", format_real(sim.grid_deg)),
        "--levelist=1/to/137".to_string(),
        "--basetime=0".to_string(),
        "--dtime=1".to_string(),
        format!("--prefix={DEFAULT_PRODUCT_PREFIX}"),
        format!("--input-dir={CONTAINER_INPUT_DIR}"),
        format!("--output-dir={CONTAINER_OUTPUT_DIR}"),
        "--request=0".to_string(),
        "--rrint=1".to_string(),
        "--date-chunk=3".to_string(),
    ]))
}

struct CredentialMount {
    host: PathBuf,
    container_path: &'static str,
    env_name: &'static str,
}

fn credential_mounts(creds: &CredPaths) -> Result<Vec<CredentialMount>> {
    let candidates = [
        (
            &creds.cdsapi_path,
            "FLEXEXTRACT_CDSAPI_PATH",
            "/keys/cdsapirc",
        ),
        (
            &creds.ecmwfapi_path,
            "FLEXEXTRACT_APIKEY_PATH",
            "/keys/ecmwfapirc",
        ),
    ];

    let mut mounts = Vec::new();
    for (path, env_name, container_path) in candidates {
        let Some(path) = path else { continue };
        if !path.exists() {
            return Err(FlexpartError::CredentialMissing(path.clone()));
        }
        mounts.push(CredentialMount {
            host: path.clone(),
            container_path,
            env_name,
        });
    }

    if mounts.is_empty() {
        return Err(FlexpartError::NoCredentials);
    }
    Ok(mounts)
}
