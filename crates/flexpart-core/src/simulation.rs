//! FLEXPART model run inside its container.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::RuntimeConfig;
use crate::docker::{ContainerInvocation, ContainerRuntime, DockerError, VolumeMount};
use crate::error::{FlexpartError, Result};

/// Launches the FLEXPART container against a prepared workspace.
pub struct FlexpartSimulationRunner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl FlexpartSimulationRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Run the model and return the host output directory.
    pub async fn run(&self, cfg: &RuntimeConfig) -> Result<PathBuf> {
        if !self.runtime.image_exists(&cfg.flexpart_image).await? {
            return Err(DockerError::ImageMissing {
                image: cfg.flexpart_image.clone(),
                dockerfile: "Dockerfile.arm64".to_string(),
            }
            .into());
        }

        let invocation = build_invocation(cfg)?;
        info!(image = %cfg.flexpart_image, "Running FLEXPART container");
        self.runtime.run(&invocation).await?;
        Ok(cfg.paths.output_dir())
    }
}

/// Assemble the FLEXPART `docker run`, creating the output directory and,
/// when no meteo directory exists, an empty `<workspace>/inputs`.
pub fn build_invocation(cfg: &RuntimeConfig) -> Result<ContainerInvocation> {
    let paths = &cfg.paths;
    let output_dir = paths.output_dir();
    fs::create_dir_all(&output_dir)?;

    let pathnames = paths.pathnames_file();
    if !pathnames.exists() {
        return Err(FlexpartError::MissingPathnames(pathnames));
    }

    let mut inputs_host = paths.meteo_dir();
    if !inputs_host.exists() {
        inputs_host = paths.workspace.join("inputs");
        fs::create_dir_all(&inputs_host)?;
    }

    Ok(ContainerInvocation::new(&cfg.flexpart_image)
        .volume(VolumeMount::read_write(&paths.workspace, "/options"))
        .volume(VolumeMount::read_write(output_dir, "/output"))
        .volume(VolumeMount::read_write(inputs_host, "/inputs"))
        .volume(VolumeMount::read_only(pathnames, "/pathnames")))
}
