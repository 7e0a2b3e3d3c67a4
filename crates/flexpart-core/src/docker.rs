//! Container invocation through the Docker CLI.
//!
//! [`ContainerRuntime`] is the seam the pipeline stages talk to;
//! [`DockerRunner`] implements it by spawning `docker` with a timeout, and
//! `fakes::RecordingRuntime` implements it in memory for tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

/// Errors produced by container invocation.
#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("docker command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("docker command failed (exit code {exit_code}): {message}")]
    CommandFailed { exit_code: i32, message: String },

    #[error("Docker image {image} missing. Build {dockerfile} first.")]
    ImageMissing { image: String, dockerfile: String },
}

/// Bind-mount access mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

impl MountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }
}

/// A `-v host:container:mode` bind mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
    pub mode: MountMode,
}

impl VolumeMount {
    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: MountMode::ReadWrite,
        }
    }

    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: MountMode::ReadOnly,
        }
    }

    pub fn to_arg(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host.display(),
            self.container,
            self.mode.as_str()
        )
    }
}

/// Everything needed for one `docker run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerInvocation {
    pub image: String,

    /// Arguments passed after the image name.
    pub args: Vec<String>,

    pub volumes: Vec<VolumeMount>,
    pub env: Vec<(String, String)>,
    pub entrypoint: Option<String>,

    /// Pass `--rm`.
    pub remove: bool,
}

impl ContainerInvocation {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            args: Vec::new(),
            volumes: Vec::new(),
            env: Vec::new(),
            entrypoint: None,
            remove: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Host path mounted at `container_path`, if any.
    pub fn host_path_for(&self, container_path: &str) -> Option<&Path> {
        self.volumes
            .iter()
            .find(|v| v.container == container_path)
            .map(|v| v.host.as_path())
    }

    /// Arguments for the `docker` executable, starting with `run`.
    pub fn to_command_args(&self) -> Vec<String> {
        let mut command = vec!["run".to_string()];
        if self.remove {
            command.push("--rm".to_string());
        }
        for mount in &self.volumes {
            command.push("-v".to_string());
            command.push(mount.to_arg());
        }
        for (key, value) in &self.env {
            command.push("-e".to_string());
            command.push(format!("{key}={value}"));
        }
        if let Some(entrypoint) = &self.entrypoint {
            command.push("--entrypoint".to_string());
            command.push(entrypoint.clone());
        }
        command.push(self.image.clone());
        command.extend(self.args.iter().cloned());
        command
    }
}

/// Captured result of a successful container command.
#[derive(Debug, Clone, Default)]
pub struct ContainerOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ContainerOutput {
    pub fn from_stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs containers on behalf of the pipeline stages.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether an image with the given repository/tag exists locally.
    async fn image_exists(&self, image: &str) -> Result<bool, DockerError>;

    /// Run a container to completion. Non-zero exit is an error.
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput, DockerError>;

    /// Contents of `path` inside `image`, read with `/bin/cat` as entrypoint.
    async fn cat_file(&self, image: &str, path: &str) -> Result<Vec<u8>, DockerError> {
        let invocation = ContainerInvocation::new(image)
            .entrypoint("/bin/cat")
            .arg(path);
        Ok(self.run(&invocation).await?.stdout)
    }
}

/// Thin wrapper around the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    program: String,
    timeout: Duration,
}

impl DockerRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            program: "docker".to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Use a different executable in place of `docker`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn execute(&self, args: &[String]) -> Result<ContainerOutput, DockerError> {
        info!("$ {} {}", self.program, args.join(" "));
        let start = Instant::now();

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DockerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DockerError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|source| DockerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let snippet = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(DockerError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                message: snippet,
            });
        }

        Ok(ContainerOutput {
            stdout: output.stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRunner {
    async fn image_exists(&self, image: &str) -> Result<bool, DockerError> {
        let args = vec!["images".to_string(), "-q".to_string(), image.to_string()];
        let output = self.execute(&args).await?;
        Ok(!output.stdout_lossy().trim().is_empty())
    }

    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput, DockerError> {
        let output = self.execute(&invocation.to_command_args()).await?;
        // Binary payloads (e.g. `/bin/cat` of static files) are not worth logging.
        if invocation.entrypoint.is_none() {
            let stdout = output.stdout_lossy();
            if !stdout.trim().is_empty() {
                debug!("{}", stdout.trim());
            }
        }
        Ok(output)
    }
}
